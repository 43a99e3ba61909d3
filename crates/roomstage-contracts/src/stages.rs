use std::fmt;

use serde::{Deserialize, Serialize};

/// The five ordered steps of the room enhancement workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    SceneAnalysis,
    BasicCleanup,
    DeepCleanup,
    LayoutOptimize,
    AddProps,
}

pub const ALL_STAGES: [Stage; 5] = [
    Stage::SceneAnalysis,
    Stage::BasicCleanup,
    Stage::DeepCleanup,
    Stage::LayoutOptimize,
    Stage::AddProps,
];

impl Stage {
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::SceneAnalysis),
            2 => Some(Self::BasicCleanup),
            3 => Some(Self::DeepCleanup),
            4 => Some(Self::LayoutOptimize),
            5 => Some(Self::AddProps),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::SceneAnalysis => 1,
            Self::BasicCleanup => 2,
            Self::DeepCleanup => 3,
            Self::LayoutOptimize => 4,
            Self::AddProps => 5,
        }
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Stage 1 answers with text; every later stage answers with an image.
    pub fn produces_image(self) -> bool {
        !matches!(self, Self::SceneAnalysis)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SceneAnalysis => "scene analysis",
            Self::BasicCleanup => "basic cleanup",
            Self::DeepCleanup => "deep cleanup",
            Self::LayoutOptimize => "layout optimization",
            Self::AddProps => "prop addition",
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(value).ok_or_else(|| format!("unknown stage number {value} (expected 1-5)"))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.label())
    }
}
