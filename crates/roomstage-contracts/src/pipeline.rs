use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::images::ImageReference;
use crate::stages::Stage;

/// Accumulated results for one room photo.
///
/// The state is owned by the caller and handed to every stage call; nothing
/// here is shared between sessions. Supplying a new photo to stage 1 resets
/// it completely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,
    #[serde(default)]
    pub photo: Option<ImageReference>,
    #[serde(default)]
    pub stage1_text: Option<String>,
    #[serde(default)]
    pub clutter_list: String,
    #[serde(default)]
    stage_images: BTreeMap<Stage, ImageReference>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            session_id: new_session_id(),
            photo: None,
            stage1_text: None,
            clutter_list: String::new(),
            stage_images: BTreeMap::new(),
        }
    }

    /// Drops every prior result and starts a new session around `photo`.
    pub fn reset_with_photo(&mut self, photo: ImageReference) {
        *self = Self::new();
        self.photo = Some(photo);
    }

    pub fn stage_image(&self, stage: Stage) -> Option<&ImageReference> {
        self.stage_images.get(&stage)
    }

    pub fn has_outcome(&self, stage: Stage) -> bool {
        match stage {
            Stage::SceneAnalysis => self.stage1_text.is_some(),
            other => self.stage_images.contains_key(&other),
        }
    }

    /// The image a stage edits when the request does not carry one: the source
    /// photo for stage 2, the previous stage's result afterwards.
    pub fn prerequisite_image(&self, stage: Stage) -> Option<&ImageReference> {
        match stage.previous()? {
            Stage::SceneAnalysis => self.photo.as_ref(),
            previous => self.stage_image(previous),
        }
    }

    /// Stores a new analysis. Every stage image was built from the previous
    /// clutter list, so all of them are dropped.
    pub fn record_analysis(&mut self, analysis: String, clutter_list: String) {
        self.stage1_text = Some(analysis);
        self.clutter_list = clutter_list;
        self.stage_images.clear();
    }

    /// Stores a stage result and forgets everything downstream of it, since
    /// those results were derived from the image being replaced.
    pub fn record_image(&mut self, stage: Stage, image: ImageReference) {
        self.stage_images.retain(|existing, _| *existing < stage);
        self.stage_images.insert(stage, image);
    }

    pub fn completed_stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.stage1_text.is_some() {
            stages.push(Stage::SceneAnalysis);
        }
        stages.extend(self.stage_images.keys().copied());
        stages
    }
}

fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4().simple())
}

/// One stage invocation as received from the request boundary.
///
/// `stage` stays a raw number so out-of-range values can be rejected as a
/// validation error rather than failing to deserialize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    pub stage: u8,
    #[serde(default)]
    pub image: Option<ImageReference>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub props: Option<String>,
    #[serde(default)]
    pub clutter_list: String,
    #[serde(default)]
    pub is_redo: bool,
}

impl StageRequest {
    pub fn new(stage: u8) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: ImageReference) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_props(mut self, props: impl Into<String>) -> Self {
        self.props = Some(props.into());
        self
    }

    pub fn with_clutter_list(mut self, clutter_list: impl Into<String>) -> Self {
        self.clutter_list = clutter_list.into();
        self
    }

    pub fn redo(mut self) -> Self {
        self.is_redo = true;
        self
    }
}

/// How an outcome came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeOrigin {
    /// Text analysis of the supplied photo.
    Analyzed,
    /// The supplied photo was edited.
    Edited,
    /// A new image was generated; the photo was not edited.
    Generated,
    /// Every provider failed; carries an error summary.
    Placeholder,
    /// No provider is configured at all.
    Simulated,
}

impl OutcomeOrigin {
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Placeholder | Self::Simulated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOutcome {
    pub analysis: String,
    pub description: String,
    pub clutter_list: String,
    pub provider: Option<String>,
    pub origin: OutcomeOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOutcome {
    pub image_url: String,
    pub description: String,
    pub provider: Option<String>,
    pub origin: OutcomeOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutcome {
    Text(TextOutcome),
    Image(ImageOutcome),
}

impl StageOutcome {
    pub fn origin(&self) -> OutcomeOrigin {
        match self {
            Self::Text(outcome) => outcome.origin,
            Self::Image(outcome) => outcome.origin,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Text(outcome) => &outcome.description,
            Self::Image(outcome) => &outcome.description,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Text(outcome) => outcome.provider.as_deref(),
            Self::Image(outcome) => outcome.provider.as_deref(),
        }
    }

    pub fn as_text(&self) -> Option<&TextOutcome> {
        match self {
            Self::Text(outcome) => Some(outcome),
            Self::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageOutcome> {
        match self {
            Self::Image(outcome) => Some(outcome),
            Self::Text(_) => None,
        }
    }

    /// Response body handed back across the request boundary.
    pub fn to_response(&self) -> Value {
        let mut body = serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default();
        body.insert("success".to_string(), Value::Bool(true));
        Value::Object(body)
    }
}
