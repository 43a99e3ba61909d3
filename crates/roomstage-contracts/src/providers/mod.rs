use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::stages::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ImageEdit,
    TextAnalysis,
    TextToImageOnly,
}

/// Where a capability places an adapter in a stage's candidate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    Primary,
    LastResort,
}

impl Capability {
    pub fn tier(self) -> SelectionTier {
        match self {
            Self::ImageEdit | Self::TextAnalysis => SelectionTier::Primary,
            Self::TextToImageOnly => SelectionTier::LastResort,
        }
    }
}

/// Static description of one adapter. Lower `priority` values are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub capabilities: Vec<Capability>,
    pub priority: u32,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, capabilities: &[Capability], priority: u32) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.to_vec(),
            priority,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The capability this adapter would use for `stage`, if any. Stage 1 needs
    /// text analysis; later stages prefer a real edit over fresh generation.
    pub fn supports(&self, stage: Stage) -> Option<Capability> {
        if !stage.produces_image() {
            return self
                .has(Capability::TextAnalysis)
                .then_some(Capability::TextAnalysis);
        }
        if self.has(Capability::ImageEdit) {
            return Some(Capability::ImageEdit);
        }
        self.has(Capability::TextToImageOnly)
            .then_some(Capability::TextToImageOnly)
    }
}

pub trait DescribedProvider {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn id(&self) -> &str {
        self.descriptor().id.as_str()
    }
}

#[derive(Debug)]
pub struct Candidate<'a, T> {
    pub provider: &'a T,
    pub capability: Capability,
}

/// Adapters keyed by id, kept in registration order. Registering an id twice
/// replaces the earlier adapter in place.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: DescribedProvider> {
    providers: IndexMap<String, T>,
}

impl<T: DescribedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: IndexMap::new(),
        }
    }
}

impl<T: DescribedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        let mut registry = Self::default();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    pub fn register(&mut self, provider: T) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids = self.providers.keys().cloned().collect::<Vec<String>>();
        ids.sort();
        ids
    }

    pub fn providers(&self) -> impl Iterator<Item = &T> {
        self.providers.values()
    }

    /// Adapters able to serve `stage`, primary tier first, then by priority.
    /// Ties keep registration order.
    pub fn candidates(&self, stage: Stage) -> Vec<Candidate<'_, T>> {
        let mut candidates = self
            .providers
            .values()
            .filter_map(|provider| {
                provider
                    .descriptor()
                    .supports(stage)
                    .map(|capability| Candidate {
                        provider,
                        capability,
                    })
            })
            .collect::<Vec<_>>();
        candidates.sort_by_key(|candidate| {
            (
                candidate.capability.tier(),
                candidate.provider.descriptor().priority,
            )
        });
        candidates
    }
}
