//! Translation of classified provider replies into stage outcomes.
//!
//! This is the only place where a reply becomes a [`StageOutcome`]; async
//! replies are resolved through the [`TaskPoller`] first.

use roomstage_contracts::pipeline::{ImageOutcome, OutcomeOrigin, StageOutcome, TextOutcome};
use roomstage_contracts::providers::{Capability, DescribedProvider};
use roomstage_contracts::stages::Stage;

use crate::clutter::extract_clutter_list;
use crate::error::ProviderError;
use crate::poller::{PollSettings, TaskPoller};
use crate::providers::{ContentBlock, ProviderAdapter, RawProviderReply};

pub const DEFAULT_ANALYSIS: &str = "Scene analysis complete. No details were returned.";

const GENERATED_NOTE: &str =
    "This is a newly generated image, not an edit of your photo; the room may look different.";

/// Text and image material of a reply once any async task has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedReply {
    text: String,
    image: Option<String>,
    generated: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    poller: TaskPoller,
}

impl ResponseNormalizer {
    pub fn new(poll: PollSettings) -> Self {
        Self {
            poller: TaskPoller::new(poll),
        }
    }

    pub fn normalize(
        &self,
        stage: Stage,
        adapter: &dyn ProviderAdapter,
        capability: Capability,
        reply: RawProviderReply,
    ) -> Result<StageOutcome, ProviderError> {
        if stage == Stage::SceneAnalysis && !matches!(reply, RawProviderReply::InlineMessage(_)) {
            return Err(ProviderError::malformed(
                adapter.id(),
                format!("{stage} needs a text reply, got {}", reply.kind()),
            ));
        }
        let resolved = self.resolve(adapter, capability, reply)?;
        let provider = Some(adapter.id().to_string());

        if stage == Stage::SceneAnalysis {
            let analysis = if resolved.text.trim().is_empty() {
                DEFAULT_ANALYSIS.to_string()
            } else {
                resolved.text.trim().to_string()
            };
            let clutter_list = extract_clutter_list(&analysis);
            return Ok(StageOutcome::Text(TextOutcome {
                description: describe(stage, adapter.display_name(), false),
                analysis,
                clutter_list,
                provider,
                origin: OutcomeOrigin::Analyzed,
            }));
        }

        let Some(image) = resolved.image else {
            return Err(ProviderError::malformed(
                adapter.id(),
                format!("reply for {stage} carried no image"),
            ));
        };
        let origin = if resolved.generated {
            OutcomeOrigin::Generated
        } else {
            OutcomeOrigin::Edited
        };
        Ok(StageOutcome::Image(ImageOutcome {
            image_url: displayable_image(&image),
            description: describe(stage, adapter.display_name(), resolved.generated),
            provider,
            origin,
        }))
    }

    fn resolve(
        &self,
        adapter: &dyn ProviderAdapter,
        capability: Capability,
        reply: RawProviderReply,
    ) -> Result<ResolvedReply, ProviderError> {
        let text_to_image = capability == Capability::TextToImageOnly;
        match reply {
            RawProviderReply::InlineMessage(blocks) => {
                let mut texts = Vec::new();
                let mut image = None;
                for block in blocks {
                    match block {
                        ContentBlock::Text(text) if !text.trim().is_empty() => texts.push(text),
                        ContentBlock::Text(_) => {}
                        ContentBlock::Image(raw) => {
                            image.get_or_insert(raw);
                        }
                    }
                }
                Ok(ResolvedReply {
                    text: texts.join("\n"),
                    image,
                    generated: text_to_image,
                })
            }
            RawProviderReply::GenerationOnly { image } => Ok(ResolvedReply {
                text: String::new(),
                image: Some(image),
                generated: true,
            }),
            RawProviderReply::AsyncTask(handle) => {
                let Some(source) = adapter.task_source() else {
                    return Err(ProviderError::malformed(
                        adapter.id(),
                        format!("returned task {} but exposes no status endpoint", handle.task_id),
                    ));
                };
                let image = self.poller.poll(source, &handle)?;
                Ok(ResolvedReply {
                    text: String::new(),
                    image: Some(image),
                    generated: text_to_image,
                })
            }
        }
    }
}

/// `http(s)` URLs and data URIs pass through; anything else is taken to be
/// bare base64 PNG data.
pub fn displayable_image(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("data:image")
    {
        return trimmed.to_string();
    }
    format!("data:image/png;base64,{trimmed}")
}

fn describe(stage: Stage, provider_name: &str, generated: bool) -> String {
    let summary = match stage {
        Stage::SceneAnalysis => "Scene analysed: room overview, clutter list and tidying advice.",
        Stage::BasicCleanup => "Basic cleanup done: visible trash and loose clutter removed.",
        Stage::DeepCleanup => "Deep cleanup done: stains, marks and small leftovers removed.",
        Stage::LayoutOptimize => "Layout optimized: remaining items neatly arranged.",
        Stage::AddProps => "Props added to match the requested scenario.",
    };
    if generated {
        return format!("{summary} Produced by {provider_name}. {GENERATED_NOTE}");
    }
    format!("{summary} Produced by {provider_name}.")
}
