//! Outcomes returned when no provider produced a real result.
//!
//! Both kinds are clearly labeled through [`OutcomeOrigin`] and are never
//! merged into pipeline state.

use reqwest::Url;
use roomstage_contracts::pipeline::{ImageOutcome, OutcomeOrigin, StageOutcome, TextOutcome};
use roomstage_contracts::stages::Stage;

use crate::error::{ChainExhausted, NoProviderConfigured};

const PLACEHOLDER_BASE: &str = "https://placehold.co/600x400/4a86e8/ffffff";

pub fn placeholder_url(caption: &str) -> String {
    Url::parse_with_params(PLACEHOLDER_BASE, &[("text", caption)])
        .map(String::from)
        .unwrap_or_else(|_| PLACEHOLDER_BASE.to_string())
}

/// Every candidate failed. Stage 1 yields a text outcome carrying the error
/// summary and an empty clutter list.
pub fn placeholder(exhausted: &ChainExhausted) -> StageOutcome {
    let stage = exhausted.stage;
    let summary = exhausted.summary();
    if stage == Stage::SceneAnalysis {
        return StageOutcome::Text(TextOutcome {
            analysis: format!("Scene analysis is unavailable right now. {summary}"),
            description: format!("{stage} failed with every configured provider."),
            clutter_list: String::new(),
            provider: None,
            origin: OutcomeOrigin::Placeholder,
        });
    }
    StageOutcome::Image(ImageOutcome {
        image_url: placeholder_url(&format!("Stage {} unavailable", stage.number())),
        description: format!("{stage} could not be completed: {summary}"),
        provider: None,
        origin: OutcomeOrigin::Placeholder,
    })
}

/// No adapter is configured for the stage at all.
pub fn simulated(missing: NoProviderConfigured, scenario: Option<&str>) -> StageOutcome {
    let stage = missing.stage;
    let notice = "Simulated result: no AI provider is configured. Set an API key to use a real service.";
    if stage == Stage::SceneAnalysis {
        return StageOutcome::Text(TextOutcome {
            analysis: notice.to_string(),
            description: format!("{stage} was simulated."),
            clutter_list: String::new(),
            provider: None,
            origin: OutcomeOrigin::Simulated,
        });
    }
    let caption = scenario
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Stage {} simulated", stage.number()));
    StageOutcome::Image(ImageOutcome {
        image_url: placeholder_url(&caption),
        description: format!("{stage} was simulated. {notice}"),
        provider: None,
        origin: OutcomeOrigin::Simulated,
    })
}
