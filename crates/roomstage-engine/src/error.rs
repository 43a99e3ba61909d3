//! Error taxonomy for stage execution.
//!
//! Only [`ValidationError`] and internal failures ever reach the caller as
//! errors. Provider-side failures are absorbed by the fallback chain.

use roomstage_contracts::stages::Stage;
use thiserror::Error;

use crate::providers::truncate_text;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// A single provider attempt went wrong. Every variant triggers fallback.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed{}: {message}", status_suffix(.http_status))]
    Request {
        provider: String,
        http_status: Option<u16>,
        message: String,
    },

    #[error("{provider} task {task_id} failed: {message}")]
    TaskFailed {
        provider: String,
        task_id: String,
        message: String,
    },

    #[error("{provider} task {task_id} did not finish after {attempts} attempts")]
    TaskTimeout {
        provider: String,
        task_id: String,
        attempts: u32,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl ProviderError {
    pub fn http(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Self::Request {
            provider: provider.into(),
            http_status: Some(status),
            message: truncate_text(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            http_status: None,
            message: message.into(),
        }
    }

    pub fn transport(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::Request {
            provider: provider.into(),
            http_status: err.status().map(|status| status.as_u16()),
            message: truncate_text(&err.to_string(), MAX_ERROR_BODY_CHARS),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Request { provider, .. }
            | Self::TaskFailed { provider, .. }
            | Self::TaskTimeout { provider, .. } => provider,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Request { http_status, .. } => *http_status,
            Self::TaskFailed { .. } | Self::TaskTimeout { .. } => None,
        }
    }
}

/// Bad or missing request fields. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown stage {0} (expected 1-5)")]
    UnknownStage(u8),

    #[error("missing scenario for stage 5")]
    MissingScenario,

    #[error("missing image for {0}")]
    MissingImage(Stage),

    #[error("{stage} requires {required} to complete first")]
    PrerequisiteMissing { stage: Stage, required: Stage },

    #[error("failed to load image: {0}")]
    ImageLoad(String),
}

/// No adapter at all can serve the stage. Detected before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no provider configured for {stage}")]
pub struct NoProviderConfigured {
    pub stage: Stage,
}

/// Every candidate adapter failed for one stage invocation.
#[derive(Debug, Error)]
#[error("all providers failed for {stage}: {}", summarize(.failures))]
pub struct ChainExhausted {
    pub stage: Stage,
    pub failures: Vec<ProviderError>,
}

fn summarize(failures: &[ProviderError]) -> String {
    if failures.is_empty() {
        return "no attempts recorded".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ChainExhausted {
    /// One-line summary for the degraded outcome shown to the user.
    pub fn summary(&self) -> String {
        summarize(&self.failures)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl StageError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
