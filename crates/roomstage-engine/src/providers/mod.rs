//! Provider adapters and the reply shapes they hand to the normalizer.
//!
//! Each adapter owns one wire protocol. Whatever the protocol looks like, the
//! adapter classifies the reply into [`RawProviderReply`]; nothing past this
//! module sees provider JSON.

mod dashscope;
mod openai;
mod stability;

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderDescriptor};
use roomstage_contracts::stages::Stage;
use serde_json::Value;

use crate::compose::Instruction;
use crate::config::EngineConfig;
use crate::error::ProviderError;

pub use dashscope::{DashScopeTasks, QwenAdapter, WanxAdapter, QWEN_ID, WANX_ID};
pub use openai::{DalleAdapter, DALLE_ID};
pub use stability::{
    StabilityImageToImageAdapter, StabilityTextToImageAdapter, STABILITY_I2I_ID, STABILITY_T2I_ID,
};

/// One block of an inline message reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    /// An `http(s)` URL, a data URI or bare base64 image data.
    Image(String),
}

/// Deferred provider work. Only lives for the duration of one poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncTaskHandle {
    pub task_id: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawProviderReply {
    InlineMessage(Vec<ContentBlock>),
    AsyncTask(AsyncTaskHandle),
    /// A freshly generated image unrelated to the input photo.
    GenerationOnly { image: String },
}

impl RawProviderReply {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InlineMessage(_) => "inline message",
            Self::AsyncTask(_) => "async task",
            Self::GenerationOnly { .. } => "generated image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending { status: String },
    Succeeded { image: Option<String> },
    Failed { message: String },
}

pub trait TaskStatusSource: Send + Sync {
    fn task_status(&self, handle: &AsyncTaskHandle) -> Result<TaskStatus, ProviderError>;
}

/// Everything an adapter needs for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCall<'a> {
    pub stage: Stage,
    pub capability: Capability,
    pub image: &'a [u8],
    pub instruction: &'a Instruction,
}

pub trait ProviderAdapter: DescribedProvider + Send + Sync {
    /// Human-readable name used in outcome descriptions.
    fn display_name(&self) -> &str;

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError>;

    /// Adapters that may answer with [`RawProviderReply::AsyncTask`] expose
    /// the status endpoint here.
    fn task_source(&self) -> Option<&dyn TaskStatusSource> {
        None
    }
}

impl DescribedProvider for Box<dyn ProviderAdapter> {
    fn descriptor(&self) -> &ProviderDescriptor {
        (**self).descriptor()
    }
}

pub fn http_client(timeout: Duration) -> anyhow::Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build provider HTTP client")
}

/// Adapters enabled by `config`, in registration order. Adapters whose key is
/// not configured are left out entirely.
pub fn build_adapters(config: &EngineConfig, http: &HttpClient) -> Vec<Box<dyn ProviderAdapter>> {
    let mut adapters: Vec<Box<dyn ProviderAdapter>> = Vec::new();
    if let Some(qwen) = &config.qwen {
        let tasks = DashScopeTasks::new(qwen, http.clone());
        adapters.push(Box::new(QwenAdapter::new(
            qwen,
            tasks.clone(),
            http.clone(),
            config.priority_for(QWEN_ID, 1),
        )));
        adapters.push(Box::new(WanxAdapter::new(
            qwen,
            tasks,
            http.clone(),
            config.priority_for(WANX_ID, 3),
        )));
    }
    if let Some(stability) = &config.stability {
        adapters.push(Box::new(StabilityImageToImageAdapter::new(
            stability,
            http.clone(),
            config.priority_for(STABILITY_I2I_ID, 2),
        )));
        adapters.push(Box::new(StabilityTextToImageAdapter::new(
            stability,
            http.clone(),
            config.priority_for(STABILITY_T2I_ID, 4),
        )));
    }
    if let Some(openai) = &config.openai {
        adapters.push(Box::new(DalleAdapter::new(
            openai,
            http.clone(),
            config.priority_for(DALLE_ID, 5),
        )));
    }
    adapters
}

/// Reads a JSON body, turning non-2xx statuses and unparsable bodies into
/// provider errors.
pub(crate) fn response_json_or_error(
    provider: &str,
    response: HttpResponse,
) -> Result<Value, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| ProviderError::transport(provider, &err))?;
    if !status.is_success() {
        return Err(ProviderError::http(provider, status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|err| {
        ProviderError::malformed(provider, format!("returned invalid JSON payload: {err}"))
    })
}

pub(crate) fn post_json(
    http: &HttpClient,
    provider: &str,
    endpoint: &str,
    api_key: &str,
    payload: &Value,
) -> Result<Value, ProviderError> {
    let response = http
        .post(endpoint)
        .bearer_auth(api_key)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(payload)
        .send()
        .map_err(|err| ProviderError::transport(provider, &err))?;
    response_json_or_error(provider, response)
}

pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use roomstage_contracts::providers::ProviderRegistry;
    use roomstage_contracts::stages::Stage;

    use super::*;
    use crate::config::EngineConfig;

    fn config_with(keys: &[(&str, &str)]) -> EngineConfig {
        EngineConfig::from_lookup(|key| {
            keys.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        })
    }

    #[test]
    fn only_configured_providers_are_built() -> anyhow::Result<()> {
        let http = http_client(Duration::from_secs(5))?;
        assert!(build_adapters(&config_with(&[]), &http).is_empty());

        let adapters = build_adapters(&config_with(&[("STABILITY_API_KEY", "sk-test")]), &http);
        let ids = adapters
            .iter()
            .map(|adapter| adapter.id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![STABILITY_I2I_ID, STABILITY_T2I_ID]);
        Ok(())
    }

    #[test]
    fn default_order_prefers_edits_then_same_family_generation() -> anyhow::Result<()> {
        let http = http_client(Duration::from_secs(5))?;
        let config = config_with(&[
            ("QWEN_API_KEY", "dash-key"),
            ("STABILITY_API_KEY", "sk-test"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]);
        let registry = ProviderRegistry::new(build_adapters(&config, &http));

        let image_order = registry
            .candidates(Stage::BasicCleanup)
            .iter()
            .map(|candidate| candidate.provider.id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            image_order,
            vec![QWEN_ID, STABILITY_I2I_ID, WANX_ID, STABILITY_T2I_ID, DALLE_ID]
        );

        let analysis_order = registry
            .candidates(Stage::SceneAnalysis)
            .iter()
            .map(|candidate| candidate.provider.id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(analysis_order, vec![QWEN_ID]);
        Ok(())
    }

    #[test]
    fn configured_order_overrides_default_priorities() -> anyhow::Result<()> {
        let http = http_client(Duration::from_secs(5))?;
        let config = config_with(&[
            ("QWEN_API_KEY", "dash-key"),
            ("STABILITY_API_KEY", "sk-test"),
            ("ROOMSTAGE_PROVIDER_ORDER", "stability-image-to-image, dall-e"),
        ]);
        let registry = ProviderRegistry::new(build_adapters(&config, &http));
        let first = registry
            .candidates(Stage::DeepCleanup)
            .first()
            .map(|candidate| candidate.provider.id().to_string());
        assert_eq!(first.as_deref(), Some(STABILITY_I2I_ID));
        Ok(())
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
