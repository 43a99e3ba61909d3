use reqwest::blocking::Client as HttpClient;
use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderDescriptor};
use serde_json::{json, Value};

use super::{non_empty_str, post_json, ProviderAdapter, ProviderCall, RawProviderReply};
use crate::config::OpenAiSettings;
use crate::error::ProviderError;

pub const DALLE_ID: &str = "dall-e";

const DALLE_MODEL: &str = "dall-e-3";
const PROMPT_MAX_CHARS: usize = 4000;

pub struct DalleAdapter {
    descriptor: ProviderDescriptor,
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl DalleAdapter {
    pub fn new(settings: &OpenAiSettings, http: HttpClient, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(DALLE_ID, &[Capability::TextToImageOnly], priority),
            endpoint: format!("{}/images/generations", settings.api_base),
            api_key: settings.api_key.clone(),
            http,
        }
    }

    /// DALL-E has no negative prompt, so the avoid-list is folded into the
    /// prompt text before truncation.
    pub(crate) fn build_payload(call: &ProviderCall<'_>) -> Value {
        let prompt = format!(
            "{} Avoid: {}.",
            call.instruction.text, call.instruction.negative
        );
        json!({
            "model": DALLE_MODEL,
            "prompt": prompt.chars().take(PROMPT_MAX_CHARS).collect::<String>(),
            "n": 1,
            "size": "1024x1024",
        })
    }

    pub(crate) fn classify_reply(payload: &Value) -> Result<RawProviderReply, ProviderError> {
        let first = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());
        first
            .and_then(|row| non_empty_str(row.get("url")).or(non_empty_str(row.get("b64_json"))))
            .map(|image| RawProviderReply::GenerationOnly {
                image: image.to_string(),
            })
            .ok_or_else(|| ProviderError::malformed(DALLE_ID, "response missing data[0].url"))
    }
}

impl DescribedProvider for DalleAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for DalleAdapter {
    fn display_name(&self) -> &str {
        "DALL-E 3"
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        let payload = Self::build_payload(call);
        let reply = post_json(&self.http, DALLE_ID, &self.endpoint, &self.api_key, &payload)?;
        Self::classify_reply(&reply)
    }
}
