use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use roomstage_contracts::images::mime_for_bytes;
use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderDescriptor};
use serde_json::{json, Value};

use super::{
    non_empty_str, post_json, response_json_or_error, ContentBlock, ProviderAdapter, ProviderCall,
    RawProviderReply,
};
use crate::config::StabilitySettings;
use crate::error::ProviderError;

pub const STABILITY_I2I_ID: &str = "stability-image-to-image";
pub const STABILITY_T2I_ID: &str = "stability-text-to-image";

const IMAGE_STRENGTH: f64 = 0.35;
const CFG_SCALE: u32 = 7;
const STEPS: u32 = 30;
const PROMPT_MAX_CHARS: usize = 2000;

fn prompt_text(text: &str) -> String {
    text.chars().take(PROMPT_MAX_CHARS).collect()
}

/// First artifact of a v1 generation response, as raw base64.
fn first_artifact(provider: &str, payload: &Value) -> Result<String, ProviderError> {
    let artifact = payload
        .get("artifacts")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first());
    if let Some(reason) = artifact.and_then(|row| non_empty_str(row.get("finishReason"))) {
        if reason.eq_ignore_ascii_case("CONTENT_FILTERED") {
            return Err(ProviderError::malformed(provider, "artifact was content filtered"));
        }
    }
    artifact
        .and_then(|row| non_empty_str(row.get("base64")))
        .map(str::to_string)
        .ok_or_else(|| ProviderError::malformed(provider, "response missing artifacts[0].base64"))
}

/// Stability v1 image-to-image: keeps the photo's composition and applies the
/// cleanup prompt at a low image strength.
pub struct StabilityImageToImageAdapter {
    descriptor: ProviderDescriptor,
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl StabilityImageToImageAdapter {
    pub fn new(settings: &StabilitySettings, http: HttpClient, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(STABILITY_I2I_ID, &[Capability::ImageEdit], priority),
            endpoint: format!(
                "{}/v1/generation/{}/image-to-image",
                settings.api_base, settings.engine
            ),
            api_key: settings.api_key.clone(),
            http,
        }
    }

    /// Text fields of the multipart form, in submission order.
    pub(crate) fn form_fields(call: &ProviderCall<'_>) -> Vec<(&'static str, String)> {
        vec![
            ("text_prompts[0][text]", prompt_text(&call.instruction.text)),
            ("text_prompts[0][weight]", "1".to_string()),
            ("text_prompts[1][text]", prompt_text(&call.instruction.negative)),
            ("text_prompts[1][weight]", "-1".to_string()),
            ("init_image_mode", "IMAGE_STRENGTH".to_string()),
            ("image_strength", IMAGE_STRENGTH.to_string()),
            ("cfg_scale", CFG_SCALE.to_string()),
            ("samples", "1".to_string()),
            ("steps", STEPS.to_string()),
        ]
    }
}

impl DescribedProvider for StabilityImageToImageAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for StabilityImageToImageAdapter {
    fn display_name(&self) -> &str {
        "Stability image-to-image"
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        let mime = mime_for_bytes(call.image);
        let extension = mime.rsplit('/').next().unwrap_or("jpeg");
        let init_image = MultipartPart::bytes(call.image.to_vec())
            .file_name(format!("init.{extension}"))
            .mime_str(mime)
            .map_err(|err| ProviderError::transport(STABILITY_I2I_ID, &err))?;
        let mut form = MultipartForm::new().part("init_image", init_image);
        for (name, value) in Self::form_fields(call) {
            form = form.text(name, value);
        }
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .map_err(|err| ProviderError::transport(STABILITY_I2I_ID, &err))?;
        let payload = response_json_or_error(STABILITY_I2I_ID, response)?;
        let image = first_artifact(STABILITY_I2I_ID, &payload)?;
        Ok(RawProviderReply::InlineMessage(vec![ContentBlock::Image(image)]))
    }
}

/// Stability v1 text-to-image. Last resort: ignores the photo.
pub struct StabilityTextToImageAdapter {
    descriptor: ProviderDescriptor,
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl StabilityTextToImageAdapter {
    pub fn new(settings: &StabilitySettings, http: HttpClient, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                STABILITY_T2I_ID,
                &[Capability::TextToImageOnly],
                priority,
            ),
            endpoint: format!(
                "{}/v1/generation/{}/text-to-image",
                settings.api_base, settings.engine
            ),
            api_key: settings.api_key.clone(),
            http,
        }
    }

    pub(crate) fn build_payload(call: &ProviderCall<'_>) -> Value {
        json!({
            "text_prompts": [
                { "text": prompt_text(&call.instruction.text), "weight": 1.0 },
                { "text": prompt_text(&call.instruction.negative), "weight": -1.0 },
            ],
            "cfg_scale": CFG_SCALE,
            "width": 1024,
            "height": 1024,
            "samples": 1,
            "steps": STEPS,
        })
    }
}

impl DescribedProvider for StabilityTextToImageAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for StabilityTextToImageAdapter {
    fn display_name(&self) -> &str {
        "Stability text-to-image"
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        let payload = Self::build_payload(call);
        let reply = post_json(&self.http, STABILITY_T2I_ID, &self.endpoint, &self.api_key, &payload)?;
        let image = first_artifact(STABILITY_T2I_ID, &reply)?;
        Ok(RawProviderReply::GenerationOnly { image })
    }
}
