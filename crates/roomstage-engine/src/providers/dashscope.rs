use reqwest::blocking::Client as HttpClient;
use roomstage_contracts::images::data_uri_from_bytes;
use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderDescriptor};
use roomstage_contracts::stages::Stage;
use serde_json::{json, Value};

use super::{
    non_empty_str, post_json, response_json_or_error, truncate_text, AsyncTaskHandle, ContentBlock,
    ProviderAdapter, ProviderCall, RawProviderReply, TaskStatus, TaskStatusSource,
};
use crate::config::QwenSettings;
use crate::error::ProviderError;

pub const QWEN_ID: &str = "qwen";
pub const WANX_ID: &str = "wanx";

const WANX_MODEL: &str = "wanx-v1";
const WANX_PROMPT_MAX_CHARS: usize = 500;

/// Status endpoint for DashScope asynchronous tasks.
#[derive(Debug, Clone)]
pub struct DashScopeTasks {
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl DashScopeTasks {
    pub fn new(settings: &QwenSettings, http: HttpClient) -> Self {
        Self {
            endpoint: settings.tasks_endpoint.clone(),
            api_key: settings.api_key.clone(),
            http,
        }
    }
}

impl TaskStatusSource for DashScopeTasks {
    fn task_status(&self, handle: &AsyncTaskHandle) -> Result<TaskStatus, ProviderError> {
        let url = format!("{}/{}", self.endpoint, handle.task_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|err| ProviderError::transport(&handle.provider, &err))?;
        let payload = response_json_or_error(&handle.provider, response)?;
        Ok(classify_task_status(&payload))
    }
}

/// Maps a task query body onto [`TaskStatus`]. Newer responses carry
/// `task_status`, older ones `status`.
pub(crate) fn classify_task_status(payload: &Value) -> TaskStatus {
    let output = payload.get("output");
    let status = output
        .and_then(|output| non_empty_str(output.get("task_status")).or(non_empty_str(output.get("status"))))
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "UNKNOWN".to_string());
    match status.as_str() {
        "SUCCEEDED" => {
            let first = output
                .and_then(|output| output.get("results"))
                .and_then(Value::as_array)
                .and_then(|rows| rows.first());
            let image = first
                .and_then(|row| non_empty_str(row.get("image")).or(non_empty_str(row.get("url"))))
                .map(str::to_string);
            TaskStatus::Succeeded { image }
        }
        "FAILED" | "CANCELED" => {
            let message = output
                .and_then(|output| non_empty_str(output.get("message")))
                .or(non_empty_str(payload.get("message")))
                .unwrap_or("task reported failure")
                .to_string();
            TaskStatus::Failed { message }
        }
        _ => TaskStatus::Pending { status },
    }
}

fn task_handle(provider: &str, payload: &Value) -> Option<AsyncTaskHandle> {
    non_empty_str(payload.get("output").and_then(|output| output.get("task_id"))).map(|task_id| {
        AsyncTaskHandle {
            task_id: task_id.to_string(),
            provider: provider.to_string(),
        }
    })
}

/// Qwen multimodal conversation: analyses photos and edits them.
pub struct QwenAdapter {
    descriptor: ProviderDescriptor,
    endpoint: String,
    model: String,
    api_key: String,
    tasks: DashScopeTasks,
    http: HttpClient,
}

impl QwenAdapter {
    pub fn new(
        settings: &QwenSettings,
        tasks: DashScopeTasks,
        http: HttpClient,
        priority: u32,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                QWEN_ID,
                &[Capability::TextAnalysis, Capability::ImageEdit],
                priority,
            ),
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            tasks,
            http,
        }
    }

    pub(crate) fn build_payload(model: &str, call: &ProviderCall<'_>) -> Value {
        let content = json!([
            { "image": data_uri_from_bytes(call.image) },
            { "text": call.instruction.text },
        ]);
        let parameters = if call.stage == Stage::SceneAnalysis {
            json!({
                "result_format": "message",
                "stream": false,
            })
        } else {
            json!({
                "result_format": "message",
                "stream": false,
                "n": 1,
                "watermark": true,
                "negative_prompt": call.instruction.negative,
            })
        };
        json!({
            "model": model,
            "input": {
                "messages": [
                    { "role": "user", "content": content }
                ]
            },
            "parameters": parameters,
        })
    }

    pub(crate) fn classify_reply(payload: &Value) -> Result<RawProviderReply, ProviderError> {
        let choices = payload
            .get("output")
            .and_then(|output| output.get("choices"))
            .and_then(Value::as_array);
        if let Some(choices) = choices {
            let blocks = choices
                .first()
                .and_then(|choice| choice.get("message"))
                .and_then(|message| message.get("content"))
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            if let Some(image) = non_empty_str(item.get("image")) {
                                return Some(ContentBlock::Image(image.to_string()));
                            }
                            item.get("text")
                                .and_then(Value::as_str)
                                .map(|text| ContentBlock::Text(text.to_string()))
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            return Ok(RawProviderReply::InlineMessage(blocks));
        }
        if let Some(handle) = task_handle(QWEN_ID, payload) {
            return Ok(RawProviderReply::AsyncTask(handle));
        }
        Err(ProviderError::malformed(
            QWEN_ID,
            format!(
                "unexpected response shape: {}",
                truncate_text(&payload.to_string(), 512)
            ),
        ))
    }
}

impl DescribedProvider for QwenAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for QwenAdapter {
    fn display_name(&self) -> &str {
        "Qwen image edit"
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        let payload = Self::build_payload(&self.model, call);
        tracing::debug!(
            provider = QWEN_ID,
            endpoint = %self.endpoint,
            model = %self.model,
            stage = call.stage.number(),
            image_bytes = call.image.len(),
            instruction_chars = call.instruction.text.chars().count(),
            "sending Qwen request"
        );
        let reply = post_json(&self.http, QWEN_ID, &self.endpoint, &self.api_key, &payload)?;
        Self::classify_reply(&reply)
    }

    fn task_source(&self) -> Option<&dyn TaskStatusSource> {
        Some(&self.tasks)
    }
}

/// Tongyi Wanx text-to-image. Same account as Qwen; cannot edit photos.
pub struct WanxAdapter {
    descriptor: ProviderDescriptor,
    endpoint: String,
    api_key: String,
    tasks: DashScopeTasks,
    http: HttpClient,
}

impl WanxAdapter {
    pub fn new(
        settings: &QwenSettings,
        tasks: DashScopeTasks,
        http: HttpClient,
        priority: u32,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(WANX_ID, &[Capability::TextToImageOnly], priority),
            endpoint: settings.wanx_endpoint.clone(),
            api_key: settings.api_key.clone(),
            tasks,
            http,
        }
    }

    pub(crate) fn build_payload(call: &ProviderCall<'_>) -> Value {
        json!({
            "model": WANX_MODEL,
            "input": {
                "prompt": truncate_prompt(&call.instruction.text),
                "negative_prompt": truncate_prompt(&call.instruction.negative),
            },
            "parameters": {
                "style": "<auto>",
                "size": "1024*1024",
                "n": 1,
            },
        })
    }

    pub(crate) fn classify_reply(payload: &Value) -> Result<RawProviderReply, ProviderError> {
        let first = payload
            .get("output")
            .and_then(|output| output.get("results"))
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());
        if let Some(image) =
            first.and_then(|row| non_empty_str(row.get("url")).or(non_empty_str(row.get("base64"))))
        {
            return Ok(RawProviderReply::GenerationOnly {
                image: image.to_string(),
            });
        }
        if let Some(handle) = task_handle(WANX_ID, payload) {
            return Ok(RawProviderReply::AsyncTask(handle));
        }
        Err(ProviderError::malformed(WANX_ID, "response carries neither an image nor a task id"))
    }
}

fn truncate_prompt(text: &str) -> String {
    text.chars().take(WANX_PROMPT_MAX_CHARS).collect()
}

impl DescribedProvider for WanxAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for WanxAdapter {
    fn display_name(&self) -> &str {
        "Tongyi Wanx"
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        let payload = Self::build_payload(call);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&payload)
            .send()
            .map_err(|err| ProviderError::transport(WANX_ID, &err))?;
        let reply = response_json_or_error(WANX_ID, response)?;
        Self::classify_reply(&reply)
    }

    fn task_source(&self) -> Option<&dyn TaskStatusSource> {
        Some(&self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use roomstage_contracts::stages::Stage;
    use serde_json::json;

    use super::*;
    use crate::compose::compose;

    #[test]
    fn analysis_payload_omits_edit_parameters() {
        let instruction = compose(Stage::SceneAnalysis, "", false, None, None);
        let call = ProviderCall {
            stage: Stage::SceneAnalysis,
            capability: Capability::TextAnalysis,
            image: &[0xFF, 0xD8, 0xFF],
            instruction: &instruction,
        };
        let payload = QwenAdapter::build_payload("qwen-vl", &call);
        assert_eq!(payload["model"], json!("qwen-vl"));
        let content = &payload["input"]["messages"][0]["content"];
        assert!(content[0]["image"]
            .as_str()
            .is_some_and(|uri| uri.starts_with("data:image/jpeg;base64,")));
        assert_eq!(content[1]["text"], json!(instruction.text));
        assert!(payload["parameters"].get("negative_prompt").is_none());
    }

    #[test]
    fn edit_payload_carries_negative_prompt() {
        let instruction = compose(Stage::BasicCleanup, "cups", false, None, None);
        let call = ProviderCall {
            stage: Stage::BasicCleanup,
            capability: Capability::ImageEdit,
            image: &[1, 2, 3],
            instruction: &instruction,
        };
        let payload = QwenAdapter::build_payload("qwen-image-edit-plus", &call);
        assert_eq!(payload["parameters"]["negative_prompt"], json!(instruction.negative));
        assert_eq!(payload["parameters"]["n"], json!(1));
        assert_eq!(payload["parameters"]["watermark"], json!(true));
    }

    #[test]
    fn qwen_inline_reply_keeps_text_and_image_blocks() -> anyhow::Result<()> {
        let reply = QwenAdapter::classify_reply(&json!({
            "output": {
                "choices": [{
                    "message": {
                        "content": [
                            { "text": "【杂乱物品清单】cups" },
                            { "image": "https://dashscope.example/out.png" }
                        ]
                    }
                }]
            }
        }))?;
        assert_eq!(
            reply,
            RawProviderReply::InlineMessage(vec![
                ContentBlock::Text("【杂乱物品清单】cups".to_string()),
                ContentBlock::Image("https://dashscope.example/out.png".to_string()),
            ])
        );
        Ok(())
    }

    #[test]
    fn qwen_task_reply_becomes_async_handle() -> anyhow::Result<()> {
        let reply = QwenAdapter::classify_reply(&json!({
            "output": { "task_id": "task-42", "task_status": "PENDING" }
        }))?;
        assert_eq!(
            reply,
            RawProviderReply::AsyncTask(AsyncTaskHandle {
                task_id: "task-42".to_string(),
                provider: QWEN_ID.to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn qwen_unknown_shape_is_malformed() {
        let err = QwenAdapter::classify_reply(&json!({ "code": "InvalidParameter" }))
            .expect_err("shape should be rejected");
        assert_eq!(err.provider(), QWEN_ID);
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn wanx_reply_is_generation_only_or_async() -> anyhow::Result<()> {
        let generated = WanxAdapter::classify_reply(&json!({
            "output": { "results": [{ "url": "https://dashscope.example/gen.png" }] }
        }))?;
        assert_eq!(
            generated,
            RawProviderReply::GenerationOnly {
                image: "https://dashscope.example/gen.png".to_string()
            }
        );

        let pending = WanxAdapter::classify_reply(&json!({
            "output": { "task_id": "wanx-7", "task_status": "PENDING" }
        }))?;
        assert!(matches!(pending, RawProviderReply::AsyncTask(handle) if handle.provider == WANX_ID));
        Ok(())
    }

    #[test]
    fn wanx_prompt_is_capped() {
        let instruction = crate::compose::Instruction {
            text: "x".repeat(2000),
            negative: "clutter".to_string(),
        };
        let call = ProviderCall {
            stage: Stage::AddProps,
            capability: Capability::TextToImageOnly,
            image: &[],
            instruction: &instruction,
        };
        let payload = WanxAdapter::build_payload(&call);
        assert_eq!(
            payload["input"]["prompt"].as_str().map(|text| text.chars().count()),
            Some(WANX_PROMPT_MAX_CHARS)
        );
    }

    #[test]
    fn task_status_classification() {
        assert_eq!(
            classify_task_status(&json!({
                "output": { "task_status": "SUCCEEDED", "results": [{ "image": "aGVsbG8=" }] }
            })),
            TaskStatus::Succeeded {
                image: Some("aGVsbG8=".to_string())
            }
        );
        assert_eq!(
            classify_task_status(&json!({
                "output": { "status": "SUCCEEDED", "results": [{ "url": "https://x/y.png" }] }
            })),
            TaskStatus::Succeeded {
                image: Some("https://x/y.png".to_string())
            }
        );
        assert_eq!(
            classify_task_status(&json!({
                "output": { "task_status": "FAILED", "message": "content moderation" }
            })),
            TaskStatus::Failed {
                message: "content moderation".to_string()
            }
        );
        assert_eq!(
            classify_task_status(&json!({ "output": { "task_status": "RUNNING" } })),
            TaskStatus::Pending {
                status: "RUNNING".to_string()
            }
        );
        assert_eq!(
            classify_task_status(&json!({})),
            TaskStatus::Pending {
                status: "UNKNOWN".to_string()
            }
        );
    }
}
