use std::env;
use std::time::Duration;

use crate::poller::PollSettings;

pub const DEFAULT_QWEN_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
pub const DEFAULT_QWEN_MODEL: &str = "qwen-image-edit-plus";
pub const DEFAULT_DASHSCOPE_TASKS: &str = "https://dashscope.aliyuncs.com/api/v1/tasks";
pub const DEFAULT_WANX_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text2image/image-synthesis";
pub const DEFAULT_STABILITY_BASE: &str = "https://api.stability.ai";
pub const DEFAULT_STABILITY_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_ATTEMPTS: u32 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
/// Priorities of adapters not named in an explicit order are shifted past it.
const UNLISTED_PRIORITY_OFFSET: u32 = 100;

/// DashScope account settings, shared by the Qwen and Wanx adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QwenSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub tasks_endpoint: String,
    pub wanx_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilitySettings {
    pub api_key: String,
    pub api_base: String,
    pub engine: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub api_base: String,
}

/// Process-wide engine configuration. Read once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub qwen: Option<QwenSettings>,
    pub stability: Option<StabilitySettings>,
    pub openai: Option<OpenAiSettings>,
    pub poll: PollSettings,
    pub request_timeout: Duration,
    pub provider_order: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Values are
    /// trimmed and empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let base = |key: &str, default: &str| {
            get(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| default.to_string())
        };

        let qwen = get("QWEN_API_KEY").map(|api_key| QwenSettings {
            api_key,
            endpoint: base("QWEN_API_URL", DEFAULT_QWEN_ENDPOINT),
            model: get("QWEN_MODEL").unwrap_or_else(|| DEFAULT_QWEN_MODEL.to_string()),
            tasks_endpoint: base("QWEN_TASK_URL", DEFAULT_DASHSCOPE_TASKS),
            wanx_endpoint: base("QWEN_WANX_URL", DEFAULT_WANX_ENDPOINT),
        });
        let stability = get("STABILITY_API_KEY").map(|api_key| StabilitySettings {
            api_key,
            api_base: base("STABILITY_API_BASE", DEFAULT_STABILITY_BASE),
            engine: get("STABILITY_ENGINE").unwrap_or_else(|| DEFAULT_STABILITY_ENGINE.to_string()),
        });
        let openai = get("OPENAI_API_KEY").map(|api_key| OpenAiSettings {
            api_key,
            api_base: base("OPENAI_API_BASE", DEFAULT_OPENAI_BASE),
        });

        let poll = PollSettings {
            max_attempts: get("ROOMSTAGE_POLL_ATTEMPTS")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_POLL_ATTEMPTS),
            interval: Duration::from_millis(
                get("ROOMSTAGE_POLL_INTERVAL_MS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };
        let request_timeout = Duration::from_secs(
            get("ROOMSTAGE_REQUEST_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let provider_order = get("ROOMSTAGE_PROVIDER_ORDER")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            qwen,
            stability,
            openai,
            poll,
            request_timeout,
            provider_order,
        }
    }

    pub fn has_any_provider(&self) -> bool {
        self.qwen.is_some() || self.stability.is_some() || self.openai.is_some()
    }

    /// Position in the explicit order when listed, otherwise the adapter's
    /// default priority placed after every listed adapter.
    pub fn priority_for(&self, id: &str, default: u32) -> u32 {
        self.provider_order
            .iter()
            .position(|listed| listed == id)
            .map(|index| index as u32)
            .unwrap_or(UNLISTED_PRIORITY_OFFSET + default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn empty_environment_enables_nothing() {
        let config = EngineConfig::default();
        assert!(!config.has_any_provider());
        assert_eq!(config.poll.max_attempts, 30);
        assert_eq!(config.poll.interval, Duration::from_millis(2000));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn blank_keys_count_as_unset() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("QWEN_API_KEY", "   "),
            ("STABILITY_API_KEY", ""),
        ]));
        assert!(!config.has_any_provider());
    }

    #[test]
    fn qwen_settings_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[("QWEN_API_KEY", " dash-key \n")]));
        let qwen = config.qwen.expect("qwen configured");
        assert_eq!(qwen.api_key, "dash-key");
        assert_eq!(qwen.endpoint, DEFAULT_QWEN_ENDPOINT);
        assert_eq!(qwen.model, DEFAULT_QWEN_MODEL);
        assert_eq!(qwen.tasks_endpoint, DEFAULT_DASHSCOPE_TASKS);
    }

    #[test]
    fn overrides_are_trimmed_and_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("STABILITY_API_KEY", "sk"),
            ("STABILITY_API_BASE", "https://stability.internal/ "),
            ("ROOMSTAGE_POLL_ATTEMPTS", "5"),
            ("ROOMSTAGE_POLL_INTERVAL_MS", "250"),
            ("ROOMSTAGE_REQUEST_TIMEOUT_SECS", "0"),
            ("ROOMSTAGE_PROVIDER_ORDER", " dall-e ,, qwen "),
        ]));
        let stability = config.stability.clone().expect("stability configured");
        assert_eq!(stability.api_base, "https://stability.internal");
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.provider_order, vec!["dall-e", "qwen"]);
        assert_eq!(config.priority_for("dall-e", 5), 0);
        assert_eq!(config.priority_for("qwen", 1), 1);
        assert_eq!(config.priority_for("wanx", 3), 103);
    }
}
