//! Bounded polling of asynchronous provider tasks.

use std::thread;
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::{AsyncTaskHandle, TaskStatus, TaskStatusSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(2000),
        }
    }
}

/// Waits `interval` before every status query and gives up after
/// `max_attempts` queries.
#[derive(Debug, Clone)]
pub struct TaskPoller {
    settings: PollSettings,
}

impl TaskPoller {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Returns the finished image. A transient query error is retried unless
    /// it happens on the final attempt.
    pub fn poll(
        &self,
        source: &dyn TaskStatusSource,
        handle: &AsyncTaskHandle,
    ) -> Result<String, ProviderError> {
        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if !self.settings.interval.is_zero() {
                thread::sleep(self.settings.interval);
            }
            match source.task_status(handle) {
                Ok(TaskStatus::Succeeded { image: Some(image) }) => {
                    tracing::debug!(
                        provider = %handle.provider,
                        task_id = %handle.task_id,
                        attempt,
                        "task succeeded"
                    );
                    return Ok(image);
                }
                Ok(TaskStatus::Succeeded { image: None }) => {
                    return Err(ProviderError::malformed(
                        &handle.provider,
                        format!("task {} succeeded without an image", handle.task_id),
                    ));
                }
                Ok(TaskStatus::Failed { message }) => {
                    return Err(ProviderError::TaskFailed {
                        provider: handle.provider.clone(),
                        task_id: handle.task_id.clone(),
                        message,
                    });
                }
                Ok(TaskStatus::Pending { status }) => {
                    tracing::trace!(
                        provider = %handle.provider,
                        task_id = %handle.task_id,
                        attempt,
                        status = %status,
                        "task still pending"
                    );
                }
                Err(err) if attempt == max_attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        provider = %handle.provider,
                        task_id = %handle.task_id,
                        attempt,
                        error = %err,
                        "task status query failed; retrying"
                    );
                }
            }
        }
        Err(ProviderError::TaskTimeout {
            provider: handle.provider.clone(),
            task_id: handle.task_id.clone(),
            attempts: max_attempts,
        })
    }
}
