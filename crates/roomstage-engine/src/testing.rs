//! Scripted in-memory adapters shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderDescriptor};
use roomstage_contracts::stages::Stage;

use crate::compose::Instruction;
use crate::error::ProviderError;
use crate::providers::{
    AsyncTaskHandle, ContentBlock, ProviderAdapter, ProviderCall, RawProviderReply, TaskStatus,
    TaskStatusSource,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCall {
    pub provider: String,
    pub stage: Stage,
    pub capability: Capability,
    pub instruction: Instruction,
    pub image_len: usize,
}

/// Invocation log shared between every adapter of one test.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn providers(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.provider).collect()
    }

    fn push(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }
}

pub(crate) struct ScriptedAdapter {
    descriptor: ProviderDescriptor,
    replies: Mutex<VecDeque<Result<RawProviderReply, ProviderError>>>,
    statuses: Option<Mutex<VecDeque<Result<TaskStatus, ProviderError>>>>,
    log: CallLog,
}

impl ScriptedAdapter {
    pub fn new(id: &str, capabilities: &[Capability], priority: u32, log: &CallLog) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(id, capabilities, priority),
            replies: Mutex::new(VecDeque::new()),
            statuses: None,
            log: log.clone(),
        }
    }

    pub fn reply(self, reply: Result<RawProviderReply, ProviderError>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.reply(Ok(RawProviderReply::InlineMessage(vec![ContentBlock::Text(
            text.to_string(),
        )])))
    }

    pub fn image(self, image: &str) -> Self {
        self.reply(Ok(RawProviderReply::InlineMessage(vec![ContentBlock::Image(
            image.to_string(),
        )])))
    }

    pub fn generated(self, image: &str) -> Self {
        self.reply(Ok(RawProviderReply::GenerationOnly {
            image: image.to_string(),
        }))
    }

    pub fn http_failure(self, status: u16) -> Self {
        let id = self.descriptor.id.clone();
        self.reply(Err(ProviderError::http(id, status, "scripted failure")))
    }

    /// Makes the adapter answer with a task handle and serve `statuses` from
    /// its status endpoint.
    pub fn async_task(mut self, task_id: &str, statuses: Vec<Result<TaskStatus, ProviderError>>) -> Self {
        self.statuses = Some(Mutex::new(statuses.into_iter().collect()));
        let handle = AsyncTaskHandle {
            task_id: task_id.to_string(),
            provider: self.descriptor.id.clone(),
        };
        self.reply(Ok(RawProviderReply::AsyncTask(handle)))
    }

    pub fn boxed(self) -> Box<dyn ProviderAdapter> {
        Box::new(self)
    }
}

impl DescribedProvider for ScriptedAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn display_name(&self) -> &str {
        &self.descriptor.id
    }

    fn invoke(&self, call: &ProviderCall<'_>) -> Result<RawProviderReply, ProviderError> {
        self.log.push(RecordedCall {
            provider: self.descriptor.id.clone(),
            stage: call.stage,
            capability: call.capability,
            instruction: call.instruction.clone(),
            image_len: call.image.len(),
        });
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| {
                Err(ProviderError::malformed(
                    self.descriptor.id.clone(),
                    "no scripted reply left",
                ))
            })
    }

    fn task_source(&self) -> Option<&dyn TaskStatusSource> {
        self.statuses.as_ref().map(|_| self as &dyn TaskStatusSource)
    }
}

impl TaskStatusSource for ScriptedAdapter {
    fn task_status(&self, _handle: &AsyncTaskHandle) -> Result<TaskStatus, ProviderError> {
        self.statuses
            .as_ref()
            .and_then(|statuses| statuses.lock().ok()?.pop_front())
            .unwrap_or(Ok(TaskStatus::Pending {
                status: "RUNNING".to_string(),
            }))
    }
}

pub(crate) fn scripted_image_bytes() -> Vec<u8> {
    // PNG signature followed by filler; enough for MIME sniffing.
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 24]);
    bytes
}
