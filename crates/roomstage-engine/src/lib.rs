//! Provider orchestration for the five-stage room enhancement pipeline.
//!
//! [`StageController`] validates a request against the caller's
//! [`PipelineState`](roomstage_contracts::pipeline::PipelineState), composes
//! the stage instruction and walks the [`FallbackChain`] of configured
//! provider adapters until one of them produces an outcome.

pub mod chain;
pub mod clutter;
pub mod compose;
pub mod config;
pub mod controller;
pub mod degraded;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod poller;
pub mod providers;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{AttemptRecord, ChainRun, FallbackChain, StageJob};
pub use clutter::extract_clutter_list;
pub use compose::{compose, Instruction};
pub use config::EngineConfig;
pub use controller::StageController;
pub use error::{
    ChainExhausted, NoProviderConfigured, ProviderError, StageError, ValidationError,
};
pub use poller::{PollSettings, TaskPoller};
