//! Ordered provider fallback for one stage invocation.

use roomstage_contracts::pipeline::StageOutcome;
use roomstage_contracts::providers::{Capability, DescribedProvider, ProviderRegistry};
use roomstage_contracts::stages::Stage;

use crate::compose::Instruction;
use crate::degraded;
use crate::error::{ChainExhausted, NoProviderConfigured, ProviderError};
use crate::normalize::ResponseNormalizer;
use crate::poller::PollSettings;
use crate::providers::{ProviderAdapter, ProviderCall};

/// Inputs shared by every attempt of one stage invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageJob<'a> {
    pub stage: Stage,
    pub image: &'a [u8],
    pub instruction: &'a Instruction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub provider: String,
    pub capability: Capability,
    /// `None` when the attempt produced the outcome.
    pub error: Option<String>,
    pub http_status: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ChainRun {
    pub outcome: StageOutcome,
    pub attempts: Vec<AttemptRecord>,
}

pub type AdapterRegistry = ProviderRegistry<Box<dyn ProviderAdapter>>;

pub struct FallbackChain {
    registry: AdapterRegistry,
    normalizer: ResponseNormalizer,
}

impl FallbackChain {
    pub fn new(adapters: Vec<Box<dyn ProviderAdapter>>, poll: PollSettings) -> Self {
        Self {
            registry: ProviderRegistry::new(adapters),
            normalizer: ResponseNormalizer::new(poll),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Whether any adapter can serve `stage`. Unserved stages are simulated.
    pub fn serves(&self, stage: Stage) -> bool {
        !self.registry.candidates(stage).is_empty()
    }

    /// Tries capable adapters in order until one yields an outcome. When all
    /// of them fail the run still succeeds, carrying a placeholder outcome.
    pub fn execute(&self, job: StageJob<'_>) -> Result<ChainRun, NoProviderConfigured> {
        let candidates = self.registry.candidates(job.stage);
        if candidates.is_empty() {
            return Err(NoProviderConfigured { stage: job.stage });
        }

        let mut attempts = Vec::with_capacity(candidates.len());
        let mut failures: Vec<ProviderError> = Vec::new();
        for candidate in candidates {
            let adapter: &dyn ProviderAdapter = candidate.provider.as_ref();
            tracing::info!(
                stage = job.stage.number(),
                provider = adapter.id(),
                capability = ?candidate.capability,
                "trying provider"
            );
            let call = ProviderCall {
                stage: job.stage,
                capability: candidate.capability,
                image: job.image,
                instruction: job.instruction,
            };
            let result = adapter.invoke(&call).and_then(|reply| {
                self.normalizer
                    .normalize(job.stage, adapter, candidate.capability, reply)
            });
            match result {
                Ok(outcome) => {
                    attempts.push(AttemptRecord {
                        provider: adapter.id().to_string(),
                        capability: candidate.capability,
                        error: None,
                        http_status: None,
                    });
                    return Ok(ChainRun { outcome, attempts });
                }
                Err(err) => {
                    tracing::warn!(
                        stage = job.stage.number(),
                        provider = adapter.id(),
                        error = %err,
                        "provider failed; falling back"
                    );
                    attempts.push(AttemptRecord {
                        provider: adapter.id().to_string(),
                        capability: candidate.capability,
                        error: Some(err.to_string()),
                        http_status: err.http_status(),
                    });
                    failures.push(err);
                }
            }
        }

        let exhausted = ChainExhausted {
            stage: job.stage,
            failures,
        };
        tracing::error!(stage = job.stage.number(), "{exhausted}");
        Ok(ChainRun {
            outcome: degraded::placeholder(&exhausted),
            attempts,
        })
    }
}
