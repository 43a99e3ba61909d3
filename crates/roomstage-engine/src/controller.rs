//! Stage execution against caller-owned pipeline state.

use roomstage_contracts::events::{EventPayload, EventWriter};
use roomstage_contracts::images::ImageReference;
use roomstage_contracts::pipeline::{PipelineState, StageOutcome, StageRequest};
use roomstage_contracts::stages::Stage;
use serde_json::{json, Value};

use crate::chain::{AttemptRecord, FallbackChain, StageJob};
use crate::compose::compose;
use crate::config::EngineConfig;
use crate::degraded;
use crate::error::{StageError, ValidationError};
use crate::loader::{fingerprint, ImageLoader};
use crate::poller::PollSettings;
use crate::providers::{build_adapters, http_client, ProviderAdapter};

pub struct StageController {
    chain: FallbackChain,
    loader: ImageLoader,
    events: Option<EventWriter>,
}

impl StageController {
    pub fn new(
        adapters: Vec<Box<dyn ProviderAdapter>>,
        poll: PollSettings,
        loader: ImageLoader,
    ) -> Self {
        Self {
            chain: FallbackChain::new(adapters, poll),
            loader,
            events: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let http = http_client(config.request_timeout)?;
        if !config.has_any_provider() {
            tracing::warn!("no provider API key configured; every stage will be simulated");
        }
        let adapters = build_adapters(config, &http);
        Ok(Self::new(adapters, config.poll.clone(), ImageLoader::new(http)))
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Runs one stage. Real outcomes are merged into `state`; placeholder and
    /// simulated outcomes are returned without touching it. `state` is only
    /// written once every event for the run has been recorded, so an `Err`
    /// always leaves it as it was.
    pub fn run_stage(
        &self,
        state: &mut PipelineState,
        request: StageRequest,
    ) -> Result<StageOutcome, StageError> {
        let (stage, image) = match self.validate(state, &request) {
            Ok(validated) => validated,
            Err(err) => {
                self.emit(
                    "stage_rejected",
                    &state.session_id,
                    json!({ "stage": request.stage, "error": err.to_string() }),
                )?;
                return Err(err.into());
            }
        };
        let bytes = match self.loader.load(&image) {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = ValidationError::ImageLoad(format!("{err:#}"));
                self.emit(
                    "stage_rejected",
                    &state.session_id,
                    json!({ "stage": request.stage, "error": err.to_string() }),
                )?;
                return Err(err.into());
            }
        };

        let mut next = state.clone();
        if stage == Stage::SceneAnalysis && request.image.is_some() {
            next.reset_with_photo(image.clone());
        }
        let clutter_list = if request.clutter_list.trim().is_empty() {
            next.clutter_list.clone()
        } else {
            request.clutter_list.trim().to_string()
        };
        let instruction = compose(
            stage,
            &clutter_list,
            request.is_redo,
            request.scenario.as_deref(),
            request.props.as_deref(),
        );

        let image_fingerprint = fingerprint(&bytes);
        tracing::info!(
            session = %next.session_id,
            stage = stage.number(),
            is_redo = request.is_redo,
            scenario = request.scenario.as_deref().unwrap_or(""),
            has_props = request.props.as_deref().is_some_and(|props| !props.trim().is_empty()),
            clutter_chars = clutter_list.chars().count(),
            image_kind = image.kind(),
            image_bytes = bytes.len(),
            image_fingerprint = %image_fingerprint,
            "running stage"
        );
        self.emit(
            "stage_started",
            &next.session_id,
            json!({
                "stage": stage.number(),
                "is_redo": request.is_redo,
                "image_kind": image.kind(),
                "image_bytes": bytes.len(),
                "image_fingerprint": image_fingerprint,
                "clutter_list": clutter_list,
            }),
        )?;

        let job = StageJob {
            stage,
            image: &bytes,
            instruction: &instruction,
        };
        let outcome = match self.chain.execute(job) {
            Ok(run) => {
                self.emit_attempts(&next.session_id, stage, &run.attempts)?;
                run.outcome
            }
            Err(missing) => {
                tracing::warn!(stage = stage.number(), "{missing}; returning a simulated result");
                degraded::simulated(missing, request.scenario.as_deref())
            }
        };

        if outcome.origin().is_degraded() {
            self.emit(
                "stage_degraded",
                &next.session_id,
                json!({
                    "stage": stage.number(),
                    "origin": outcome.origin(),
                    "description": outcome.description(),
                }),
            )?;
            *state = next;
            return Ok(outcome);
        }

        merge_outcome(&mut next, stage, &outcome);
        self.emit(
            "stage_completed",
            &next.session_id,
            json!({
                "stage": stage.number(),
                "provider": outcome.provider(),
                "origin": outcome.origin(),
                "completed_stages": next.completed_stages(),
            }),
        )?;
        *state = next;
        Ok(outcome)
    }

    /// Request checks that need no I/O, in the order they are reported.
    ///
    /// A prerequisite is waived when either stage has no adapter, so a
    /// deployment without providers can walk all five stages on simulated
    /// results. Simulated stages fall back to the source photo.
    fn validate(
        &self,
        state: &PipelineState,
        request: &StageRequest,
    ) -> Result<(Stage, ImageReference), ValidationError> {
        let stage =
            Stage::from_number(request.stage).ok_or(ValidationError::UnknownStage(request.stage))?;
        if stage == Stage::AddProps
            && request
                .scenario
                .as_deref()
                .map_or(true, |scenario| scenario.trim().is_empty())
        {
            return Err(ValidationError::MissingScenario);
        }

        let simulated = !self.chain.serves(stage);
        let image = match stage.previous() {
            None => request.image.clone().or_else(|| state.photo.clone()),
            Some(_) => request
                .image
                .clone()
                .or_else(|| state.prerequisite_image(stage).cloned())
                .or_else(|| state.photo.clone().filter(|_| simulated)),
        }
        .ok_or(ValidationError::MissingImage(stage))?;

        if let Some(required) = stage.previous() {
            let waived = simulated || !self.chain.serves(required);
            if !waived && !state.has_outcome(required) {
                return Err(ValidationError::PrerequisiteMissing { stage, required });
            }
        }
        Ok((stage, image))
    }

    fn emit_attempts(
        &self,
        session_id: &str,
        stage: Stage,
        attempts: &[AttemptRecord],
    ) -> anyhow::Result<()> {
        for attempt in attempts {
            self.emit(
                "provider_attempt",
                session_id,
                json!({
                    "stage": stage.number(),
                    "provider": attempt.provider,
                    "capability": attempt.capability,
                    "ok": attempt.error.is_none(),
                }),
            )?;
            if let Some(error) = &attempt.error {
                self.emit(
                    "provider_failed",
                    session_id,
                    json!({
                        "stage": stage.number(),
                        "provider": attempt.provider,
                        "http_status": attempt.http_status,
                        "error": error,
                    }),
                )?;
            }
        }
        Ok(())
    }

    fn emit(&self, event_type: &str, session_id: &str, payload: Value) -> anyhow::Result<()> {
        let Some(events) = &self.events else {
            return Ok(());
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        events.emit(event_type, session_id, payload)?;
        Ok(())
    }
}

fn merge_outcome(state: &mut PipelineState, stage: Stage, outcome: &StageOutcome) {
    match outcome {
        StageOutcome::Text(text) => {
            state.record_analysis(text.analysis.clone(), text.clutter_list.clone());
        }
        StageOutcome::Image(image) => match ImageReference::parse(&image.image_url) {
            Some(reference) => state.record_image(stage, reference),
            None => tracing::warn!(
                stage = stage.number(),
                "outcome image is not a displayable reference; state left unchanged"
            ),
        },
    }
}
