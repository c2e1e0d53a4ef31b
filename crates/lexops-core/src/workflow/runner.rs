//! Pipeline Runner — walks a definition from entry to finish.
//!
//! For each stage on the chosen path the runner:
//! 1. Checks the stage's required keys against the accumulated state
//! 2. Awaits `process` with a read-only view of that state
//! 3. Rejects envelopes that break the contract (status `error`,
//!    confidence outside `[0, 1]`, a guaranteed key not written)
//! 4. Merges the envelope's data and ORs its review flag into the run's
//! 5. Picks the successor, evaluating a conditional edge exactly once
//!
//! Any failure, a panic inside a stage included, stops the run and comes
//! back as [`RunResult::Failed`] with the state as it was before the failing stage wrote anything.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;

use crate::error::PipelineError;
use crate::workflow::confidence::in_bounds;
use crate::workflow::envelope::{StageEnvelope, StageStatus};
use crate::workflow::graph::PipelineDefinition;
use crate::workflow::stage::validate_input;
use crate::workflow::state::WorkflowState;

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage_id: String,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub human_review_required: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub enum RunResult {
    Completed {
        run_id: String,
        state: WorkflowState,
        human_review_required: bool,
        /// Stage ids in execution order.
        path: Vec<String>,
        trace: Vec<StageRecord>,
    },
    Failed {
        run_id: String,
        stage_id: String,
        error: String,
        /// State accumulated before the failing stage.
        partial_state: WorkflowState,
        human_review_required: bool,
        trace: Vec<StageRecord>,
    },
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed { .. })
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunResult::Completed { run_id, .. } | RunResult::Failed { run_id, .. } => run_id,
        }
    }

    /// Final state on success, partial state on failure.
    pub fn state(&self) -> &WorkflowState {
        match self {
            RunResult::Completed { state, .. } => state,
            RunResult::Failed { partial_state, .. } => partial_state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            RunResult::Completed { state, .. } => state,
            RunResult::Failed { partial_state, .. } => partial_state,
        }
    }

    pub fn human_review_required(&self) -> bool {
        match self {
            RunResult::Completed {
                human_review_required,
                ..
            }
            | RunResult::Failed {
                human_review_required,
                ..
            } => *human_review_required,
        }
    }

    pub fn trace(&self) -> &[StageRecord] {
        match self {
            RunResult::Completed { trace, .. } | RunResult::Failed { trace, .. } => trace,
        }
    }

    /// Ids of the stages that ran, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.trace().iter().map(|r| r.stage_id.as_str()).collect()
    }

    /// `(stage_id, error)` for failed runs.
    pub fn failure(&self) -> Option<(&str, &str)> {
        match self {
            RunResult::Failed { stage_id, error, .. } => Some((stage_id, error)),
            RunResult::Completed { .. } => None,
        }
    }
}

/// Stateless executor; one instance can drive any number of concurrent runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRunner;

struct RunContext {
    run_id: String,
    state: WorkflowState,
    human_review_required: bool,
    trace: Vec<StageRecord>,
}

impl RunContext {
    fn fail(self, err: PipelineError, fallback_stage: &str) -> RunResult {
        let stage_id = err.stage_id().unwrap_or(fallback_stage).to_string();
        tracing::error!("[Runner] run {} failed at '{}': {}", self.run_id, stage_id, err);
        RunResult::Failed {
            run_id: self.run_id,
            stage_id,
            error: err.to_string(),
            partial_state: self.state,
            human_review_required: self.human_review_required,
            trace: self.trace,
        }
    }
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, pipeline: &PipelineDefinition, initial: WorkflowState) -> RunResult {
        let mut ctx = RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            state: initial,
            human_review_required: false,
            trace: Vec::new(),
        };
        tracing::info!(
            "[Runner] starting '{}' run {} with {} initial keys",
            pipeline.name(),
            ctx.run_id,
            ctx.state.len()
        );

        if let Err(e) = validate_input(pipeline.entry(), &ctx.state, &pipeline.required_inputs()) {
            return ctx.fail(e, pipeline.entry());
        }

        let mut current = pipeline.entry().to_string();
        let mut path = Vec::new();

        loop {
            let Some(stage) = pipeline.stage(&current) else {
                let err = PipelineError::Contract {
                    stage: current.clone(),
                    message: "stage is not registered in this pipeline".to_string(),
                };
                return ctx.fail(err, &current);
            };

            if let Err(e) = validate_input(&current, &ctx.state, stage.required_keys()) {
                return ctx.fail(e, &current);
            }

            tracing::debug!("[Runner] run {} -> stage '{}'", ctx.run_id, current);
            let started = Instant::now();
            let outcome = AssertUnwindSafe(stage.process(&ctx.state)).catch_unwind().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let envelope = match outcome {
                Ok(Ok(envelope)) => envelope,
                Ok(Err(e)) => {
                    let err = PipelineError::Stage {
                        stage: current.clone(),
                        message: e.to_string(),
                    };
                    return ctx.fail(err, &current);
                }
                Err(payload) => {
                    let message = format!("stage panicked: {}", panic_message(payload.as_ref()));
                    tracing::error!("[Runner] run {} stage '{}' {}", ctx.run_id, current, message);
                    let err = PipelineError::Stage {
                        stage: current.clone(),
                        message,
                    };
                    return ctx.fail(err, &current);
                }
            };

            let record = StageRecord {
                stage_id: current.clone(),
                status: envelope.status,
                confidence: envelope.confidence,
                human_review_required: envelope.human_review_required
                    || envelope.status == StageStatus::PartialError,
                elapsed_ms,
            };

            if let Err(e) = check_envelope(&current, &envelope, stage.guaranteed_keys()) {
                ctx.trace.push(record);
                return ctx.fail(e, &current);
            }

            if envelope.status == StageStatus::PartialError {
                tracing::warn!("[Runner] stage '{}' returned partial output, flagging for review", current);
            }
            ctx.human_review_required |= record.human_review_required;
            ctx.state.merge(envelope.data);
            ctx.trace.push(record);
            path.push(current.clone());

            let next = match pipeline.next_stage(&current, &ctx.state) {
                Ok(next) => next,
                Err(e) => return ctx.fail(e, &current),
            };

            match next {
                Some(next) => current = next.to_string(),
                None => break,
            }
        }

        tracing::info!(
            "[Runner] '{}' run {} completed after {} stages (review required: {})",
            pipeline.name(),
            ctx.run_id,
            path.len(),
            ctx.human_review_required
        );

        RunResult::Completed {
            run_id: ctx.run_id,
            state: ctx.state,
            human_review_required: ctx.human_review_required,
            path,
            trace: ctx.trace,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn check_envelope(
    stage_id: &str,
    envelope: &StageEnvelope,
    guaranteed: &[&str],
) -> Result<(), PipelineError> {
    let contract = |message: String| PipelineError::Contract {
        stage: stage_id.to_string(),
        message,
    };

    if envelope.status == StageStatus::Error {
        let detail = envelope
            .data
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("stage reported status 'error'");
        return Err(contract(detail.to_string()));
    }

    if let Some(c) = envelope.confidence {
        if !in_bounds(c) {
            return Err(contract(format!("confidence {} is outside [0, 1]", c)));
        }
    }

    let unwritten: Vec<&str> = guaranteed
        .iter()
        .copied()
        .filter(|k| !envelope.data.contains_key(*k))
        .collect();
    if !unwritten.is_empty() {
        return Err(contract(format!("did not write guaranteed keys: {}", unwritten.join(", "))));
    }

    Ok(())
}
