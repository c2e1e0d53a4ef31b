//! Stage contract — the interface every processing unit implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{PipelineError, StageError};
use crate::workflow::confidence::ConfidenceGate;
use crate::workflow::envelope::{format_output, StageEnvelope, StageStatus};
use crate::workflow::state::WorkflowState;

/// A single unit of pipeline work.
///
/// Stages are constructed once and shared across concurrent runs, so they
/// must not keep mutable per-run state. Collaborators (generation clients,
/// extractors, authority sources) are injected at construction time.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Identifier, unique within a pipeline.
    fn id(&self) -> &str;

    /// Keys that must be present in the state before `process` runs.
    fn required_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Keys this stage promises to have written once it succeeds.
    fn guaranteed_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Do the work. `inputs` is a read-only view of the accumulated state.
    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError>;

    /// Successful envelope for this stage.
    fn envelope(
        &self,
        data: Map<String, Value>,
        confidence: Option<f64>,
        gate: &ConfidenceGate,
    ) -> StageEnvelope {
        format_output(self.id(), data, confidence, false, StageStatus::Success, gate)
    }
}

pub type SharedStage = Arc<dyn Stage>;

/// Fails with every missing key named, not just the first.
pub fn validate_input(
    stage_id: &str,
    inputs: &WorkflowState,
    required: &[&str],
) -> Result<(), PipelineError> {
    let missing = inputs.missing(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingFields {
            stage: stage_id.to_string(),
            fields: missing,
        })
    }
}
