//! `lexops run` — run any pipeline from a JSON file holding its initial state.

use std::path::Path;

use serde_json::{Map, Value};

use lexops_core::{LegalOpsEngine, PipelineOutcome, WorkflowState};

use super::{read_json, report, OutputFormat};

pub async fn execute(engine: &LegalOpsEngine, pipeline: &str, input: &Path) -> Result<PipelineOutcome, String> {
    let state: Map<String, Value> = read_json(input)?;
    engine
        .run_named(pipeline, WorkflowState::from_map(state))
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(engine: &LegalOpsEngine, pipeline: &str, input: &Path, format: OutputFormat) -> Result<(), String> {
    let outcome = execute(engine, pipeline, input).await?;
    report(&outcome, format)
}
