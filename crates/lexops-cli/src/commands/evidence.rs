//! `lexops evidence` — certification pack, evidence index and hearing bundle.

use std::path::Path;

use lexops_core::stages::model::EvidenceDocument;
use lexops_core::{LegalOpsEngine, PipelineOutcome};

use super::{read_json_or_default, report, OutputFormat};

pub async fn execute(
    engine: &LegalOpsEngine,
    case_id: &str,
    documents: Option<&Path>,
) -> Result<PipelineOutcome, String> {
    let documents: Vec<EvidenceDocument> = read_json_or_default(documents)?;
    tracing::info!("[CLI] Evidence for {}: {} document(s)", case_id, documents.len());
    engine
        .run_evidence(case_id, &documents)
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(
    engine: &LegalOpsEngine,
    case_id: &str,
    documents: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    let outcome = execute(engine, case_id, documents).await?;
    report(&outcome, format)
}
