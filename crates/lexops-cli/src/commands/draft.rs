//! `lexops draft` — plan, draft and check a pleading for a matter.

use std::path::Path;

use lexops_core::stages::model::{CaseSnapshot, Issue, Prayer};
use lexops_core::{LegalOpsEngine, PipelineOutcome};

use super::{read_json, read_json_or_default, report, OutputFormat};

pub async fn execute(
    engine: &LegalOpsEngine,
    snapshot: &Path,
    template_id: Option<&str>,
    issues: Option<&Path>,
    prayers: Option<&Path>,
) -> Result<PipelineOutcome, String> {
    let snapshot: CaseSnapshot = read_json(snapshot)?;
    let issues: Vec<Issue> = read_json_or_default(issues)?;
    let prayers: Vec<Prayer> = read_json_or_default(prayers)?;
    tracing::info!(
        "[CLI] Drafting '{}' with template {}",
        snapshot.title,
        template_id.unwrap_or("(auto)")
    );
    engine
        .run_drafting(&snapshot, template_id, &issues, &prayers)
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(
    engine: &LegalOpsEngine,
    snapshot: &Path,
    template_id: Option<&str>,
    issues: Option<&Path>,
    prayers: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    let outcome = execute(engine, snapshot, template_id, issues, prayers).await?;
    report(&outcome, format)
}
