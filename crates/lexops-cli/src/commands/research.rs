//! `lexops research` — search authorities and build an argument memo.

use std::path::Path;

use lexops_core::stages::model::{ArgumentMemo, Authority, Issue, SearchFilters};
use lexops_core::{LegalOpsEngine, PipelineOutcome};

use super::{print_output, read_json, read_json_or_default, report, OutputFormat};

pub async fn execute(
    engine: &LegalOpsEngine,
    query: &str,
    filters: &SearchFilters,
) -> Result<PipelineOutcome, String> {
    tracing::info!("[CLI] Research: {}", query);
    engine
        .run_research(query, Some(filters))
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(
    engine: &LegalOpsEngine,
    query: &str,
    filters: &SearchFilters,
    format: OutputFormat,
) -> Result<(), String> {
    let outcome = execute(engine, query, filters).await?;
    report(&outcome, format)
}

/// Memo only, from authorities and issues already at hand.
pub async fn memo(
    engine: &LegalOpsEngine,
    query: &str,
    authorities: &Path,
    issues: Option<&Path>,
) -> Result<ArgumentMemo, String> {
    let authorities: Vec<Authority> = read_json(authorities)?;
    let issues: Vec<Issue> = read_json_or_default(issues)?;
    Ok(engine.build_argument_only(&authorities, &issues, query).await)
}

pub async fn run_memo(
    engine: &LegalOpsEngine,
    query: &str,
    authorities: &Path,
    issues: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    let memo = memo(engine, query, authorities, issues).await?;
    print_output(&memo, format)
}
