//! `lexops pipelines` — describe the pipeline graphs.

use lexops_core::LegalOpsEngine;

use super::{print_output, OutputFormat};

pub fn list(engine: &LegalOpsEngine, compact: bool, format: OutputFormat) -> Result<(), String> {
    if compact {
        for line in summary(engine) {
            println!("{}", line);
        }
        return Ok(());
    }
    print_output(&engine.describe(), format)
}

/// Compact one-line-per-pipeline view.
pub fn summary(engine: &LegalOpsEngine) -> Vec<String> {
    engine
        .describe()
        .iter()
        .map(|d| {
            format!(
                "{:<9} {} stage(s), requires [{}], entry {}",
                d.name,
                d.stages.len(),
                d.required_inputs.join(", "),
                d.entry
            )
        })
        .collect()
}
