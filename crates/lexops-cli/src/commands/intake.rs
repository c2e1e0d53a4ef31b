//! `lexops intake` — admit files into a matter and profile it.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use lexops_core::stages::model::InputFile;
use lexops_core::{LegalOpsEngine, PipelineOutcome};

use super::{read_json_or_default, report, OutputFormat};

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "eml" => "message/rfc822",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Read files from disk as intake inputs.
pub fn read_files(paths: &[PathBuf]) -> Result<Vec<InputFile>, String> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            Ok(InputFile::from_bytes(filename, mime_type_for(path), &bytes))
        })
        .collect()
}

pub async fn execute(
    engine: &LegalOpsEngine,
    paths: &[PathBuf],
    source_type: &str,
    case_id: &str,
    metadata: Option<&Path>,
) -> Result<PipelineOutcome, String> {
    let files = read_files(paths)?;
    let metadata: Map<String, Value> = read_json_or_default(metadata)?;
    tracing::info!("[CLI] Intake of {} file(s) for {}", files.len(), case_id);
    engine
        .run_intake(&files, source_type, metadata, case_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(
    engine: &LegalOpsEngine,
    paths: &[PathBuf],
    source_type: &str,
    case_id: &str,
    metadata: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    let outcome = execute(engine, paths, source_type, case_id, metadata).await?;
    report(&outcome, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_by_extension() {
        assert_eq!(mime_type_for(Path::new("a/B.PDF")), "application/pdf");
        assert_eq!(mime_type_for(Path::new("chat.txt")), "text/plain");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }
}
