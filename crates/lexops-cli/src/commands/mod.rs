//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! pipelines through a [`LegalOpsEngine`] built from the loaded config.

pub mod config;
pub mod draft;
pub mod evidence;
pub mod intake;
pub mod pipelines;
pub mod research;
pub mod run;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::Serialize;

use lexops_core::{EngineConfig, LegalOpsEngine, PipelineOutcome};

/// Output rendering for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// `~/.config/lexops/config.yaml` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lexops").join("config.yaml"))
}

/// Load the engine config from `path`, else the default location; a missing
/// file means defaults plus environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    EngineConfig::load(path.as_deref()).map_err(|e| e.to_string())
}

pub fn init_engine(config: &EngineConfig) -> Result<LegalOpsEngine, String> {
    LegalOpsEngine::new(config).map_err(|e| format!("Failed to build pipelines: {}", e))
}

/// Render a value in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    }
}

pub fn print_output<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), String> {
    println!("{}", render(value, format)?);
    Ok(())
}

/// Print the outcome, then turn a failed run into an error so the process
/// exits non-zero.
pub fn report(outcome: &PipelineOutcome, format: OutputFormat) -> Result<(), String> {
    print_output(outcome, format)?;
    if outcome.is_completed() {
        if outcome.human_review_required {
            tracing::info!("[CLI] Run {} completed; human review required", outcome.run_id);
        }
        Ok(())
    } else {
        Err(format!(
            "Pipeline failed at '{}': {}",
            outcome.failed_stage.as_deref().unwrap_or("?"),
            outcome.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e))
}

/// Optional JSON file; `None` yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, String> {
    match path {
        Some(p) => read_json(p),
        None => Ok(T::default()),
    }
}

/// Load `.env.local` then `.env` from `dir`. Variables already set in the
/// environment are left untouched. Returns the files that were read.
pub fn load_dotenv(dir: &Path) -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for filename in &[".env.local", ".env"] {
        let path = dir.join(filename);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (key, value) in parse_dotenv(&content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(&key, &value);
            }
        }
        loaded.push(path);
    }
    loaded
}

/// `KEY=VALUE` pairs from dotenv text; comments, blank lines and lines
/// without `=` are skipped, surrounding quotes stripped.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim().trim_start_matches("export ").trim();
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let pairs = parse_dotenv(
            "# keys\nLEXOPS_API_KEY=\"sk-test\"\n\nexport LEXOPS_MODEL='claude'\nBROKEN\n=novalue\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("LEXOPS_API_KEY".to_string(), "sk-test".to_string()),
                ("LEXOPS_MODEL".to_string(), "claude".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_yaml_and_json() {
        let value = serde_json::json!({"workflowStatus": "completed"});
        assert!(render(&value, OutputFormat::Yaml).unwrap().contains("workflowStatus: completed"));
        assert!(render(&value, OutputFormat::Json).unwrap().contains("\"workflowStatus\""));
    }

    #[test]
    fn test_load_dotenv_reports_files_and_keeps_existing_vars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "LEXOPS_TEST_DOTENV_NEW=from-file\nLEXOPS_TEST_DOTENV_SET=from-file\n",
        )
        .unwrap();
        std::env::set_var("LEXOPS_TEST_DOTENV_SET", "from-env");

        let loaded = load_dotenv(dir.path());

        assert_eq!(loaded, vec![dir.path().join(".env")]);
        assert_eq!(std::env::var("LEXOPS_TEST_DOTENV_NEW").unwrap(), "from-file");
        assert_eq!(std::env::var("LEXOPS_TEST_DOTENV_SET").unwrap(), "from-env");
    }
}
