//! `lexops config` — show the effective configuration.

use std::path::Path;

use lexops_core::EngineConfig;

use super::default_config_path;

/// Effective configuration with the API key masked.
pub fn show(config: &EngineConfig) -> Result<String, String> {
    config.to_redacted_yaml().map_err(|e| e.to_string())
}

pub fn run(config: &EngineConfig, path: Option<&Path>) -> Result<(), String> {
    let source = path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!("# config file: {}", source);
    if !config.has_credentials() {
        println!("# no API key set: generation runs offline, stages fall back where they can");
    }
    print!("{}", show(config)?);
    Ok(())
}
