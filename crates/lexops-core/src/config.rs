//! Engine configuration.
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! generation:
//!   adapter: anthropic          # anthropic | openai
//!   base_url: "${ANTHROPIC_BASE_URL:-https://api.anthropic.com}"
//!   api_key: "${ANTHROPIC_API_KEY}"
//!   model: claude-sonnet-4-5
//!   max_tokens: 4096
//!   timeout_secs: 300
//!
//! retry:
//!   max_attempts: 5
//!   base_delay_ms: 500
//!   max_delay_ms: 30000
//!
//! confidence_threshold: 0.7
//!
//! research:
//!   authorities_file: ./authorities.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::generation::{Adapter, HttpGenerator, OfflineGenerator, RetryingGenerator, SharedGenerator};
use crate::workflow::confidence::{ConfidenceGate, DEFAULT_THRESHOLD};
use crate::workflow::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Confidence below this marks a stage's output for human review.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,

    #[serde(default)]
    pub research: ResearchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
            confidence_threshold: DEFAULT_THRESHOLD,
            research: ResearchConfig::default(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub adapter: Adapter,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Empty means generation is offline.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::default(),
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// JSON array of authorities served by the search stage.
    #[serde(default)]
    pub authorities_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse YAML, expanding `${VAR}` references first.
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        let expanded = resolve_env_vars(yaml);
        let config: EngineConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Defaults when `path` is `None` or does not exist, then environment
    /// overrides in either case.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                tracing::info!("[Config] Loading {}", p.display());
                Self::from_file(p)?
            }
            Some(p) => {
                tracing::debug!("[Config] {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    /// Apply overrides from an arbitrary lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup("LEXOPS_API_KEY").or_else(|| match self.generation.adapter {
            Adapter::Anthropic => lookup("ANTHROPIC_API_KEY"),
            Adapter::OpenAi => lookup("OPENAI_API_KEY"),
        });
        if let Some(key) = key {
            if self.generation.api_key.is_empty() || lookup("LEXOPS_API_KEY").is_some() {
                self.generation.api_key = key;
            }
        }
        if let Some(url) = lookup("LEXOPS_BASE_URL") {
            self.generation.base_url = url;
        }
        if let Some(model) = lookup("LEXOPS_MODEL") {
            self.generation.model = model;
        }
        if let Some(raw) = lookup("LEXOPS_CONFIDENCE_THRESHOLD") {
            match raw.parse::<f64>() {
                Ok(t) => self.confidence_threshold = t,
                Err(_) => tracing::warn!("[Config] Ignoring LEXOPS_CONFIDENCE_THRESHOLD={}", raw),
            }
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(PipelineError::Config("generation.max_tokens must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn gate(&self) -> ConfidenceGate {
        ConfidenceGate::new(self.confidence_threshold)
    }

    pub fn has_credentials(&self) -> bool {
        !self.generation.api_key.is_empty()
    }

    /// HTTP generator wrapped in the retry policy, or the offline stand-in
    /// when no API key is set.
    pub fn build_generator(&self) -> Result<SharedGenerator, PipelineError> {
        if !self.has_credentials() {
            tracing::warn!("[Config] No API key configured; text generation is offline");
            return Ok(Arc::new(OfflineGenerator));
        }
        let http = HttpGenerator::new(self.generation.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Arc::new(RetryingGenerator::new(Arc::new(http), self.retry.policy())))
    }

    /// YAML rendering with the API key masked.
    pub fn to_redacted_yaml(&self) -> Result<String, PipelineError> {
        let mut shown = self.clone();
        if !shown.generation.api_key.is_empty() {
            shown.generation.api_key = "****".to_string();
        }
        serde_yaml::to_string(&shown).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

fn env_ref_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax; unknown variables
/// without a default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let Some(re) = env_ref_pattern() else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("LEXOPS_TEST_CONFIG_VAR", "hello");
        assert_eq!(resolve_env_vars("${LEXOPS_TEST_CONFIG_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix-${LEXOPS_TEST_CONFIG_VAR}-suffix"),
            "prefix-hello-suffix"
        );
        assert_eq!(resolve_env_vars("${LEXOPS_NONEXISTENT_VAR:-fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${LEXOPS_NONEXISTENT_VAR}"), "${LEXOPS_NONEXISTENT_VAR}");
        std::env::remove_var("LEXOPS_TEST_CONFIG_VAR");
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml("confidence_threshold: 0.8\n").unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.generation.adapter, Adapter::Anthropic);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.research.authorities_file.is_none());
    }

    #[test]
    fn test_full_yaml_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
generation:
  adapter: openai
  base_url: "${{LEXOPS_UNSET_URL:-https://openrouter.ai/api/v1}}"
  api_key: sk-test
  model: gpt-test
  max_tokens: 1024
retry:
  max_attempts: 2
  base_delay_ms: 10
research:
  authorities_file: /tmp/authorities.json
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.generation.adapter, Adapter::OpenAi);
        assert_eq!(config.generation.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.retry.policy().max_attempts, 2);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert!(config.has_credentials());
        assert!(!config.to_redacted_yaml().unwrap().contains("sk-test"));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = EngineConfig::from_yaml("confidence_threshold: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "anthropic-key"),
            ("LEXOPS_MODEL", "override-model"),
            ("LEXOPS_CONFIDENCE_THRESHOLD", "0.9"),
        ]);
        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.generation.api_key, "anthropic-key");
        assert_eq!(config.generation.model, "override-model");
        assert_eq!(config.gate().threshold(), 0.9);

        let mut config = EngineConfig::default();
        config.generation.api_key = "from-file".into();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.generation.api_key, "from-file");

        config.apply_overrides(|k| (k == "LEXOPS_API_KEY").then(|| "explicit".to_string()));
        assert_eq!(config.generation.api_key, "explicit");
    }
}
