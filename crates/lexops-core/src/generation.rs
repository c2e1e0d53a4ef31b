//! Text generation boundary — the one place stages reach an LLM.
//!
//! Stages hold a [`SharedGenerator`] injected at construction. The HTTP
//! adapters call the service directly rather than going through an SDK:
//!
//! ```text
//! Stage ──► RetryingGenerator ──► HttpGenerator ──► Anthropic Messages API
//!                                              └──► OpenAI-compatible /chat/completions
//! ```
//!
//! With no API key configured the engine uses [`OfflineGenerator`], which
//! always reports [`GenerationError::Unavailable`]; stages with a
//! deterministic fallback degrade to it, the rest fail their run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::workflow::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Text generation unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Rate limiting, server-side errors and transport failures are worth
    /// another attempt; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Http(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Decode(_) | GenerationError::Unavailable(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub model: String,
    pub usage: Option<UsageInfo>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;
}

pub type SharedGenerator = Arc<dyn TextGenerator>;

/// Wire protocol spoken by [`HttpGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adapter {
    /// `POST {base_url}/v1/messages`
    #[default]
    #[serde(alias = "claude")]
    Anthropic,
    /// `POST {base_url}/chat/completions`
    #[serde(alias = "openai-compatible", alias = "openrouter")]
    OpenAi,
}

impl std::fmt::Display for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Adapter::Anthropic => write!(f, "anthropic"),
            Adapter::OpenAi => write!(f, "openai"),
        }
    }
}

/// Calls a hosted model over HTTP.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn temperature(&self, request: &GenerationRequest) -> Option<serde_json::Value> {
        request
            .temperature
            .or(self.config.temperature)
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
    }

    async fn post(
        &self,
        builder: reqwest::RequestBuilder,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, GenerationError> {
        let response = builder
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Http(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }

        serde_json::from_str(&text).map_err(|e| GenerationError::Decode(e.to_string()))
    }

    async fn call_anthropic(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": [{ "role": "user", "content": request.prompt }]
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::Value::String(request.system.clone());
        }
        if let Some(temp) = self.temperature(request) {
            body["temperature"] = temp;
        }

        tracing::info!("[Generation] Calling Anthropic API: {} (model: {})", url, self.config.model);

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = self.post(builder, &body).await?;

        let content = json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .ok_or_else(|| GenerationError::Decode("response has no content blocks".to_string()))?;

        let usage = json.get("usage").map(|u| UsageInfo {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()),
        });

        Ok(Generation {
            content,
            model: response_model(&json, &self.config.model),
            usage,
        })
    }

    async fn call_openai(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": request.system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages
        });
        if let Some(temp) = self.temperature(request) {
            body["temperature"] = temp;
        }

        tracing::info!(
            "[Generation] Calling OpenAI-compatible API: {} (model: {})",
            url,
            self.config.model
        );

        let builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key));
        let json = self.post(builder, &body).await?;

        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| GenerationError::Decode("response has no message content".to_string()))?;

        let usage = json.get("usage").map(|u| UsageInfo {
            input_tokens: u
                .get("prompt_tokens")
                .or_else(|| u.get("input_tokens"))
                .and_then(|v| v.as_u64()),
            output_tokens: u
                .get("completion_tokens")
                .or_else(|| u.get("output_tokens"))
                .and_then(|v| v.as_u64()),
        });

        Ok(Generation {
            content,
            model: response_model(&json, &self.config.model),
            usage,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        match self.config.adapter {
            Adapter::Anthropic => self.call_anthropic(request).await,
            Adapter::OpenAi => self.call_openai(request).await,
        }
    }
}

/// Applies a [`RetryPolicy`] to any generator, retrying only
/// [`GenerationError::is_retryable`] failures.
pub struct RetryingGenerator {
    inner: SharedGenerator,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: SharedGenerator, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl TextGenerator for RetryingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        self.policy
            .run("generation", GenerationError::is_retryable, || self.inner.generate(request))
            .await
    }
}

/// Stand-in used when no credentials are configured.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, GenerationError> {
        Err(GenerationError::Unavailable("no API key configured".to_string()))
    }
}

fn response_model(json: &serde_json::Value, fallback: &str) -> String {
    json.get("model")
        .and_then(|m| m.as_str())
        .unwrap_or(fallback)
        .to_string()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(adapter: Adapter, base_url: String) -> GenerationConfig {
        GenerationConfig {
            adapter,
            base_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: None,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_anthropic_adapter_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "claude-test",
                "content": [
                    { "type": "text", "text": "Perenggan 1" },
                    { "type": "tool_use", "id": "x" },
                    { "type": "text", "text": "Perenggan 2" }
                ],
                "usage": { "input_tokens": 12, "output_tokens": 7 }
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(config(Adapter::Anthropic, server.uri())).unwrap();
        let out = generator
            .generate(&GenerationRequest::new("draft").with_system("You are a drafter"))
            .await
            .unwrap();
        assert_eq!(out.content, "Perenggan 1\nPerenggan 2");
        assert_eq!(out.model, "claude-test");
        assert_eq!(out.usage.unwrap().output_tokens, Some(7));
    }

    #[tokio::test]
    async fn test_openai_adapter_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "hello" } }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 1 }
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(config(Adapter::OpenAi, server.uri())).unwrap();
        let out = generator.generate(&GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(out.content, "hello");
        assert_eq!(out.model, "test-model");
        assert_eq!(out.usage.unwrap().input_tokens, Some(3));
    }

    #[tokio::test]
    async fn test_status_errors_classify_retryability() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(config(Adapter::Anthropic, server.uri())).unwrap();
        let err = generator.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 429, .. }));
        assert!(err.is_retryable());

        assert!(!GenerationError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(GenerationError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!GenerationError::Unavailable("x".into()).is_retryable());
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GenerationError::Status { status: 503, body: "busy".into() })
            } else {
                Ok(Generation {
                    content: "ok".into(),
                    model: "m".into(),
                    usage: None,
                })
            }
        }
    }

    #[tokio::test]
    async fn test_retrying_generator_recovers_from_transient_errors() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let generator = RetryingGenerator::new(flaky.clone(), policy);
        let out = generator.generate(&GenerationRequest::new("x")).await.unwrap();
        assert_eq!(out.content, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_offline_generator_is_unavailable() {
        let generator = RetryingGenerator::new(Arc::new(OfflineGenerator), RetryPolicy::default());
        let err = generator.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[test]
    fn test_adapter_names() {
        let a: Adapter = serde_yaml::from_str("openrouter").unwrap();
        assert_eq!(a, Adapter::OpenAi);
        assert_eq!(Adapter::Anthropic.to_string(), "anthropic");
    }
}
