//! Ollama `/api/generate` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};

/// Text completion: prompt in, free text out.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> LlmResult<String>;
}

/// Ollama client configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// `None` disables the service; every call returns [`LlmError::Disabled`].
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "llama3".to_string(),
            timeout_secs: 30,
            temperature: 0.7,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OLLAMA_BASE_URL")
                .ok()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
            timeout_secs: std::env::var("OLLAMA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            temperature: std::env::var("OLLAMA_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Non-streaming Ollama completion client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> LlmResult<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let base_url = self.config.base_url.as_deref().ok_or(LlmError::Disabled)?;
        let url = format!("{}/api/generate", base_url);

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        debug!(model = %self.config.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_secs)
                } else {
                    LlmError::request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Completion request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(e.to_string()))?;

        parsed
            .response
            .ok_or_else(|| LlmError::invalid_response("missing 'response' field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        let config = OllamaConfig {
            timeout_secs: 1,
            ..OllamaConfig::default()
        }
        .with_base_url(server.uri());
        OllamaClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "llama3", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3",
                "response": "{\"duration\": 30}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server).complete("make it short").await.unwrap();
        assert_eq!(text, "{\"duration\": 30}");
    }

    #[tokio::test]
    async fn test_complete_non_200() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x").await.unwrap_err();
        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_complete_missing_field() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(1)));
    }

    #[tokio::test]
    async fn test_disabled_without_base_url() {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        assert!(!client.config().is_enabled());
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
    }

    #[tokio::test]
    async fn test_mock_completion_service() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete()
            .withf(|prompt| prompt.contains("vintage"))
            .returning(|_| Ok("{}".to_string()));

        tokio_test::assert_ok!(mock.complete("vintage please").await);
    }
}
