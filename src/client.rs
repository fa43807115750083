//! Remote completion API client.
//!
//! Defines the [`CompletionBackend`] trait the pipeline depends on and
//! [`AnthropicClient`], which calls a Messages-style endpoint over HTTPS.
//! The client returns the reply text untouched; interpreting it is the
//! job of [`crate::parse`].
//!
//! # Retry Strategy
//!
//! - Network errors, timeouts, HTTP 429 and 5xx → retry
//! - Other HTTP 4xx → fail immediately
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5), `llm.max_retries` attempts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::RemoteCallError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

/// A single blocking completion round trip.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, RemoteCallError>;
}

/// A shared backend, or the reason none is available (e.g. a missing
/// credential). Endpoints report the reason instead of failing at startup.
pub type Backend = Result<Arc<dyn CompletionBackend>, String>;

/// Builds the configured backend.
pub fn backend_from_config(config: &LlmConfig) -> Backend {
    AnthropicClient::from_config(config)
        .map(|client| Arc::new(client) as Arc<dyn CompletionBackend>)
        .map_err(|e| e.to_string())
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl AnthropicClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// [`RemoteCallError::MissingCredential`] when neither `llm.api_key`
    /// nor the `llm.api_key_env` environment variable is set.
    pub fn from_config(config: &LlmConfig) -> Result<Self, RemoteCallError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| RemoteCallError::MissingCredential {
                var: config.api_key_env.clone(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, RemoteCallError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        envelope_text(&body)
    }

    fn classify(&self, err: reqwest::Error) -> RemoteCallError {
        if err.is_timeout() {
            RemoteCallError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            RemoteCallError::from(err)
        }
    }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, RemoteCallError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = Duration::from_secs(1 << attempt.min(5));
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "completion request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Concatenates the text blocks of a Messages API response body.
fn envelope_text(body: &str) -> Result<String, RemoteCallError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| RemoteCallError::MalformedEnvelope(e.to_string()))?;

    let texts: Vec<String> = envelope
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if texts.is_empty() {
        return Err(RemoteCallError::MalformedEnvelope(
            "response contains no text content".to_string(),
        ));
    }
    Ok(texts.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_concatenates_text_blocks() {
        let body = r#"{"id":"msg_1","content":[{"type":"text","text":"{\"a\":"},{"type":"tool_use","id":"t"},{"type":"text","text":"1}"}]}"#;
        assert_eq!(envelope_text(body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn envelope_without_text_is_malformed() {
        assert!(matches!(
            envelope_text(r#"{"content":[]}"#),
            Err(RemoteCallError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            envelope_text("<html>bad gateway</html>"),
            Err(RemoteCallError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn missing_credential_is_reported() {
        let config = LlmConfig {
            api_key: None,
            api_key_env: "DOCENT_TEST_NO_SUCH_KEY".to_string(),
            ..LlmConfig::default()
        };
        match AnthropicClient::from_config(&config) {
            Err(RemoteCallError::MissingCredential { var }) => {
                assert_eq!(var, "DOCENT_TEST_NO_SUCH_KEY")
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected missing credential"),
        }
    }
}
