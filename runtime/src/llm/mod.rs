//! Local LLM client (§6 Local LLM interface). A single `complete` method;
//! PHI scrubbing is the caller's responsibility (enforced by the safety
//! gate, C4), not this module's.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::RuntimeError;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub stop: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            stop: Vec::new(),
            max_tokens: 512,
            temperature: 0.2,
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest, timeout: Duration) -> Result<String, RuntimeError>;
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client against a locally-hosted completion endpoint, default
/// `http://host:11434` (§6).
pub struct HttpLlmClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn default_local() -> Self {
        Self::new("http://host:11434")
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest, timeout: Duration) -> Result<String, RuntimeError> {
        let body = serde_json::json!({
            "prompt": request.prompt,
            "stop": request.stop,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RuntimeError::Internal(format!("llm request failed: {e}")))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Internal(format!("llm response malformed: {e}")))?;

        Ok(parsed.response)
    }
}

/// Deterministic, canned-reply client for tests so the agent loop and
/// orchestrator selection logic are exercisable without a live endpoint.
#[cfg(any(test, feature = "test-support"))]
pub struct MockLlmClient {
    pub replies: std::sync::Mutex<std::collections::VecDeque<String>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MockLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().collect()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _request: CompletionRequest, _timeout: Duration) -> Result<String, RuntimeError> {
        let mut replies = self.replies.lock().unwrap();
        replies
            .pop_front()
            .ok_or_else(|| RuntimeError::Internal("mock LLM exhausted its scripted replies".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_client_replies_in_order() {
        let client = MockLlmClient::new(vec!["first".into(), "second".into()]);
        let r1 = client.complete(CompletionRequest::new("p"), Duration::from_secs(1)).await.unwrap();
        let r2 = client.complete(CompletionRequest::new("p"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(r1, "first");
        assert_eq!(r2, "second");
    }

    #[tokio::test]
    async fn mock_client_exhaustion_is_an_error() {
        let client = MockLlmClient::new(vec![]);
        let result = client.complete(CompletionRequest::new("p"), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
