//! Thin stateless client for the OpenAI-compatible chat-completions
//! endpoint of a local LM provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::models::error::ConsensusError;

/// One chat turn in provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-request knobs. `max_tokens` of -1 means unlimited (the field is
/// omitted from the request); `context_size` of 0 defers to the provider.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: i64,
    pub context_size: i64,
    pub request_timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: -1,
            context_size: 0,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// The seam between the pipeline and the provider. The controller is
/// parameterized by this trait so tests inject scripted stubs.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ConsensusError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_ctx: Option<i64>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Stateless request/response wrapper around `POST /v1/chat/completions`.
pub struct LmClient {
    http: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl LmClient {
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
        }
    }

    /// `GET /v1/models` - a health check for callers that want to verify
    /// the endpoint before committing to a run. Not on the hot path.
    pub async fn list_models(&self) -> Result<Vec<String>, ConsensusError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ConsensusError::from_request(&e, 0))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConsensusError::from_request(&e, 0))?;
        if !status.is_success() {
            return Err(ConsensusError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ModelsResponse =
            serde_json::from_str(&body).map_err(|e| ConsensusError::Parse(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl ChatCompletion for LmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ConsensusError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            messages,
            temperature: options.temperature,
            stream: false,
            model: self.model.as_deref(),
            max_tokens: (options.max_tokens > 0).then_some(options.max_tokens),
            n_ctx: (options.context_size > 0).then_some(options.context_size),
        };
        debug!(
            "chat completion: {} messages, timeout {:?}",
            messages.len(),
            options.request_timeout
        );

        let timeout_ms = options.request_timeout.as_millis() as u64;
        let response = self
            .http
            .post(&url)
            .timeout(options.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConsensusError::from_request(&e, timeout_ms))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConsensusError::from_request(&e, timeout_ms))?;
        if !status.is_success() {
            return Err(ConsensusError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ConsensusError::Parse(e.to_string()))?;
        let first = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ConsensusError::EmptyResponse)?;
        Ok(first.message.content)
    }
}

#[cfg(test)]
#[path = "lm_client_tests.rs"]
mod tests;
