//! OpenAI-compatible HTTP provider.
//!
//! Speaks the `/chat/completions` and `/embeddings` endpoints shared by most
//! hosted and self-hosted model servers. Every request is retried with
//! jittered exponential backoff on rate limits, server errors and
//! connection failures; other client errors fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ChatMessage, ChatProvider, ChatResponse, EmbeddingProvider, EmbeddingResponse, LlmError,
    TokenUsage,
};

/// Retry behavior for provider requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
        }
    }
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingBody {
    data: Vec<EmbeddingItem>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<UsageBody> for TokenUsage {
    fn from(body: UsageBody) -> Self {
        Self {
            prompt_tokens: body.prompt_tokens,
            completion_tokens: body.completion_tokens,
        }
    }
}

impl OpenAiClient {
    /// Create a client for the given API base URL (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            embedding_model: embedding_model.into(),
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POST a JSON body, retrying transient failures with backoff.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut backoff = ExponentialBackoff {
            initial_interval: self.retry.initial_interval,
            max_interval: self.retry.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(&url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let mut wait = backoff
                        .next_backoff()
                        .unwrap_or(self.retry.max_interval);
                    if let LlmError::RateLimited {
                        retry_after_secs: Some(secs),
                    } = &e
                    {
                        wait = wait
                            .max(Duration::from_secs(*secs))
                            .min(self.retry.max_interval);
                    }
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        path,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<B, R>(&self, url: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read response: {}", e));
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse, LlmError> {
        let completion: ChatCompletion = self
            .post_json("/chat/completions", &ChatRequest { model, messages })
            .await?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("completion has no content".to_string()))?;

        let usage = completion.usage.map(TokenUsage::from).unwrap_or_default();
        debug!(model, tokens = usage.total(), "chat completion");
        Ok(ChatResponse { text, usage })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResponse, LlmError> {
        if texts.is_empty() {
            return Ok(EmbeddingResponse::default());
        }

        let body: EmbeddingBody = self
            .post_json(
                "/embeddings",
                &EmbeddingRequest {
                    model: &self.embedding_model,
                    input: texts,
                },
            )
            .await?;

        if body.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut items = body.data;
        items.sort_by_key(|item| item.index);

        Ok(EmbeddingResponse {
            vectors: items.into_iter().map(|item| item.embedding).collect(),
            usage: body.usage.map(TokenUsage::from).unwrap_or_default(),
        })
    }
}
