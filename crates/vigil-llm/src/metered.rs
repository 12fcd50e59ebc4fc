//! Token accounting for chat calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::{ChatMessage, ChatProvider, ChatResponse, LlmError, TokenUsage};

/// Running total of tokens consumed.
#[derive(Debug, Default)]
pub struct UsageMeter {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl UsageMeter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, usage: TokenUsage) {
        self.prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn total(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

/// A chat provider that records the usage of every successful call.
pub struct MeteredChat {
    inner: Arc<dyn ChatProvider>,
    meter: Arc<UsageMeter>,
}

impl MeteredChat {
    pub fn new(inner: Arc<dyn ChatProvider>, meter: Arc<UsageMeter>) -> Self {
        Self { inner, meter }
    }
}

#[async_trait]
impl ChatProvider for MeteredChat {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse, LlmError> {
        let response = self.inner.chat(model, messages).await?;
        self.meter.record(response.usage);
        Ok(response)
    }
}
