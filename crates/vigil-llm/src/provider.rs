//! Provider capability traits.

use async_trait::async_trait;
use tracing::debug;

use crate::{ChatMessage, ChatResponse, EmbeddingResponse, LlmError};

/// Maximum number of texts sent in a single embedding request.
pub const MAX_EMBEDDING_BATCH: usize = 100;

/// Turns text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed at most [`MAX_EMBEDDING_BATCH`] texts.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResponse, LlmError>;
}

/// Produces chat completions.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse, LlmError>;
}

/// Embed any number of texts, batching requests and summing token usage.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<EmbeddingResponse, LlmError> {
    let mut result = EmbeddingResponse::default();

    for (batch_index, batch) in texts.chunks(MAX_EMBEDDING_BATCH).enumerate() {
        let response = provider.embed(batch).await?;
        if response.vectors.len() != batch.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                response.vectors.len()
            )));
        }
        debug!(batch = batch_index, size = batch.len(), "embedded batch");
        result.vectors.extend(response.vectors);
        result.usage += response.usage;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenUsage;
    use std::sync::Mutex;

    /// Records batch sizes and returns one-dimensional vectors.
    struct CountingEmbedder {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<EmbeddingResponse, LlmError> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(EmbeddingResponse {
                vectors: texts.iter().map(|t| vec![t.len() as f32]).collect(),
                usage: TokenUsage {
                    prompt_tokens: texts.len() as u64,
                    completion_tokens: 0,
                },
            })
        }
    }

    #[tokio::test]
    async fn test_embed_all_batches_by_hundred() {
        let embedder = CountingEmbedder {
            batches: Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = (0..250).map(|i| format!("text {}", i)).collect();

        let response = embed_all(&embedder, &texts).await.unwrap();

        assert_eq!(response.vectors.len(), 250);
        assert_eq!(response.usage.prompt_tokens, 250);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_embed_all_empty_makes_no_calls() {
        let embedder = CountingEmbedder {
            batches: Mutex::new(Vec::new()),
        };
        let response = embed_all(&embedder, &[]).await.unwrap();
        assert!(response.vectors.is_empty());
        assert!(embedder.batches.lock().unwrap().is_empty());
    }
}
