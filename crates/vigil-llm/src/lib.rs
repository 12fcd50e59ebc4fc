//! Embedding and chat provider clients for Vigil.
//!
//! This crate provides:
//! - Capability traits for embedding and chat providers
//! - An OpenAI-compatible HTTP client with jittered exponential backoff
//! - Explicit provider resolution with cache invalidation
//! - Token accounting for chat calls

mod error;
mod metered;
mod openai;
mod provider;
mod registry;
mod types;

pub use error::LlmError;
pub use metered::{MeteredChat, UsageMeter};
pub use openai::{OpenAiClient, RetryPolicy};
pub use provider::{ChatProvider, EmbeddingProvider, MAX_EMBEDDING_BATCH, embed_all};
pub use registry::{ProviderConfig, ProviderRegistry, Providers};
pub use types::{ChatMessage, ChatResponse, EmbeddingResponse, Role, TokenUsage};
