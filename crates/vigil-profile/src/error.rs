//! Error types for the analysis engine.

use thiserror::Error;

use crate::Checkpoint;

/// Errors that abort an engine operation.
///
/// Degradable failures (explanations, scheduled personality updates, topic
/// labels) never surface here; they are logged and replaced by fallbacks.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    /// Provider error.
    #[error("provider error: {0}")]
    Llm(#[from] vigil_llm::LlmError),

    /// The monitored account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The account has no profile yet.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// An embedding does not match the dimensionality of the profile.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Clustering could not be performed.
    #[error("clustering failed: {0}")]
    Clustering(String),

    /// The personality response failed schema validation.
    #[error("invalid personality response: {0}")]
    InvalidPersonality(String),

    /// The caller cancelled the run.
    #[error("run cancelled at {checkpoint}")]
    Cancelled { checkpoint: Checkpoint },
}
