//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur when reading or writing stored records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found.
    #[error("record not found: {kind}/{key}")]
    NotFound { kind: &'static str, key: String },

    /// A write was rejected by the backend.
    #[error("write failed: {0}")]
    Write(String),
}
