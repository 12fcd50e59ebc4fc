//! Error types for provider calls.

use thiserror::Error;

/// Errors that can occur when calling an embedding or chat provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Non-success status from the provider.
    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider configuration is missing or unusable.
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether the failure is worth retrying.
    ///
    /// Rate limits, server errors and connection failures are transient.
    /// Other 4xx responses (bad request, auth) fail fast.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
