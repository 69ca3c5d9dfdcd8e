//! Error types for the Hugging Face client.

use thiserror::Error;

/// Result type for Hugging Face client operations.
pub type Result<T> = std::result::Result<T, HuggingFaceError>;

/// Hugging Face client errors.
///
/// `Network` and `Unavailable` are transient. `RateLimited` is the remote
/// limiter pushing back. `Api` and `Parse` will not improve on retry.
#[derive(Debug, Error)]
pub enum HuggingFaceError {
    /// Network error (connection failed, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// 429 Too Many Requests
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 503 while the model loads or the service is overloaded
    #[error("Service unavailable (status {status}): {body}")]
    Unavailable { status: u16, body: String },

    /// Any other non-200 response
    #[error("Request failed (status {status}): {body}")]
    Api { status: u16, body: String },

    /// 200 with a body that carries no summary or generated text
    #[error("Unexpected response format: {0}")]
    Parse(String),
}

impl HuggingFaceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HuggingFaceError::Network(_) | HuggingFaceError::Unavailable { .. }
        )
    }
}
