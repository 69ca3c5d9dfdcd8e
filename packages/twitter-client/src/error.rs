use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwitterError>;

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Network error: {0}")]
    Network(String),

    /// 429 Too Many Requests. `reset_at` comes from `x-rate-limit-reset`
    /// when the header is present and parseable.
    #[error("Too many requests (reset at {reset_at:?}): {body}")]
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        body: String,
    },

    #[error("Twitter unavailable (status {status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("Twitter API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}
