//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream request timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to decode upstream payload: {0}")]
    Decode(String),

    #[error("Upstream feed is not configured: {0}")]
    NotConfigured(String),
}

impl FeedError {
    /// Timeouts and 5xx responses may succeed on a later attempt.
    ///
    /// Nothing in the core retries automatically; the flag is informational
    /// for the scheduler and for error responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
