//! Analytics error types.

use mandi_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// `kind` is the display name of the missing entity ("Market", "Market A", ...).
    #[error("{kind} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid days parameter. Allowed values: 7, 15, 30")]
    InvalidWindow(u32),

    #[error("Upstream feed failure: {0}")]
    Upstream(#[from] FeedError),
}

impl AnalyticsError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
