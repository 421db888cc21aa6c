//! Alert error types.

use mandi_core::AlertDirection;
use mandi_feed::FeedError;
use mandi_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    /// Unknown entity, or an alert that does not belong to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    /// The owner already has an alert in this direction for the market and commodity.
    #[error("You already have a \"{0}\" alert for this commodity in this market. Each user can set maximum 2 alerts per market-commodity: one \"up\" and one \"down\".")]
    Duplicate(AlertDirection),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Upstream feed failure: {0}")]
    Upstream(#[from] FeedError),
}

impl AlertError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type AlertResult<T> = Result<T, AlertError>;
