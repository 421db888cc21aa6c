//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} name is empty")]
    EmptyName(&'static str),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Upstream feed error: {0}")]
    Feed(#[from] mandi_feed::FeedError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] mandi_persistence::PersistenceError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
