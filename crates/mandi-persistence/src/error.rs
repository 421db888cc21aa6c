//! Persistence error types.

use mandi_core::AlertId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another alert already holds the (owner, market, commodity, direction) slot.
    #[error("Alert slot already taken by {0}")]
    SlotTaken(AlertId),

    /// Alerts were removed from memory but their tombstones could not be written.
    #[error("Retired {removed} alerts but failed to journal the deletion: {source}")]
    Unjournaled {
        removed: usize,
        #[source]
        source: Box<PersistenceError>,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
