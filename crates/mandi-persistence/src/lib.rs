//! Persistence for mandi.
//!
//! Price observations and alerts live in memory and are optionally backed
//! by append-only JSON Lines journals that are replayed on start-up.

pub mod alert_store;
pub mod error;
pub mod journal;
pub mod price_store;

pub use alert_store::{AlertFilter, AlertStore, InMemoryAlertStore};
pub use error::{PersistenceError, PersistenceResult};
pub use journal::JsonLinesJournal;
pub use price_store::{InMemoryPriceStore, PriceRepository, UpsertOutcome};
