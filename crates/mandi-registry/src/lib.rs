//! Reference data and ingestion for mandi.
//!
//! Owns the state/district/market/commodity/variety/grade dictionaries,
//! resolves free-text upstream names to identities, and ingests upstream
//! records into the price repository.

pub mod entity;
pub mod error;
pub mod ingest;
pub mod reference;
pub mod sync;

pub use entity::{
    Commodity, District, EntityCounts, Grade, Market, MarketDirectoryEntry, MarketFilter, NamedRef,
    State, Variety,
};
pub use error::{RegistryError, RegistryResult};
pub use ingest::{IngestErrorDetail, IngestSummary, PriceIngestor};
pub use reference::{EntityResolver, ReferenceStore};
pub use sync::{SyncReport, SyncService, SyncStatus};
