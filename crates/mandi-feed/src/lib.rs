//! Upstream price feed for mandi.
//!
//! Fetches daily commodity price records from the open-data API and turns
//! the loosely typed payload into `LiveRecord`s. The rest of the system only
//! sees the `LiveFeedClient` trait.

pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod source;

pub use client::DataGovClient;
pub use config::FeedConfig;
pub use error::{FeedError, FeedResult};
pub use parser::{parse_records, RawPriceRecord, UpstreamEnvelope};
pub use source::{BoxFuture, FeedScope, LiveFeedClient, MockFeedClient};
