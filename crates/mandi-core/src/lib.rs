//! Core domain types for the mandi commodity price service.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Reference identities (`StateId`, `MarketId`, `CommodityId`, ...)
//! - `Price`: precision-safe price type
//! - `PriceObservation` / `LiveRecord`: persisted and live price data
//! - `PriceAlert`, `AlertDirection`: user price alerts
//! - `AnalyticsWindow`: the allowed analytics day windows

pub mod alert;
pub mod decimal;
pub mod error;
pub mod ids;
pub mod observation;
pub mod window;

pub use alert::{AlertDirection, AlertEvaluation, OwnerId, PriceAlert, TriggeredAlert};
pub use decimal::{round2, Price};
pub use error::{CoreError, Result};
pub use ids::{AlertId, CommodityId, DistrictId, GradeId, MarketId, StateId, VarietyId};
pub use observation::{
    parse_arrival_date, LiveRecord, ObservationKey, ParsedPriceFields, PriceField,
    PriceObservation, PriceTriple,
};
pub use window::AnalyticsWindow;
