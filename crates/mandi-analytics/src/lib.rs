//! Price analytics for mandi.
//!
//! Three read-only engines:
//! - [`ReconciliationEngine`] classifies a market's commodities by comparing
//!   today's live feed with the trailing 30 days of observations.
//! - [`TrendAnalyzer`] computes statistics, trends, moving averages and a
//!   variety/grade breakdown for one commodity in one market.
//! - [`ComparisonEngine`] compares one commodity across two markets.
//!
//! [`AnalyticsService`] wires them to the live feed, the price repository
//! and the reference data.

pub mod comparison;
pub mod error;
pub mod reconciliation;
pub mod service;
pub mod stats;
pub mod trend;

pub use comparison::{CheaperMarket, ComparisonEngine, MarketSeries, MarketSnapshot, PriceComparison};
pub use error::{AnalyticsError, AnalyticsResult};
pub use reconciliation::{
    AnalyticsSummary, CommodityClassification, CommodityRef, MarketAnalytics, NewCommodity,
    PriceExtreme, ReconciliationEngine, RemainingCommodity, StaleCommodity, UpdatedCommodity,
};
pub use service::{
    resolve_window, AnalyticsService, CommodityAnalyticsReport, CommodityInfo,
    ComparisonReport, MarketAnalyticsReport, Period, DEFAULT_COMMODITY_WINDOW,
    DEFAULT_COMPARE_WINDOW,
};
pub use stats::{PriceMove, Trend, VolatilityLevel};
pub use trend::{Availability, CommodityTrend, PricePoint, SummaryCard, TrendAnalyzer};
