//! Analytics orchestration: entity lookups, live fetch, repository queries,
//! then one of the pure engines.

use crate::comparison::{ComparisonEngine, MarketSeries, PriceComparison};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::reconciliation::{MarketAnalytics, ReconciliationEngine};
use crate::trend::{CommodityTrend, PricePoint, TrendAnalyzer};
use chrono::NaiveDate;
use mandi_core::{
    AnalyticsWindow, CommodityId, LiveRecord, MarketId, PriceField, PriceObservation,
};
use mandi_feed::{FeedScope, LiveFeedClient};
use mandi_persistence::PriceRepository;
use mandi_registry::{Commodity, EntityResolver, MarketDirectoryEntry, MarketFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_COMMODITY_WINDOW: AnalyticsWindow = AnalyticsWindow::Month;
pub const DEFAULT_COMPARE_WINDOW: AnalyticsWindow = AnalyticsWindow::Week;
/// Trailing window for market reconciliation.
pub const RECONCILIATION_WINDOW: AnalyticsWindow = AnalyticsWindow::Month;
pub const DEFAULT_MARKET_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub days: u32,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    fn new(window: AnalyticsWindow, today: NaiveDate) -> Self {
        Self {
            days: window.days(),
            from: window.start(today),
            to: today,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityInfo {
    pub id: CommodityId,
    pub name: String,
    pub code: Option<String>,
}

impl From<Commodity> for CommodityInfo {
    fn from(c: Commodity) -> Self {
        Self {
            id: c.id,
            name: c.name,
            code: c.code,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalyticsReport {
    pub market: MarketDirectoryEntry,
    pub date: NaiveDate,
    pub analytics: MarketAnalytics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommodityAnalyticsReport {
    pub market: MarketDirectoryEntry,
    pub commodity: CommodityInfo,
    pub period: Period,
    pub analytics: CommodityTrend,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub commodity: CommodityInfo,
    pub period: Period,
    pub comparison: PriceComparison,
}

/// Validate a requested window. `None` takes the default.
pub fn resolve_window(
    days: Option<u32>,
    default: AnalyticsWindow,
) -> AnalyticsResult<AnalyticsWindow> {
    match days {
        None => Ok(default),
        Some(d) => AnalyticsWindow::try_from(d).map_err(|_| AnalyticsError::InvalidWindow(d)),
    }
}

/// Read-only analytics over the feed, the repository and the reference data.
#[derive(Clone)]
pub struct AnalyticsService {
    feed: Arc<dyn LiveFeedClient>,
    resolver: Arc<dyn EntityResolver>,
    prices: Arc<dyn PriceRepository>,
    market_limit: usize,
}

impl AnalyticsService {
    pub fn new(
        feed: Arc<dyn LiveFeedClient>,
        resolver: Arc<dyn EntityResolver>,
        prices: Arc<dyn PriceRepository>,
    ) -> Self {
        Self {
            feed,
            resolver,
            prices,
            market_limit: DEFAULT_MARKET_LIMIT,
        }
    }

    /// Cap on live records requested per market.
    pub fn with_market_limit(mut self, limit: usize) -> Self {
        self.market_limit = limit;
        self
    }

    pub fn list_markets(&self, filter: &MarketFilter) -> Vec<MarketDirectoryEntry> {
        self.resolver.list_markets(filter)
    }

    /// Classify every commodity of a market against its trailing 30 days.
    pub async fn market_analytics(
        &self,
        market: MarketId,
        today: NaiveDate,
    ) -> AnalyticsResult<MarketAnalyticsReport> {
        let market = self.market(market, "Market")?;
        let live = self.live_for_market(&market).await?;
        let history = self.prices.range(
            market.id,
            None,
            RECONCILIATION_WINDOW.start(today),
            today,
        );

        let analytics = ReconciliationEngine::new(self.resolver.as_ref(), self.prices.as_ref())
            .reconcile(market.id, &live, &history);
        Ok(MarketAnalyticsReport {
            market,
            date: today,
            analytics,
        })
    }

    /// Trend statistics of one commodity in one market.
    pub async fn commodity_analytics(
        &self,
        market: MarketId,
        commodity: CommodityId,
        days: Option<u32>,
        today: NaiveDate,
    ) -> AnalyticsResult<CommodityAnalyticsReport> {
        let window = resolve_window(days, DEFAULT_COMMODITY_WINDOW)?;
        let market = self.market(market, "Market")?;
        let commodity = self.commodity(commodity)?;

        let live = self.live_for_market(&market).await?;
        let today_point = live_point(&live, &commodity, today);
        let history = self.history(market.id, commodity.id, window, today);

        Ok(CommodityAnalyticsReport {
            market,
            commodity: commodity.into(),
            period: Period::new(window, today),
            analytics: TrendAnalyzer::new(window).analyze(today_point, history),
        })
    }

    /// Compare one commodity across two markets.
    pub async fn compare(
        &self,
        commodity: CommodityId,
        market_a: MarketId,
        market_b: MarketId,
        days: Option<u32>,
        today: NaiveDate,
    ) -> AnalyticsResult<ComparisonReport> {
        let window = resolve_window(days, DEFAULT_COMPARE_WINDOW)?;
        let commodity = self.commodity(commodity)?;
        let market_a = self.market(market_a, "Market A")?;
        let market_b = self.market(market_b, "Market B")?;

        let a = self.series(market_a, &commodity, window, today).await?;
        let b = self.series(market_b, &commodity, window, today).await?;

        Ok(ComparisonReport {
            commodity: commodity.into(),
            period: Period::new(window, today),
            comparison: ComparisonEngine.compare(a, b),
        })
    }

    fn market(&self, id: MarketId, kind: &'static str) -> AnalyticsResult<MarketDirectoryEntry> {
        self.resolver
            .market_entry(id)
            .ok_or_else(|| AnalyticsError::not_found(kind, id))
    }

    fn commodity(&self, id: CommodityId) -> AnalyticsResult<Commodity> {
        self.resolver
            .commodity(id)
            .ok_or_else(|| AnalyticsError::not_found("Commodity", id))
    }

    /// Live records of exactly this market. The provider matches loosely, so filter again.
    async fn live_for_market(
        &self,
        market: &MarketDirectoryEntry,
    ) -> AnalyticsResult<Vec<LiveRecord>> {
        let scope = FeedScope::market(&market.state.name, &market.district.name, &market.name)
            .with_limit(self.market_limit);
        let records = self.feed.fetch_live(scope).await.map_err(|e| {
            warn!(market = %market.name, error = %e, "Live feed fetch failed");
            e
        })?;

        let fetched = records.len();
        let live: Vec<LiveRecord> = records
            .into_iter()
            .filter(|r| r.is_market(&market.name))
            .collect();
        debug!(market = %market.name, fetched, kept = live.len(), "Live records fetched");
        Ok(live)
    }

    fn history(
        &self,
        market: MarketId,
        commodity: CommodityId,
        window: AnalyticsWindow,
        today: NaiveDate,
    ) -> Vec<PricePoint> {
        self.prices
            .range(market, Some(commodity), window.start(today), today)
            .iter()
            .map(|o| self.point(o))
            .collect()
    }

    async fn series(
        &self,
        market: MarketDirectoryEntry,
        commodity: &Commodity,
        window: AnalyticsWindow,
        today: NaiveDate,
    ) -> AnalyticsResult<MarketSeries> {
        let live_records = self.live_for_market(&market).await?;
        let live = live_point(&live_records, commodity, today);
        let history = self.history(market.id, commodity.id, window, today);
        let latest_ever = if live.is_none() && history.is_empty() {
            self.prices
                .latest(market.id, commodity.id)
                .map(|o| self.point(&o))
        } else {
            None
        };

        Ok(MarketSeries {
            market,
            live,
            history,
            latest_ever,
        })
    }

    fn point(&self, o: &PriceObservation) -> PricePoint {
        PricePoint {
            date: o.arrival_date,
            modal_price: o.modal_price,
            min_price: o.min_price,
            max_price: o.max_price,
            variety: self.resolver.variety(o.variety).map(|v| v.name),
            grade: self.resolver.grade(o.grade).map(|g| g.name),
        }
    }
}

/// Today's entry for a commodity, from the first matching live record with a usable modal price.
///
/// An unparsable min or max falls back to the modal price.
fn live_point(live: &[LiveRecord], commodity: &Commodity, today: NaiveDate) -> Option<PricePoint> {
    live.iter()
        .filter(|r| r.is_commodity(&commodity.name))
        .find_map(|r| {
            let modal_price = r.prices.modal_price()?;
            Some(PricePoint {
                date: today,
                modal_price,
                min_price: r.prices.price(PriceField::Min).unwrap_or(modal_price),
                max_price: r.prices.price(PriceField::Max).unwrap_or(modal_price),
                variety: None,
                grade: None,
            })
        })
}
