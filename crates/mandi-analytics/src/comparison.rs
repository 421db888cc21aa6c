//! Side-by-side price comparison of one commodity in two markets.

use crate::stats::{self, PriceMove, Trend};
use crate::trend::PricePoint;
use chrono::NaiveDate;
use mandi_core::{round2, Price};
use mandi_registry::MarketDirectoryEntry;
use rust_decimal::Decimal;
use serde::Serialize;

/// Average-price gap (currency units) beyond which one market is called consistently better.
pub const CONSISTENT_GAP: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

const INSUFFICIENT_DATA: &str =
    "Insufficient data to compare prices for this commodity in selected markets";

/// Raw price data of one market.
#[derive(Debug, Clone)]
pub struct MarketSeries {
    pub market: MarketDirectoryEntry,
    /// Today's live entry.
    pub live: Option<PricePoint>,
    /// In-window history, newest first, excluding today.
    pub history: Vec<PricePoint>,
    /// Most recent observation ever, used when the window is empty.
    pub latest_ever: Option<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    #[serde(flatten)]
    pub market: MarketDirectoryEntry,
    pub current_price: Option<Price>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub avg_price: Option<Decimal>,
    pub trend: Trend,
    pub change_percent: Decimal,
    pub last_updated: Option<NaiveDate>,
    pub price_history: Vec<PricePoint>,
}

impl MarketSnapshot {
    fn from_series(series: MarketSeries) -> Self {
        let MarketSeries {
            market,
            live,
            history,
            latest_ever,
        } = series;
        let window: Vec<PricePoint> = live.iter().cloned().chain(history).collect();

        if window.is_empty() {
            // Fall back to the latest observation of any age; history stays empty.
            return Self {
                market,
                current_price: latest_ever.as_ref().map(|p| p.modal_price),
                min_price: latest_ever.as_ref().map(|p| p.min_price),
                max_price: latest_ever.as_ref().map(|p| p.max_price),
                avg_price: latest_ever.as_ref().map(|p| p.modal_price.inner()),
                trend: Trend::NoData,
                change_percent: Decimal::ZERO,
                last_updated: latest_ever.as_ref().map(|p| p.date),
                price_history: Vec::new(),
            };
        }

        let current = live.as_ref().unwrap_or(&window[0]);
        let modal: Vec<Decimal> = window.iter().map(|p| p.modal_price.inner()).collect();
        let mins: Vec<Decimal> = window.iter().map(|p| p.min_price.inner()).collect();
        let maxs: Vec<Decimal> = window.iter().map(|p| p.max_price.inner()).collect();
        let (trend, change_percent) = match window.as_slice() {
            [newest, previous, ..] => {
                let m = PriceMove::between(newest.modal_price, previous.modal_price);
                (m.trend, m.change_percent)
            }
            _ => (Trend::Stable, Decimal::ZERO),
        };

        Self {
            market,
            current_price: Some(current.modal_price),
            last_updated: Some(current.date),
            min_price: stats::min(&mins).map(Price::new),
            max_price: stats::max(&maxs).map(Price::new),
            avg_price: stats::mean2(&modal),
            trend,
            change_percent,
            price_history: window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheaperMarket {
    #[serde(rename = "marketA")]
    MarketA,
    #[serde(rename = "marketB")]
    MarketB,
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "insufficient_data")]
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceComparison {
    pub market_a: MarketSnapshot,
    pub market_b: MarketSnapshot,
    pub price_difference: Option<Decimal>,
    pub price_difference_percent: Option<Decimal>,
    pub cheaper_market: CheaperMarket,
    pub recommendation: String,
}

/// Compares the current and average prices of two markets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn compare(&self, a: MarketSeries, b: MarketSeries) -> PriceComparison {
        let market_a = MarketSnapshot::from_series(a);
        let market_b = MarketSnapshot::from_series(b);

        // A zero price means the market reported nothing usable.
        let usable = |price: Option<Price>| price.filter(|p| !p.is_zero());
        let (Some(price_a), Some(price_b)) =
            (usable(market_a.current_price), usable(market_b.current_price))
        else {
            return PriceComparison {
                market_a,
                market_b,
                price_difference: None,
                price_difference_percent: None,
                cheaper_market: CheaperMarket::InsufficientData,
                recommendation: INSUFFICIENT_DATA.to_string(),
            };
        };

        let diff = (price_a - price_b).inner();
        let difference = round2(diff.abs());
        let percent = price_a
            .pct_from(price_b)
            .map(|pct| round2(pct.abs()))
            .unwrap_or(Decimal::ZERO);
        let cheaper_market = match Trend::of(diff) {
            Trend::Up => CheaperMarket::MarketB,
            Trend::Down => CheaperMarket::MarketA,
            _ => CheaperMarket::Equal,
        };

        let mut recommendation = match cheaper_market {
            CheaperMarket::MarketA => cheaper_sentence(&market_a, difference, percent),
            CheaperMarket::MarketB => cheaper_sentence(&market_b, difference, percent),
            _ => "Both markets have similar prices".to_string(),
        };
        if let (Some(avg_a), Some(avg_b)) = (market_a.avg_price, market_b.avg_price) {
            let gap = avg_a - avg_b;
            if gap.abs() > CONSISTENT_GAP {
                let better = if gap > Decimal::ZERO { &market_b } else { &market_a };
                recommendation.push_str(&format!(
                    ". {} has consistently better prices on average.",
                    better.market.name
                ));
            }
        }

        PriceComparison {
            market_a,
            market_b,
            price_difference: Some(difference),
            price_difference_percent: Some(percent),
            cheaper_market,
            recommendation,
        }
    }
}

fn cheaper_sentence(market: &MarketSnapshot, difference: Decimal, percent: Decimal) -> String {
    format!(
        "{} is ₹{} cheaper ({}% less)",
        market.market.name,
        difference.normalize(),
        percent.normalize()
    )
}
