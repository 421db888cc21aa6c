//! Time-series statistics for one (market, commodity) pair.

use crate::stats::{self, PriceMove, Trend, VolatilityLevel};
use chrono::NaiveDate;
use mandi_core::{round2, AnalyticsWindow, Price};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

const UNKNOWN: &str = "Unknown";
const MOVING_AVERAGE_PERIODS: [usize; 3] = [7, 14, 30];
/// Current price more than 5% above (or below) the window average.
const ABOVE_AVERAGE: Decimal = Decimal::from_parts(105, 0, 0, false, 2);
const BELOW_AVERAGE: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// One dated price entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub modal_price: Price,
    pub min_price: Price,
    pub max_price: Price,
    /// `None` for the synthetic entry built from today's live record.
    pub variety: Option<String>,
    pub grade: Option<String>,
}

/// Either a computed section or the reason it could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Availability<T> {
    Available(T),
    NoData { message: String },
}

impl<T> Availability<T> {
    fn no_data(message: impl Into<String>) -> Self {
        Self::NoData {
            message: message.into(),
        }
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::NoData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelStats {
    pub highest: Price,
    pub lowest: Price,
    pub average: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalStats {
    pub highest: Price,
    pub lowest: Price,
    pub average: Decimal,
    /// Most recent entry, today's when live.
    pub current: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityMetrics {
    pub standard_deviation: Decimal,
    pub coefficient_of_variation: Decimal,
    pub volatility_level: VolatilityLevel,
    pub interpretation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceStatistics {
    pub total_records: usize,
    pub period: String,
    pub modal_price: ModalStats,
    pub min_price: LevelStats,
    pub max_price: LevelStats,
    pub volatility_metrics: VolatilityMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStep {
    pub change: Decimal,
    pub change_percent: Decimal,
    pub direction: Trend,
    pub comparison: String,
}

impl TrendStep {
    fn new(newer: Price, older: Price, comparison: String) -> Self {
        let m = PriceMove::between(newer, older);
        Self {
            change: m.change,
            change_percent: m.change_percent,
            direction: m.trend,
            comparison,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub price_range: Decimal,
    /// Against the lowest modal price, zero when that is zero.
    pub price_range_percent: Decimal,
}

/// Day-over-day transitions across the whole sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceMovement {
    pub increases: usize,
    pub decreases: usize,
    pub stable: usize,
    pub total_comparisons: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    /// Present with two or more entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_trend: Option<TrendStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_trend: Option<TrendStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<PriceRange>,
    pub price_movement: PriceMovement,
}

/// Simple moving averages of the most recent k entries; `None` when fewer exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovingAverages {
    pub ma7: Option<Decimal>,
    pub ma14: Option<Decimal>,
    pub ma30: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub name: String,
    pub count: usize,
    pub avg_price: Decimal,
    pub min_price: Price,
    pub max_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarietyAnalysis {
    pub varieties: Vec<GroupStats>,
    pub grades: Vec<GroupStats>,
    pub has_multiple_varieties: bool,
    pub has_multiple_grades: bool,
    pub price_spread: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    AboveAverage,
    BelowAverage,
    Average,
}

impl PriceLevel {
    fn classify(current: Price, average: Decimal) -> Self {
        let current = current.inner();
        if average
            .checked_mul(ABOVE_AVERAGE)
            .is_some_and(|bound| current > bound)
        {
            Self::AboveAverage
        } else if average
            .checked_mul(BELOW_AVERAGE)
            .is_some_and(|bound| current < bound)
        {
            Self::BelowAverage
        } else {
            Self::Average
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Live,
    Historical,
    NoData,
}

fn recommend(trend: Trend, level: PriceLevel) -> &'static str {
    match (trend, level) {
        (Trend::Up, l) if l != PriceLevel::BelowAverage => "Rising prices - good time for sellers",
        (Trend::Down, l) if l != PriceLevel::AboveAverage => "Falling prices - good time for buyers",
        (_, PriceLevel::AboveAverage) => "Prices above average - consider selling",
        (_, PriceLevel::BelowAverage) => "Prices below average - good buying opportunity",
        _ => "Prices stable - monitor market conditions",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickSummary {
    pub status: SummaryStatus,
    pub current_price: Price,
    pub trend: Trend,
    pub change_percent: Decimal,
    pub change_text: String,
    pub price_level: PriceLevel,
    pub recommendation: &'static str,
    pub volatility: VolatilityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryCard {
    Ready(QuickSummary),
    NoData {
        status: SummaryStatus,
        message: String,
    },
}

/// Full analysis of one price series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityTrend {
    pub is_updated_today: bool,
    pub today_price: Option<PricePoint>,
    /// Up to three most recent entries.
    pub latest_prices: Vec<PricePoint>,
    /// Newest first, today's live entry included.
    pub price_history: Vec<PricePoint>,
    pub statistics: Availability<PriceStatistics>,
    pub trends: Availability<TrendReport>,
    pub moving_averages: Availability<MovingAverages>,
    pub variety_analysis: Availability<VarietyAnalysis>,
    pub quick_summary: SummaryCard,
}

/// Computes [`CommodityTrend`] from a newest-first series.
#[derive(Debug, Clone, Copy)]
pub struct TrendAnalyzer {
    window: AnalyticsWindow,
}

impl TrendAnalyzer {
    pub fn new(window: AnalyticsWindow) -> Self {
        Self { window }
    }

    /// `history` is newest first and excludes today; `today` is the live entry, if any.
    pub fn analyze(&self, today: Option<PricePoint>, history: Vec<PricePoint>) -> CommodityTrend {
        let latest_prices: Vec<PricePoint> = today
            .iter()
            .chain(history.iter())
            .take(3)
            .cloned()
            .collect();
        let series: Vec<PricePoint> = today.iter().cloned().chain(history.iter().cloned()).collect();
        let is_updated_today = today.is_some();

        if series.is_empty() {
            return CommodityTrend {
                is_updated_today,
                today_price: today,
                latest_prices,
                price_history: series,
                statistics: Availability::no_data(format!(
                    "No price data found for last {} days",
                    self.window.days()
                )),
                trends: Availability::no_data("Insufficient data for trend analysis"),
                moving_averages: Availability::no_data("Insufficient data for moving averages"),
                variety_analysis: Availability::no_data("No data available for variety analysis"),
                quick_summary: SummaryCard::NoData {
                    status: SummaryStatus::NoData,
                    message: "No price data available for the selected period".to_string(),
                },
            };
        }

        let statistics = self.statistics(&series);
        let trends = self.trends(&series, &statistics);
        let variety_analysis = if history.is_empty() {
            Availability::no_data("No data available for variety analysis")
        } else {
            Availability::Available(variety_analysis(&history))
        };
        let quick_summary = SummaryCard::Ready(quick_summary(
            is_updated_today,
            &series,
            &statistics,
            &trends,
        ));

        CommodityTrend {
            is_updated_today,
            today_price: today,
            latest_prices,
            moving_averages: Availability::Available(moving_averages(&series)),
            price_history: series,
            statistics: Availability::Available(statistics),
            trends: Availability::Available(trends),
            variety_analysis,
            quick_summary,
        }
    }

    /// `series` must be non-empty.
    fn statistics(&self, series: &[PricePoint]) -> PriceStatistics {
        let modal: Vec<Decimal> = series.iter().map(|p| p.modal_price.inner()).collect();
        let mins: Vec<Decimal> = series.iter().map(|p| p.min_price.inner()).collect();
        let maxs: Vec<Decimal> = series.iter().map(|p| p.max_price.inner()).collect();

        let mean = stats::mean(&modal).unwrap_or_default();
        let std_dev = stats::std_dev(&modal).unwrap_or_default();
        let cov = stats::coefficient_of_variation(std_dev, mean);
        let level = VolatilityLevel::classify(cov);

        PriceStatistics {
            total_records: series.len(),
            period: format!("{} days", self.window.days()),
            modal_price: ModalStats {
                highest: Price::new(stats::max(&modal).unwrap_or_default()),
                lowest: Price::new(stats::min(&modal).unwrap_or_default()),
                average: round2(mean),
                current: series[0].modal_price,
            },
            min_price: level_stats(&mins),
            max_price: level_stats(&maxs),
            volatility_metrics: VolatilityMetrics {
                standard_deviation: round2(std_dev),
                coefficient_of_variation: round2(cov),
                volatility_level: level,
                interpretation: level.interpretation(),
            },
        }
    }

    fn trends(&self, series: &[PricePoint], statistics: &PriceStatistics) -> TrendReport {
        let mut report = TrendReport {
            recent_trend: None,
            overall_trend: None,
            volatility: None,
            price_movement: price_movement(series),
        };

        if let [current, previous, ..] = series {
            let oldest = &series[series.len() - 1];
            report.recent_trend = Some(TrendStep::new(
                current.modal_price,
                previous.modal_price,
                "vs previous day".to_string(),
            ));
            report.overall_trend = Some(TrendStep::new(
                current.modal_price,
                oldest.modal_price,
                format!("vs {} days ago", self.window.days()),
            ));
            let highest = statistics.modal_price.highest;
            let lowest = statistics.modal_price.lowest;
            report.volatility = Some(PriceRange {
                price_range: (highest - lowest).inner(),
                price_range_percent: highest.change_pct(lowest),
            });
        }
        report
    }
}

fn level_stats(values: &[Decimal]) -> LevelStats {
    LevelStats {
        highest: Price::new(stats::max(values).unwrap_or_default()),
        lowest: Price::new(stats::min(values).unwrap_or_default()),
        average: stats::mean2(values).unwrap_or_default(),
    }
}

fn price_movement(series: &[PricePoint]) -> PriceMovement {
    let mut movement = PriceMovement {
        total_comparisons: series.len().saturating_sub(1),
        ..Default::default()
    };
    for pair in series.windows(2) {
        match Trend::of((pair[0].modal_price - pair[1].modal_price).inner()) {
            Trend::Up => movement.increases += 1,
            Trend::Down => movement.decreases += 1,
            _ => movement.stable += 1,
        }
    }
    movement
}

fn moving_average(series: &[PricePoint], period: usize) -> Option<Decimal> {
    if series.len() < period {
        return None;
    }
    let recent: Vec<Decimal> = series[..period].iter().map(|p| p.modal_price.inner()).collect();
    stats::mean2(&recent)
}

fn moving_averages(series: &[PricePoint]) -> MovingAverages {
    let [p7, p14, p30] = MOVING_AVERAGE_PERIODS;
    MovingAverages {
        ma7: moving_average(series, p7),
        ma14: moving_average(series, p14),
        ma30: moving_average(series, p30),
    }
}

fn group_stats<'a>(entries: impl Iterator<Item = (&'a str, Price)>) -> Vec<GroupStats> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<Decimal>> = HashMap::new();
    for (name, price) in entries {
        groups
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(price.inner());
    }

    let mut result: Vec<GroupStats> = order
        .into_iter()
        .map(|name| {
            let prices = &groups[name];
            GroupStats {
                name: name.to_string(),
                count: prices.len(),
                avg_price: stats::mean2(prices).unwrap_or_default(),
                min_price: Price::new(stats::min(prices).unwrap_or_default()),
                max_price: Price::new(stats::max(prices).unwrap_or_default()),
            }
        })
        .collect();
    result.sort_by(|a, b| b.avg_price.cmp(&a.avg_price));
    result
}

fn label(name: &Option<String>) -> &str {
    name.as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(UNKNOWN)
}

fn variety_analysis(history: &[PricePoint]) -> VarietyAnalysis {
    let varieties = group_stats(history.iter().map(|p| (label(&p.variety), p.modal_price)));
    let grades = group_stats(history.iter().map(|p| (label(&p.grade), p.modal_price)));

    let price_spread = match (varieties.first(), varieties.last()) {
        (Some(top), Some(bottom)) if varieties.len() > 1 => round2(top.avg_price - bottom.avg_price),
        _ => Decimal::ZERO,
    };

    VarietyAnalysis {
        has_multiple_varieties: varieties.len() > 1,
        has_multiple_grades: grades.len() > 1,
        varieties,
        grades,
        price_spread,
    }
}

fn quick_summary(
    is_updated_today: bool,
    series: &[PricePoint],
    statistics: &PriceStatistics,
    trends: &TrendReport,
) -> QuickSummary {
    let current = series[0].modal_price;
    let level = PriceLevel::classify(current, statistics.modal_price.average);
    let (trend, change_percent, change_text) = match &trends.recent_trend {
        Some(step) => {
            let sign = if step.change_percent > Decimal::ZERO { "+" } else { "" };
            (
                step.direction,
                step.change_percent,
                format!("{sign}{}% {}", step.change_percent.normalize(), step.comparison),
            )
        }
        None => (Trend::Stable, Decimal::ZERO, "No change data".to_string()),
    };

    QuickSummary {
        status: if is_updated_today {
            SummaryStatus::Live
        } else {
            SummaryStatus::Historical
        },
        current_price: current,
        trend,
        change_percent,
        change_text,
        price_level: level,
        recommendation: recommend(trend, level),
        volatility: statistics.volatility_metrics.volatility_level,
    }
}
