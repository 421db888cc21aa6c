//! Live-vs-history reconciliation for one market.
//!
//! Each commodity seen today or in the trailing window lands in exactly one
//! classification:
//!
//! | live today | resolvable | in-window history | classification            |
//! |------------|------------|-------------------|---------------------------|
//! | yes        | no         | -                 | `newCommodity`            |
//! | yes        | yes        | none, older exists| hike / drop / unchanged   |
//! | yes        | yes        | none ever         | `updatedTodayNewEntry`    |
//! | yes        | yes        | 1+                | hike / drop / unchanged   |
//! | no         | -          | exactly 1         | `notUpdatedSingleEntry`   |
//! | no         | -          | 2+                | `notUpdatedMultiEntry`    |

use crate::stats::{PriceMove, Trend};
use chrono::NaiveDate;
use mandi_core::{CommodityId, LiveRecord, MarketId, Price, PriceObservation};
use mandi_persistence::PriceRepository;
use mandi_registry::EntityResolver;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const NEW_COMMODITY_MESSAGE: &str = "New commodity added today";
const REMAINING_MESSAGE: &str = "Commodity has last price but not updated today";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommodityClassification {
    PriceHike,
    PriceDrop,
    Unchanged,
    NewCommodity,
    UpdatedTodayNewEntry,
    NotUpdatedSingleEntry,
    NotUpdatedMultiEntry,
}

impl CommodityClassification {
    fn of(trend: Trend) -> Self {
        match trend {
            Trend::Up => Self::PriceHike,
            Trend::Down => Self::PriceDrop,
            _ => Self::Unchanged,
        }
    }
}

/// A resolved commodity priced today.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedCommodity {
    pub commodity_id: CommodityId,
    pub commodity: String,
    pub classification: CommodityClassification,
    pub current_price: Price,
    /// Set for new entries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Price>,
    /// `None` when the commodity was never priced in this market.
    pub last_price: Option<Price>,
    pub last_price_date: Option<NaiveDate>,
    pub price_difference: Decimal,
    pub price_change_percent: Decimal,
    pub trend: Trend,
    pub historical_count: usize,
}

/// A live commodity name with no matching reference entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommodity {
    /// Always `None`: the name did not resolve.
    pub commodity_id: Option<CommodityId>,
    pub commodity: String,
    pub current_price: Price,
    pub min_price: Price,
    pub max_price: Price,
    pub message: &'static str,
}

/// Not priced today, two or more observations in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleCommodity {
    pub commodity_id: CommodityId,
    pub commodity: String,
    pub classification: CommodityClassification,
    pub last_price: Price,
    pub last_price_date: NaiveDate,
    pub entries_count: usize,
    pub previous_price: Price,
    pub previous_price_date: NaiveDate,
    pub last_price_change: Decimal,
    pub last_price_change_percent: Decimal,
    pub last_trend: Trend,
}

/// Not priced today, exactly one observation in the window. Carries no trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingCommodity {
    pub commodity_id: CommodityId,
    pub commodity: String,
    pub classification: CommodityClassification,
    pub last_price: Price,
    pub min_price: Price,
    pub max_price: Price,
    pub last_price_date: NaiveDate,
    pub entries_count: usize,
    pub message: &'static str,
}

/// Highest or lowest live modal price of the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceExtreme {
    pub commodity_id: Option<CommodityId>,
    pub commodity: String,
    pub modal_price: Price,
    pub min_price: Price,
    pub max_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityRef {
    pub commodity_id: CommodityId,
    pub commodity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_live_records: usize,
    pub total_historical_records: usize,
    /// Distinct live commodities plus multi-entry stale commodities.
    pub unique_commodities: usize,
    pub commodities_updated_today: usize,
    pub commodities_not_updated_today: usize,
    pub new_commodities_added_today: usize,
    pub remaining_commodities: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalytics {
    /// Sorted by percent change, largest first.
    pub price_hikes: Vec<UpdatedCommodity>,
    /// Sorted by percent change, most negative first.
    pub price_drops: Vec<UpdatedCommodity>,
    pub new_commodities: Vec<NewCommodity>,
    pub unchanged_prices: Vec<UpdatedCommodity>,
    pub not_updated_today: Vec<StaleCommodity>,
    pub remaining_commodities: Vec<RemainingCommodity>,
    /// Every resolved live commodity, new entries included.
    pub updated_today: Vec<UpdatedCommodity>,
    pub all_unique_commodity: Vec<CommodityRef>,
    pub highest_price: Option<PriceExtreme>,
    pub lowest_price: Option<PriceExtreme>,
    pub summary: AnalyticsSummary,
}

/// Classifies one market's commodities. Read-only over the resolver and repository.
pub struct ReconciliationEngine<'a> {
    resolver: &'a dyn EntityResolver,
    prices: &'a dyn PriceRepository,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, prices: &'a dyn PriceRepository) -> Self {
        Self { resolver, prices }
    }

    /// Reconcile today's `live` records against the market's in-window `history`.
    ///
    /// `live` must already be restricted to the market. `history` must exclude today.
    pub fn reconcile(
        &self,
        market: MarketId,
        live: &[LiveRecord],
        history: &[PriceObservation],
    ) -> MarketAnalytics {
        let mut analytics = MarketAnalytics {
            summary: AnalyticsSummary {
                total_live_records: live.len(),
                total_historical_records: history.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        let live_by_name = first_seen_by_name(live);
        let history = HistoryGroups::new(history);
        let mut seen_live: HashSet<CommodityId> = HashSet::new();

        for record in &live_by_name {
            let Some(commodity) = self.resolver.find_commodity(&record.commodity) else {
                let prices = record.prices.lenient();
                analytics.new_commodities.push(NewCommodity {
                    commodity_id: None,
                    commodity: record.commodity.clone(),
                    current_price: prices.modal_price,
                    min_price: prices.min_price,
                    max_price: prices.max_price,
                    message: NEW_COMMODITY_MESSAGE,
                });
                continue;
            };
            seen_live.insert(commodity.id);

            let in_window = history.get(commodity.id);
            let entry = match in_window.first() {
                Some(latest) => updated_entry(commodity.id, record, latest, in_window.len()),
                None => match self.prices.latest(market, commodity.id) {
                    Some(prev) => updated_entry(commodity.id, record, &prev, 1),
                    None => new_entry(commodity.id, record),
                },
            };

            match entry.classification {
                CommodityClassification::PriceHike => analytics.price_hikes.push(entry.clone()),
                CommodityClassification::PriceDrop => analytics.price_drops.push(entry.clone()),
                CommodityClassification::Unchanged => {
                    analytics.unchanged_prices.push(entry.clone())
                }
                _ => {}
            }
            analytics.updated_today.push(entry);
        }

        for (commodity, entries) in history.iter() {
            if seen_live.contains(&commodity) {
                continue;
            }
            let name = self.commodity_name(commodity);
            match entries {
                [] => {}
                [only] => analytics.remaining_commodities.push(RemainingCommodity {
                    commodity_id: commodity,
                    commodity: name,
                    classification: CommodityClassification::NotUpdatedSingleEntry,
                    last_price: only.modal_price,
                    min_price: only.min_price,
                    max_price: only.max_price,
                    last_price_date: only.arrival_date,
                    entries_count: 1,
                    message: REMAINING_MESSAGE,
                }),
                [last, previous, ..] => {
                    let change = PriceMove::between(last.modal_price, previous.modal_price);
                    analytics.not_updated_today.push(StaleCommodity {
                        commodity_id: commodity,
                        commodity: name,
                        classification: CommodityClassification::NotUpdatedMultiEntry,
                        last_price: last.modal_price,
                        last_price_date: last.arrival_date,
                        entries_count: entries.len(),
                        previous_price: previous.modal_price,
                        previous_price_date: previous.arrival_date,
                        last_price_change: change.change,
                        last_price_change_percent: change.change_percent,
                        last_trend: change.trend,
                    });
                }
            }
        }

        analytics.highest_price = self.extreme(live, Ordering::Greater);
        analytics.lowest_price = self.extreme(live, Ordering::Less);
        analytics.all_unique_commodity = unique_commodities(&analytics);

        analytics
            .price_hikes
            .sort_by(|a, b| b.price_change_percent.cmp(&a.price_change_percent));
        analytics
            .price_drops
            .sort_by(|a, b| a.price_change_percent.cmp(&b.price_change_percent));

        let summary = &mut analytics.summary;
        summary.commodities_updated_today = analytics.updated_today.len();
        summary.commodities_not_updated_today = analytics.not_updated_today.len();
        summary.new_commodities_added_today = analytics.new_commodities.len();
        summary.remaining_commodities = analytics.remaining_commodities.len();
        summary.unique_commodities = live_by_name.len() + analytics.not_updated_today.len();

        debug!(
            market = %market,
            live = live.len(),
            history = history.total,
            hikes = analytics.price_hikes.len(),
            drops = analytics.price_drops.len(),
            "Market reconciled"
        );
        analytics
    }

    fn commodity_name(&self, id: CommodityId) -> String {
        self.resolver
            .commodity(id)
            .map(|c| c.name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Strict scan, so ties keep the first-seen record.
    fn extreme(&self, live: &[LiveRecord], wanted: Ordering) -> Option<PriceExtreme> {
        let mut best = live.first()?;
        for record in live {
            if record.modal_or_zero().cmp(&best.modal_or_zero()) == wanted {
                best = record;
            }
        }
        let prices = best.prices.lenient();
        Some(PriceExtreme {
            commodity_id: self.resolver.find_commodity(&best.commodity).map(|c| c.id),
            commodity: best.commodity.clone(),
            modal_price: prices.modal_price,
            min_price: prices.min_price,
            max_price: prices.max_price,
        })
    }
}

fn updated_entry(
    id: CommodityId,
    record: &LiveRecord,
    previous: &PriceObservation,
    historical_count: usize,
) -> UpdatedCommodity {
    let current = record.modal_or_zero();
    let change = PriceMove::between(current, previous.modal_price);
    UpdatedCommodity {
        commodity_id: id,
        commodity: record.commodity.clone(),
        classification: CommodityClassification::of(change.trend),
        current_price: current,
        min_price: None,
        max_price: None,
        last_price: Some(previous.modal_price),
        last_price_date: Some(previous.arrival_date),
        price_difference: change.change,
        price_change_percent: change.change_percent,
        trend: change.trend,
        historical_count,
    }
}

fn new_entry(id: CommodityId, record: &LiveRecord) -> UpdatedCommodity {
    let prices = record.prices.lenient();
    UpdatedCommodity {
        commodity_id: id,
        commodity: record.commodity.clone(),
        classification: CommodityClassification::UpdatedTodayNewEntry,
        current_price: prices.modal_price,
        min_price: Some(prices.min_price),
        max_price: Some(prices.max_price),
        last_price: None,
        last_price_date: None,
        price_difference: Decimal::ZERO,
        price_change_percent: Decimal::ZERO,
        trend: Trend::NewEntry,
        historical_count: 0,
    }
}

/// Deduplicate live records by commodity name, keeping source order.
fn first_seen_by_name(live: &[LiveRecord]) -> Vec<&LiveRecord> {
    let mut seen = HashSet::new();
    live.iter()
        .filter(|r| {
            let key = r.commodity.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            if key.is_empty() {
                debug!(market = %r.market, "Skipping live record without commodity name");
                return false;
            }
            seen.insert(key)
        })
        .collect()
}

fn unique_commodities(analytics: &MarketAnalytics) -> Vec<CommodityRef> {
    let mut seen = HashSet::new();
    let updated = analytics
        .updated_today
        .iter()
        .map(|e| (e.commodity_id, &e.commodity));
    let stale = analytics
        .not_updated_today
        .iter()
        .map(|e| (e.commodity_id, &e.commodity));
    let remaining = analytics
        .remaining_commodities
        .iter()
        .map(|e| (e.commodity_id, &e.commodity));

    updated
        .chain(stale)
        .chain(remaining)
        .filter(|(id, _)| seen.insert(*id))
        .map(|(id, name)| CommodityRef {
            commodity_id: id,
            commodity: name.clone(),
        })
        .collect()
}

/// History grouped by commodity, newest first within each group.
/// Groups keep the order in which commodities first appear.
struct HistoryGroups<'h> {
    order: Vec<CommodityId>,
    groups: HashMap<CommodityId, Vec<&'h PriceObservation>>,
    total: usize,
}

impl<'h> HistoryGroups<'h> {
    fn new(history: &'h [PriceObservation]) -> Self {
        let mut sorted: Vec<&PriceObservation> = history.iter().collect();
        sorted.sort_by(|a, b| b.arrival_date.cmp(&a.arrival_date));

        let mut order = Vec::new();
        let mut groups: HashMap<CommodityId, Vec<&PriceObservation>> = HashMap::new();
        for obs in sorted {
            groups
                .entry(obs.commodity)
                .or_insert_with(|| {
                    order.push(obs.commodity);
                    Vec::new()
                })
                .push(obs);
        }
        Self {
            order,
            groups,
            total: history.len(),
        }
    }

    fn get(&self, id: CommodityId) -> &[&'h PriceObservation] {
        self.groups.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn iter(&self) -> impl Iterator<Item = (CommodityId, &[&'h PriceObservation])> + '_ {
        self.order.iter().map(|id| (*id, self.get(*id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mandi_core::{GradeId, ParsedPriceFields, VarietyId};
    use mandi_persistence::InMemoryPriceStore;
    use mandi_registry::ReferenceStore;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    fn live(commodity: &str, modal: &str) -> LiveRecord {
        LiveRecord {
            state: "Gujarat".to_string(),
            district: "Rajkot".to_string(),
            market: "Gondal".to_string(),
            commodity: commodity.to_string(),
            variety: "Other".to_string(),
            grade: "FAQ".to_string(),
            commodity_code: None,
            arrival_date_raw: today().format("%d/%m/%Y").to_string(),
            arrival_date: Some(today()),
            prices: ParsedPriceFields::parse(Some("1000"), Some("3000"), Some(modal)),
        }
    }

    fn obs(commodity: CommodityId, days_ago: i64, modal: Decimal) -> PriceObservation {
        PriceObservation {
            market: MarketId(1),
            commodity,
            variety: VarietyId(1),
            grade: GradeId(1),
            arrival_date: today() - Duration::days(days_ago),
            min_price: Price::new(modal - dec!(100)),
            max_price: Price::new(modal + dec!(100)),
            modal_price: Price::new(modal),
        }
    }

    struct Fixture {
        refs: ReferenceStore,
        prices: InMemoryPriceStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                refs: ReferenceStore::new(),
                prices: InMemoryPriceStore::new(),
            }
        }

        fn commodity(&self, name: &str) -> CommodityId {
            self.refs.resolve_or_create_commodity(name, None).unwrap().id
        }

        fn run(&self, live: &[LiveRecord], history: &[PriceObservation]) -> MarketAnalytics {
            ReconciliationEngine::new(&self.refs, &self.prices).reconcile(
                MarketId(1),
                live,
                history,
            )
        }
    }

    #[test]
    fn test_price_hike_against_most_recent_in_window() {
        let fx = Fixture::new();
        let wheat = fx.commodity("Wheat");
        let history = vec![obs(wheat, 10, dec!(1950)), obs(wheat, 5, dec!(2000))];

        let analytics = fx.run(&[live("Wheat", "2100")], &history);

        let hike = &analytics.price_hikes[0];
        assert_eq!(hike.classification, CommodityClassification::PriceHike);
        assert_eq!(hike.price_difference, dec!(100));
        assert_eq!(hike.price_change_percent, dec!(5.00));
        assert_eq!(hike.trend, Trend::Up);
        assert_eq!(hike.historical_count, 2);
        assert_eq!(hike.last_price_date, Some(today() - Duration::days(5)));
        assert_eq!(analytics.updated_today.len(), 1);
        assert!(analytics.not_updated_today.is_empty());
    }

    #[test]
    fn test_hikes_and_drops_sorted_by_magnitude() {
        let fx = Fixture::new();
        let ids: Vec<_> = ["Wheat", "Cotton", "Onion", "Garlic"]
            .iter()
            .map(|n| fx.commodity(n))
            .collect();
        let history: Vec<_> = ids.iter().map(|id| obs(*id, 1, dec!(1000))).collect();

        let analytics = fx.run(
            &[
                live("Wheat", "1050"),
                live("Cotton", "1200"),
                live("Onion", "950"),
                live("Garlic", "700"),
            ],
            &history,
        );

        let hikes: Vec<_> = analytics.price_hikes.iter().map(|e| e.commodity.as_str()).collect();
        assert_eq!(hikes, vec!["Cotton", "Wheat"]);
        let drops: Vec<_> = analytics.price_drops.iter().map(|e| e.commodity.as_str()).collect();
        assert_eq!(drops, vec!["Garlic", "Onion"]);
        for pair in analytics.price_hikes.windows(2) {
            assert!(pair[0].price_change_percent >= pair[1].price_change_percent);
        }
        for entry in &analytics.price_drops {
            assert!(entry.price_difference < Decimal::ZERO);
        }
    }

    #[test]
    fn test_known_commodity_without_history_is_new_entry() {
        let fx = Fixture::new();
        fx.commodity("Sesamum");

        let analytics = fx.run(&[live("sesamum", "9000")], &[]);

        assert!(analytics.new_commodities.is_empty());
        let entry = &analytics.updated_today[0];
        assert_eq!(entry.classification, CommodityClassification::UpdatedTodayNewEntry);
        assert_eq!(entry.trend, Trend::NewEntry);
        assert_eq!(entry.price_difference, Decimal::ZERO);
        assert_eq!(entry.last_price, None);
        assert_eq!(entry.historical_count, 0);
        assert!(analytics.price_hikes.is_empty() && analytics.unchanged_prices.is_empty());
    }

    #[test]
    fn test_unknown_commodity_is_new_commodity() {
        let fx = Fixture::new();
        let analytics = fx.run(&[live("Dragon Fruit", "5000")], &[]);

        assert_eq!(analytics.new_commodities.len(), 1);
        assert_eq!(analytics.new_commodities[0].commodity_id, None);
        assert_eq!(analytics.new_commodities[0].message, NEW_COMMODITY_MESSAGE);
        assert!(analytics.updated_today.is_empty());
        assert_eq!(analytics.summary.new_commodities_added_today, 1);
        assert!(analytics.all_unique_commodity.is_empty());
    }

    #[test]
    fn test_falls_back_to_observation_outside_window() {
        let fx = Fixture::new();
        let groundnut = fx.commodity("Groundnut");
        fx.prices.upsert(obs(groundnut, 90, dec!(5000))).unwrap();

        let analytics = fx.run(&[live("Groundnut", "4500")], &[]);

        let drop = &analytics.price_drops[0];
        assert_eq!(drop.last_price, Some(Price::new(dec!(5000))));
        assert_eq!(drop.price_change_percent, dec!(-10.00));
        assert_eq!(drop.historical_count, 1);
    }

    #[test]
    fn test_single_entry_goes_to_remaining_only() {
        let fx = Fixture::new();
        let barley = fx.commodity("Barley");
        let history = vec![obs(barley, 25, dec!(1800))];

        let analytics = fx.run(&[], &history);

        assert_eq!(analytics.remaining_commodities.len(), 1);
        assert!(analytics.not_updated_today.is_empty());
        let entry = &analytics.remaining_commodities[0];
        assert_eq!(entry.commodity, "Barley");
        assert_eq!(entry.entries_count, 1);
        assert_eq!(entry.last_price_date, today() - Duration::days(25));
        assert_eq!(analytics.summary.unique_commodities, 0);
        assert_eq!(analytics.all_unique_commodity.len(), 1);

        let json = serde_json::to_value(entry).unwrap();
        assert!(json.get("lastTrend").is_none());
    }

    #[test]
    fn test_multi_entry_not_updated_compares_two_latest() {
        let fx = Fixture::new();
        let cumin = fx.commodity("Cumin");
        let history = vec![
            obs(cumin, 3, dec!(20000)),
            obs(cumin, 1, dec!(19000)),
            obs(cumin, 7, dec!(21000)),
        ];

        let analytics = fx.run(&[], &history);

        let stale = &analytics.not_updated_today[0];
        assert_eq!(stale.entries_count, 3);
        assert_eq!(stale.last_price, Price::new(dec!(19000)));
        assert_eq!(stale.previous_price, Price::new(dec!(20000)));
        assert_eq!(stale.last_price_change, dec!(-1000));
        assert_eq!(stale.last_price_change_percent, dec!(-5.00));
        assert_eq!(stale.last_trend, Trend::Down);
        assert!(analytics.remaining_commodities.is_empty());
        assert_eq!(analytics.summary.unique_commodities, 1);
    }

    #[test]
    fn test_duplicate_live_records_keep_first_seen() {
        let fx = Fixture::new();
        let wheat = fx.commodity("Wheat");
        let history = vec![obs(wheat, 2, dec!(2000))];

        let analytics = fx.run(&[live("Wheat", "2200"), live("WHEAT", "1800")], &history);

        assert_eq!(analytics.updated_today.len(), 1);
        assert_eq!(analytics.updated_today[0].current_price, Price::new(dec!(2200)));
        assert_eq!(analytics.summary.total_live_records, 2);
        assert_eq!(analytics.summary.unique_commodities, 1);
    }

    #[test]
    fn test_highest_and_lowest_ties_keep_first() {
        let fx = Fixture::new();
        let cotton = fx.commodity("Cotton");

        let analytics = fx.run(
            &[
                live("Cotton", "7000"),
                live("Onion", "300"),
                live("Kapas", "7000"),
                live("Potato", "300"),
            ],
            &[],
        );

        let highest = analytics.highest_price.unwrap();
        assert_eq!(highest.commodity, "Cotton");
        assert_eq!(highest.commodity_id, Some(cotton));
        let lowest = analytics.lowest_price.unwrap();
        assert_eq!(lowest.commodity, "Onion");
        assert_eq!(lowest.commodity_id, None);
    }

    #[test]
    fn test_empty_inputs() {
        let fx = Fixture::new();
        let analytics = fx.run(&[], &[]);
        assert!(analytics.highest_price.is_none());
        assert_eq!(analytics.summary, AnalyticsSummary::default());
    }
}
