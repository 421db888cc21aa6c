//! Historical price observations.

use crate::error::PersistenceResult;
use crate::journal::JsonLinesJournal;
use chrono::NaiveDate;
use dashmap::DashMap;
use mandi_core::{CommodityId, GradeId, MarketId, PriceObservation, VarietyId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Read/write access to stored observations.
pub trait PriceRepository: Send + Sync {
    /// Insert or correct the observation for its (market, commodity, variety, grade, date) key.
    fn upsert(&self, observation: PriceObservation) -> PersistenceResult<UpsertOutcome>;

    /// Observations of a market with `from <= arrival_date < until`, newest first.
    ///
    /// `commodity` narrows the result to one commodity.
    fn range(
        &self,
        market: MarketId,
        commodity: Option<CommodityId>,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<PriceObservation>;

    /// Most recent observation ever recorded for (market, commodity).
    fn latest(&self, market: MarketId, commodity: CommodityId) -> Option<PriceObservation>;

    /// Total number of stored observations.
    fn count(&self) -> usize;

    /// Most recent arrival date across all markets.
    fn latest_date(&self) -> Option<NaiveDate>;
}

/// Sort key inside one market: date first so reverse iteration is newest first.
type MarketKey = (NaiveDate, CommodityId, VarietyId, GradeId);

fn market_key(o: &PriceObservation) -> MarketKey {
    (o.arrival_date, o.commodity, o.variety, o.grade)
}

/// In-memory observation store, optionally journaled.
pub struct InMemoryPriceStore {
    markets: DashMap<MarketId, BTreeMap<MarketKey, PriceObservation>>,
    journal: Option<Mutex<JsonLinesJournal<PriceObservation>>>,
}

impl Default for InMemoryPriceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPriceStore {
    /// Memory-only store.
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
            journal: None,
        }
    }

    /// Store backed by a journal; existing entries are replayed (last write wins).
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let store = Self::new();
        let entries = JsonLinesJournal::<PriceObservation>::replay(path)?;
        for observation in entries {
            store.apply(observation);
        }
        info!(observations = store.count(), "Price store loaded");

        Ok(Self {
            markets: store.markets,
            journal: Some(Mutex::new(JsonLinesJournal::open(path)?)),
        })
    }

    fn apply(&self, observation: PriceObservation) -> UpsertOutcome {
        let mut market = self.markets.entry(observation.market).or_default();
        match market.insert(market_key(&observation), observation.clone()) {
            None => UpsertOutcome::Created,
            Some(previous) if previous == observation => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        }
    }
}

impl PriceRepository for InMemoryPriceStore {
    fn upsert(&self, observation: PriceObservation) -> PersistenceResult<UpsertOutcome> {
        if let Some(journal) = &self.journal {
            let unchanged = self
                .markets
                .get(&observation.market)
                .and_then(|m| m.get(&market_key(&observation)).map(|o| o == &observation))
                .unwrap_or(false);
            if unchanged {
                return Ok(UpsertOutcome::Unchanged);
            }
            journal.lock().append(&observation)?;
        }
        Ok(self.apply(observation))
    }

    fn range(
        &self,
        market: MarketId,
        commodity: Option<CommodityId>,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<PriceObservation> {
        let Some(entries) = self.markets.get(&market) else {
            return Vec::new();
        };
        if from >= until {
            return Vec::new();
        }
        let lower = (from, CommodityId(0), VarietyId(0), GradeId(0));
        let upper = (until, CommodityId(0), VarietyId(0), GradeId(0));
        entries
            .range(lower..upper)
            .rev()
            .map(|(_, o)| o)
            .filter(|o| commodity.map_or(true, |c| o.commodity == c))
            .cloned()
            .collect()
    }

    fn latest(&self, market: MarketId, commodity: CommodityId) -> Option<PriceObservation> {
        self.markets.get(&market).and_then(|entries| {
            entries
                .values()
                .rev()
                .find(|o| o.commodity == commodity)
                .cloned()
        })
    }

    fn count(&self) -> usize {
        self.markets.iter().map(|m| m.len()).sum()
    }

    fn latest_date(&self) -> Option<NaiveDate> {
        self.markets
            .iter()
            .filter_map(|m| m.keys().next_back().map(|k| k.0))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandi_core::Price;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn obs(market: u64, commodity: u64, day: u32, modal: rust_decimal::Decimal) -> PriceObservation {
        PriceObservation {
            market: MarketId(market),
            commodity: CommodityId(commodity),
            variety: VarietyId(1),
            grade: GradeId(1),
            arrival_date: date(day),
            min_price: Price::new(modal - dec!(100)),
            max_price: Price::new(modal + dec!(100)),
            modal_price: Price::new(modal),
        }
    }

    #[test]
    fn test_upsert_outcomes() {
        let store = InMemoryPriceStore::new();
        assert_eq!(store.upsert(obs(1, 1, 5, dec!(2000))).unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert(obs(1, 1, 5, dec!(2000))).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.upsert(obs(1, 1, 5, dec!(2050))).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_range_half_open_newest_first() {
        let store = InMemoryPriceStore::new();
        for day in [1, 5, 10, 15] {
            store.upsert(obs(1, 1, day, dec!(2000))).unwrap();
        }
        store.upsert(obs(1, 2, 12, dec!(500))).unwrap();
        store.upsert(obs(2, 1, 12, dec!(900))).unwrap();

        let found = store.range(MarketId(1), None, date(5), date(15));
        let days: Vec<_> = found.iter().map(|o| o.arrival_date).collect();
        assert_eq!(days, vec![date(12), date(10), date(5)]);

        let wheat = store.range(MarketId(1), Some(CommodityId(1)), date(1), date(16));
        assert_eq!(wheat.len(), 4);
        assert_eq!(wheat[0].arrival_date, date(15));
    }

    #[test]
    fn test_latest() {
        let store = InMemoryPriceStore::new();
        store.upsert(obs(1, 1, 3, dec!(1800))).unwrap();
        store.upsert(obs(1, 1, 9, dec!(1900))).unwrap();
        store.upsert(obs(1, 2, 20, dec!(100))).unwrap();

        let latest = store.latest(MarketId(1), CommodityId(1)).unwrap();
        assert_eq!(latest.modal_price, Price::new(dec!(1900)));
        assert!(store.latest(MarketId(1), CommodityId(3)).is_none());
        assert_eq!(store.latest_date(), Some(date(20)));
    }

    #[test]
    fn test_journal_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.jsonl");
        {
            let store = InMemoryPriceStore::open(&path).unwrap();
            store.upsert(obs(1, 1, 5, dec!(2000))).unwrap();
            store.upsert(obs(1, 1, 5, dec!(2100))).unwrap();
            store.upsert(obs(1, 1, 6, dec!(2200))).unwrap();
        }

        let store = InMemoryPriceStore::open(&path).unwrap();
        assert_eq!(store.count(), 2);
        let corrected = store.range(MarketId(1), None, date(5), date(6));
        assert_eq!(corrected[0].modal_price, Price::new(dec!(2100)));
    }
}
