//! Reference dictionaries and name resolution.
//!
//! Lookups are case-insensitive and whitespace-normalized. `find_*` never
//! writes; `resolve_or_create_*` is the only path that adds entities, and it
//! is only used by ingestion.

use crate::entity::{
    name_key, Commodity, District, EntityCounts, Grade, Market, MarketDirectoryEntry,
    MarketFilter, NamedRef, State, Variety,
};
use crate::error::{RegistryError, RegistryResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mandi_core::{CommodityId, DistrictId, GradeId, MarketId, StateId, VarietyId};
use mandi_persistence::JsonLinesJournal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Name resolution and auto-vivification of reference entities.
pub trait EntityResolver: Send + Sync {
    fn state(&self, id: StateId) -> Option<State>;
    fn district(&self, id: DistrictId) -> Option<District>;
    fn market(&self, id: MarketId) -> Option<Market>;
    fn commodity(&self, id: CommodityId) -> Option<Commodity>;
    fn variety(&self, id: VarietyId) -> Option<Variety>;
    fn grade(&self, id: GradeId) -> Option<Grade>;

    /// District by name in any state; the oldest match wins.
    fn find_district(&self, name: &str) -> Option<District>;
    fn find_market(&self, district: DistrictId, name: &str) -> Option<Market>;
    fn find_commodity(&self, name: &str) -> Option<Commodity>;
    fn find_variety(&self, name: &str) -> Option<Variety>;
    fn find_grade(&self, name: &str) -> Option<Grade>;

    fn resolve_or_create_state(&self, name: &str) -> RegistryResult<State>;
    fn resolve_or_create_district(&self, state: StateId, name: &str) -> RegistryResult<District>;
    fn resolve_or_create_market(&self, district: DistrictId, name: &str) -> RegistryResult<Market>;
    fn resolve_or_create_commodity(
        &self,
        name: &str,
        code: Option<&str>,
    ) -> RegistryResult<Commodity>;
    fn resolve_or_create_variety(&self, name: &str) -> RegistryResult<Variety>;
    fn resolve_or_create_grade(&self, name: &str) -> RegistryResult<Grade>;

    /// Markets with their location, sorted by name.
    fn list_markets(&self, filter: &MarketFilter) -> Vec<MarketDirectoryEntry>;

    /// One market with its district and state names.
    fn market_entry(&self, id: MarketId) -> Option<MarketDirectoryEntry> {
        let market = self.market(id)?;
        let district = self.district(market.district)?;
        let state = self.state(market.state)?;
        Some(MarketDirectoryEntry {
            id: market.id,
            name: market.name,
            district: NamedRef {
                id: district.id,
                name: district.name,
            },
            state: NamedRef {
                id: state.id,
                name: state.name,
            },
        })
    }

    fn counts(&self) -> EntityCounts;
}

/// One dictionary: entities by ID plus a (scope, normalized name) index.
struct Dictionary<S, I, E> {
    by_id: DashMap<I, E>,
    by_name: DashMap<(S, String), I>,
    next: AtomicU64,
}

impl<S, I, E> Dictionary<S, I, E>
where
    S: Eq + Hash + Copy,
    I: Eq + Hash + Copy,
    E: Clone,
{
    fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            next: AtomicU64::new(0),
        }
    }

    fn get(&self, id: I) -> Option<E> {
        self.by_id.get(&id).map(|e| e.clone())
    }

    fn find(&self, scope: S, name: &str) -> Option<E> {
        let id = *self.by_name.get(&(scope, name_key(name)))?;
        self.get(id)
    }

    /// Returns the entity and whether it was created by this call.
    fn get_or_create(
        &self,
        kind: &'static str,
        scope: S,
        name: &str,
        new_id: fn(u64) -> I,
        make: impl FnOnce(I, String) -> E,
    ) -> RegistryResult<(E, bool)> {
        let display = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if display.is_empty() {
            return Err(RegistryError::EmptyName(kind));
        }

        let id = match self.by_name.entry((scope, display.to_lowercase())) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = new_id(self.next.fetch_add(1, Ordering::Relaxed) + 1);
                let entity = make(id, display);
                self.by_id.insert(id, entity.clone());
                v.insert(id);
                return Ok((entity, true));
            }
        };

        self.get(id)
            .map(|e| (e, false))
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                id: display,
            })
    }

    /// Re-insert a replayed entity and keep the ID counter ahead of it.
    fn restore(&self, scope: S, name: &str, raw_id: u64, id: I, entity: E) {
        self.by_name.insert((scope, name_key(name)), id);
        self.by_id.insert(id, entity);
        self.next.fetch_max(raw_id, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Journal entry for created entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EntityRecord {
    State(State),
    District(District),
    Market(Market),
    Commodity(Commodity),
    Variety(Variety),
    Grade(Grade),
}

/// DashMap-backed reference dictionaries, optionally journaled.
pub struct ReferenceStore {
    states: Dictionary<(), StateId, State>,
    districts: Dictionary<StateId, DistrictId, District>,
    markets: Dictionary<DistrictId, MarketId, Market>,
    commodities: Dictionary<(), CommodityId, Commodity>,
    varieties: Dictionary<(), VarietyId, Variety>,
    grades: Dictionary<(), GradeId, Grade>,
    journal: Option<Mutex<JsonLinesJournal<EntityRecord>>>,
}

impl Default for ReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceStore {
    /// Memory-only store.
    pub fn new() -> Self {
        Self {
            states: Dictionary::new(),
            districts: Dictionary::new(),
            markets: Dictionary::new(),
            commodities: Dictionary::new(),
            varieties: Dictionary::new(),
            grades: Dictionary::new(),
            journal: None,
        }
    }

    /// Store backed by a journal of created entities.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let mut store = Self::new();
        for record in JsonLinesJournal::<EntityRecord>::replay(path)? {
            store.restore(record);
        }
        info!(counts = ?store.counts(), "Reference store loaded");
        store.journal = Some(Mutex::new(JsonLinesJournal::open(path)?));
        Ok(store)
    }

    fn restore(&self, record: EntityRecord) {
        match record {
            EntityRecord::State(s) => self.states.restore((), &s.name.clone(), s.id.0, s.id, s),
            EntityRecord::District(d) => {
                self.districts
                    .restore(d.state, &d.name.clone(), d.id.0, d.id, d)
            }
            EntityRecord::Market(m) => {
                self.markets
                    .restore(m.district, &m.name.clone(), m.id.0, m.id, m)
            }
            EntityRecord::Commodity(c) => {
                self.commodities
                    .restore((), &c.name.clone(), c.id.0, c.id, c)
            }
            EntityRecord::Variety(v) => self.varieties.restore((), &v.name.clone(), v.id.0, v.id, v),
            EntityRecord::Grade(g) => self.grades.restore((), &g.name.clone(), g.id.0, g.id, g),
        }
    }

    fn record_created(&self, record: EntityRecord) -> RegistryResult<()> {
        debug!(?record, "Created reference entity");
        if let Some(journal) = &self.journal {
            journal.lock().append(&record)?;
        }
        Ok(())
    }
}

impl EntityResolver for ReferenceStore {
    fn state(&self, id: StateId) -> Option<State> {
        self.states.get(id)
    }

    fn district(&self, id: DistrictId) -> Option<District> {
        self.districts.get(id)
    }

    fn market(&self, id: MarketId) -> Option<Market> {
        self.markets.get(id)
    }

    fn commodity(&self, id: CommodityId) -> Option<Commodity> {
        self.commodities.get(id)
    }

    fn variety(&self, id: VarietyId) -> Option<Variety> {
        self.varieties.get(id)
    }

    fn grade(&self, id: GradeId) -> Option<Grade> {
        self.grades.get(id)
    }

    fn find_district(&self, name: &str) -> Option<District> {
        let key = name_key(name);
        self.districts
            .by_id
            .iter()
            .filter(|d| name_key(&d.name) == key)
            .min_by_key(|d| d.id)
            .map(|d| d.clone())
    }

    fn find_market(&self, district: DistrictId, name: &str) -> Option<Market> {
        self.markets.find(district, name)
    }

    fn find_commodity(&self, name: &str) -> Option<Commodity> {
        self.commodities.find((), name)
    }

    fn find_variety(&self, name: &str) -> Option<Variety> {
        self.varieties.find((), name)
    }

    fn find_grade(&self, name: &str) -> Option<Grade> {
        self.grades.find((), name)
    }

    fn resolve_or_create_state(&self, name: &str) -> RegistryResult<State> {
        let (state, created) =
            self.states
                .get_or_create("state", (), name, StateId::new, |id, name| State { id, name })?;
        if created {
            self.record_created(EntityRecord::State(state.clone()))?;
        }
        Ok(state)
    }

    fn resolve_or_create_district(&self, state: StateId, name: &str) -> RegistryResult<District> {
        let (district, created) =
            self.districts
                .get_or_create("district", state, name, DistrictId::new, |id, name| District {
                    id,
                    name,
                    state,
                })?;
        if created {
            self.record_created(EntityRecord::District(district.clone()))?;
        }
        Ok(district)
    }

    fn resolve_or_create_market(&self, district: DistrictId, name: &str) -> RegistryResult<Market> {
        let parent = self.districts.get(district).ok_or(RegistryError::NotFound {
            kind: "district",
            id: district.to_string(),
        })?;
        let (market, created) =
            self.markets
                .get_or_create("market", district, name, MarketId::new, |id, name| Market {
                    id,
                    name,
                    district,
                    state: parent.state,
                })?;
        if created {
            self.record_created(EntityRecord::Market(market.clone()))?;
        }
        Ok(market)
    }

    fn resolve_or_create_commodity(
        &self,
        name: &str,
        code: Option<&str>,
    ) -> RegistryResult<Commodity> {
        let code = code.map(str::to_string);
        let (commodity, created) = self.commodities.get_or_create(
            "commodity",
            (),
            name,
            CommodityId::new,
            |id, name| Commodity { id, name, code },
        )?;
        if created {
            self.record_created(EntityRecord::Commodity(commodity.clone()))?;
        }
        Ok(commodity)
    }

    fn resolve_or_create_variety(&self, name: &str) -> RegistryResult<Variety> {
        let (variety, created) =
            self.varieties
                .get_or_create("variety", (), name, VarietyId::new, |id, name| Variety {
                    id,
                    name,
                })?;
        if created {
            self.record_created(EntityRecord::Variety(variety.clone()))?;
        }
        Ok(variety)
    }

    fn resolve_or_create_grade(&self, name: &str) -> RegistryResult<Grade> {
        let (grade, created) =
            self.grades
                .get_or_create("grade", (), name, GradeId::new, |id, name| Grade { id, name })?;
        if created {
            self.record_created(EntityRecord::Grade(grade.clone()))?;
        }
        Ok(grade)
    }

    fn list_markets(&self, filter: &MarketFilter) -> Vec<MarketDirectoryEntry> {
        let mut entries: Vec<_> = self
            .markets
            .by_id
            .iter()
            .filter_map(|m| {
                let district = self.districts.get(m.district)?;
                let state = self.states.get(m.state)?;
                filter
                    .matches(&state.name, &district.name)
                    .then(|| MarketDirectoryEntry {
                        id: m.id,
                        name: m.name.clone(),
                        district: NamedRef {
                            id: district.id,
                            name: district.name,
                        },
                        state: NamedRef {
                            id: state.id,
                            name: state.name,
                        },
                    })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        entries
    }

    fn counts(&self) -> EntityCounts {
        EntityCounts {
            states: self.states.len(),
            districts: self.districts.len(),
            markets: self.markets.len(),
            commodities: self.commodities.len(),
            varieties: self.varieties.len(),
            grades: self.grades.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded() -> (ReferenceStore, District, Market) {
        let store = ReferenceStore::new();
        let state = store.resolve_or_create_state("Gujarat").unwrap();
        let district = store.resolve_or_create_district(state.id, "Rajkot").unwrap();
        let market = store.resolve_or_create_market(district.id, "Gondal").unwrap();
        (store, district, market)
    }

    #[test]
    fn test_resolve_or_create_is_idempotent() {
        let store = ReferenceStore::new();
        let a = store.resolve_or_create_commodity("Wheat", None).unwrap();
        let b = store.resolve_or_create_commodity("  WHEAT ", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.counts().commodities, 1);
    }

    #[test]
    fn test_find_never_creates() {
        let store = ReferenceStore::new();
        assert!(store.find_commodity("Wheat").is_none());
        assert_eq!(store.counts(), EntityCounts::default());
    }

    #[test]
    fn test_market_scoped_to_district() {
        let (store, district, market) = seeded();
        assert_eq!(store.find_market(district.id, "gondal"), Some(market.clone()));

        let other = store
            .resolve_or_create_district(district.state, "Amreli")
            .unwrap();
        assert!(store.find_market(other.id, "Gondal").is_none());
        assert_eq!(market.state, district.state);
    }

    #[test]
    fn test_find_district_case_insensitive() {
        let (store, district, _) = seeded();
        assert_eq!(store.find_district("RAJKOT"), Some(district));
        assert!(store.find_district("Surat").is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = ReferenceStore::new();
        assert!(matches!(
            store.resolve_or_create_grade("   "),
            Err(RegistryError::EmptyName("grade"))
        ));
    }

    #[test]
    fn test_list_markets_filtered() {
        let (store, _, _) = seeded();
        let punjab = store.resolve_or_create_state("Punjab").unwrap();
        let ludhiana = store.resolve_or_create_district(punjab.id, "Ludhiana").unwrap();
        store.resolve_or_create_market(ludhiana.id, "Khanna").unwrap();

        assert_eq!(store.list_markets(&MarketFilter::default()).len(), 2);
        let gujarat = store.list_markets(&MarketFilter {
            state: Some("gujarat".to_string()),
            district: None,
        });
        assert_eq!(gujarat.len(), 1);
        assert_eq!(gujarat[0].name, "Gondal");
        assert_eq!(gujarat[0].district.name, "Rajkot");
    }

    #[test]
    fn test_market_entry() {
        let (store, _, _) = seeded();
        let gondal = store.list_markets(&MarketFilter::default())[0].id;
        let entry = store.market_entry(gondal).unwrap();
        assert_eq!(entry.name, "Gondal");
        assert_eq!(entry.state.name, "Gujarat");
        assert!(store.market_entry(MarketId(999)).is_none());
    }

    #[test]
    fn test_journal_replay_keeps_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.jsonl");
        let wheat_id;
        {
            let store = ReferenceStore::open(&path).unwrap();
            store.resolve_or_create_commodity("Onion", None).unwrap();
            wheat_id = store.resolve_or_create_commodity("Wheat", Some("1")).unwrap().id;
        }

        let store = ReferenceStore::open(&path).unwrap();
        let wheat = store.find_commodity("wheat").unwrap();
        assert_eq!(wheat.id, wheat_id);
        assert_eq!(wheat.code.as_deref(), Some("1"));

        // new IDs continue after the replayed ones
        let rice = store.resolve_or_create_commodity("Rice", None).unwrap();
        assert!(rice.id > wheat_id);
    }
}
