//! Price alert storage.
//!
//! The store enforces the slot rule (one alert per owner, market, commodity
//! and direction) under a single write lock, so two racing creates cannot
//! both succeed. Deletion is idempotent.

use crate::error::{PersistenceError, PersistenceResult};
use crate::journal::JsonLinesJournal;
use mandi_core::{AlertId, CommodityId, DistrictId, MarketId, OwnerId, PriceAlert};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Owner-side listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub is_active: Option<bool>,
    pub market: Option<MarketId>,
    pub commodity: Option<CommodityId>,
}

impl AlertFilter {
    fn matches(&self, alert: &PriceAlert) -> bool {
        self.is_active.map_or(true, |a| alert.is_active == a)
            && self.market.map_or(true, |m| alert.market == m)
            && self.commodity.map_or(true, |c| alert.commodity == c)
    }
}

/// Alert persistence.
pub trait AlertStore: Send + Sync {
    /// Insert a new alert. Fails with `SlotTaken` if its slot is occupied.
    fn insert(&self, alert: PriceAlert) -> PersistenceResult<()>;

    /// Replace a stored alert. Returns `false` if it no longer exists.
    ///
    /// Fails with `SlotTaken` if the new direction collides with another alert.
    fn update(&self, alert: PriceAlert) -> PersistenceResult<bool>;

    fn get(&self, id: AlertId) -> Option<PriceAlert>;

    /// Alerts of one owner, newest first.
    fn list_for_owner(&self, owner: &OwnerId, filter: &AlertFilter) -> Vec<PriceAlert>;

    /// Active alerts for a (district, market, commodity) triple, oldest first.
    fn active_for(
        &self,
        district: DistrictId,
        market: MarketId,
        commodity: CommodityId,
    ) -> Vec<PriceAlert>;

    /// Delete alerts; IDs that are already gone are ignored. Returns how many were removed.
    fn delete_many(&self, ids: &[AlertId]) -> PersistenceResult<usize>;
}

/// Journal entry for alert mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum AlertJournalEntry {
    Put { alert: PriceAlert },
    Delete { id: AlertId },
}

/// In-memory alert store, optionally journaled.
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<AlertId, PriceAlert>>,
    journal: Option<Mutex<JsonLinesJournal<AlertJournalEntry>>>,
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAlertStore {
    /// Memory-only store.
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    /// Store backed by a journal. Deletions are tombstones, so retired alerts stay retired.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let mut alerts = HashMap::new();
        for entry in JsonLinesJournal::<AlertJournalEntry>::replay(path)? {
            match entry {
                AlertJournalEntry::Put { alert } => {
                    alerts.insert(alert.id, alert);
                }
                AlertJournalEntry::Delete { id } => {
                    alerts.remove(&id);
                }
            }
        }
        info!(alerts = alerts.len(), "Alert store loaded");

        Ok(Self {
            alerts: RwLock::new(alerts),
            journal: Some(Mutex::new(JsonLinesJournal::open(path)?)),
        })
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    fn record(&self, entry: &AlertJournalEntry) -> PersistenceResult<()> {
        if let Some(journal) = &self.journal {
            journal.lock().append(entry)?;
        }
        Ok(())
    }

    fn slot_holder(
        alerts: &HashMap<AlertId, PriceAlert>,
        candidate: &PriceAlert,
    ) -> Option<AlertId> {
        alerts
            .values()
            .find(|a| {
                a.id != candidate.id
                    && a.occupies_slot(
                        &candidate.owner,
                        candidate.market,
                        candidate.commodity,
                        candidate.direction,
                    )
            })
            .map(|a| a.id)
    }
}

impl AlertStore for InMemoryAlertStore {
    fn insert(&self, alert: PriceAlert) -> PersistenceResult<()> {
        let mut alerts = self.alerts.write();
        if let Some(existing) = Self::slot_holder(&alerts, &alert) {
            return Err(PersistenceError::SlotTaken(existing));
        }
        self.record(&AlertJournalEntry::Put {
            alert: alert.clone(),
        })?;
        alerts.insert(alert.id, alert);
        Ok(())
    }

    fn update(&self, alert: PriceAlert) -> PersistenceResult<bool> {
        let mut alerts = self.alerts.write();
        if !alerts.contains_key(&alert.id) {
            return Ok(false);
        }
        if let Some(existing) = Self::slot_holder(&alerts, &alert) {
            return Err(PersistenceError::SlotTaken(existing));
        }
        self.record(&AlertJournalEntry::Put {
            alert: alert.clone(),
        })?;
        alerts.insert(alert.id, alert);
        Ok(true)
    }

    fn get(&self, id: AlertId) -> Option<PriceAlert> {
        self.alerts.read().get(&id).cloned()
    }

    fn list_for_owner(&self, owner: &OwnerId, filter: &AlertFilter) -> Vec<PriceAlert> {
        let mut found: Vec<_> = self
            .alerts
            .read()
            .values()
            .filter(|a| &a.owner == owner && filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    fn active_for(
        &self,
        district: DistrictId,
        market: MarketId,
        commodity: CommodityId,
    ) -> Vec<PriceAlert> {
        let mut found: Vec<_> = self
            .alerts
            .read()
            .values()
            .filter(|a| {
                a.is_active
                    && a.district == district
                    && a.market == market
                    && a.commodity == commodity
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found
    }

    fn delete_many(&self, ids: &[AlertId]) -> PersistenceResult<usize> {
        let mut alerts = self.alerts.write();
        let removed: Vec<AlertId> = ids
            .iter()
            .filter(|id| alerts.remove(*id).is_some())
            .copied()
            .collect();
        drop(alerts);

        // Every id is gone from memory before any tombstone is written.
        let mut first_error = None;
        for id in &removed {
            if let Err(e) = self.record(&AlertJournalEntry::Delete { id: *id }) {
                warn!(%id, ?e, "Failed to journal alert deletion");
                first_error.get_or_insert(e);
            }
        }

        debug!(requested = ids.len(), removed = removed.len(), "Deleted alerts");
        match first_error {
            None => Ok(removed.len()),
            Some(source) => Err(PersistenceError::Unjournaled {
                removed: removed.len(),
                source: Box::new(source),
            }),
        }
    }
}
