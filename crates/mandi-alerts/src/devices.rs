//! Owner → push token registry.

use dashmap::DashMap;
use mandi_core::OwnerId;
use mandi_persistence::{JsonLinesJournal, PersistenceResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Where to deliver an owner's notifications.
///
/// An owner without a token has no endpoint; their fired alerts are retired
/// without a delivery attempt.
pub trait DeviceDirectory: Send + Sync {
    fn token_for(&self, owner: &OwnerId) -> Option<String>;

    /// Register or replace the owner's token.
    fn register(&self, owner: OwnerId, token: String) -> PersistenceResult<()>;

    /// Returns whether a token was registered.
    fn remove(&self, owner: &OwnerId) -> PersistenceResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DeviceJournalEntry {
    Register { owner: OwnerId, token: String },
    Remove { owner: OwnerId },
}

#[derive(Default)]
pub struct InMemoryDeviceDirectory {
    tokens: DashMap<OwnerId, String>,
    journal: Option<Mutex<JsonLinesJournal<DeviceJournalEntry>>>,
}

impl InMemoryDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the journal at `path`, then keep appending to it.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let tokens = DashMap::new();
        for entry in JsonLinesJournal::<DeviceJournalEntry>::replay(&path)? {
            match entry {
                DeviceJournalEntry::Register { owner, token } => {
                    tokens.insert(owner, token);
                }
                DeviceJournalEntry::Remove { owner } => {
                    tokens.remove(&owner);
                }
            }
        }
        Ok(Self {
            tokens,
            journal: Some(Mutex::new(JsonLinesJournal::open(path)?)),
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn record(&self, entry: &DeviceJournalEntry) -> PersistenceResult<()> {
        match &self.journal {
            Some(journal) => journal.lock().append(entry),
            None => Ok(()),
        }
    }
}

impl DeviceDirectory for InMemoryDeviceDirectory {
    fn token_for(&self, owner: &OwnerId) -> Option<String> {
        self.tokens.get(owner).map(|t| t.value().clone())
    }

    fn register(&self, owner: OwnerId, token: String) -> PersistenceResult<()> {
        self.record(&DeviceJournalEntry::Register {
            owner: owner.clone(),
            token: token.clone(),
        })?;
        debug!(%owner, "Registered device token");
        self.tokens.insert(owner, token);
        Ok(())
    }

    fn remove(&self, owner: &OwnerId) -> PersistenceResult<bool> {
        if !self.tokens.contains_key(owner) {
            return Ok(false);
        }
        self.record(&DeviceJournalEntry::Remove {
            owner: owner.clone(),
        })?;
        Ok(self.tokens.remove(owner).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_replaces_token() {
        let devices = InMemoryDeviceDirectory::new();
        let owner = OwnerId::new("farmer-1");
        devices.register(owner.clone(), "a".to_string()).unwrap();
        devices.register(owner.clone(), "b".to_string()).unwrap();
        assert_eq!(devices.token_for(&owner).as_deref(), Some("b"));
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn test_remove() {
        let devices = InMemoryDeviceDirectory::new();
        let owner = OwnerId::new("farmer-1");
        assert!(!devices.remove(&owner).unwrap());
        devices.register(owner.clone(), "a".to_string()).unwrap();
        assert!(devices.remove(&owner).unwrap());
        assert!(devices.token_for(&owner).is_none());
    }

    #[test]
    fn test_journal_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devices.jsonl");
        {
            let devices = InMemoryDeviceDirectory::open(&path).unwrap();
            devices.register(OwnerId::new("a"), "token-a".to_string()).unwrap();
            devices.register(OwnerId::new("b"), "token-b".to_string()).unwrap();
            devices.remove(&OwnerId::new("a")).unwrap();
        }
        let reopened = InMemoryDeviceDirectory::open(&path).unwrap();
        assert!(reopened.token_for(&OwnerId::new("a")).is_none());
        assert_eq!(
            reopened.token_for(&OwnerId::new("b")).as_deref(),
            Some("token-b")
        );
    }
}
