//! Archive synchronisation: fetch one day of upstream records and ingest them.

use crate::entity::EntityCounts;
use crate::error::RegistryResult;
use crate::ingest::{IngestSummary, PriceIngestor};
use crate::reference::EntityResolver;
use chrono::{Duration, NaiveDate};
use mandi_feed::LiveFeedClient;
use mandi_persistence::PriceRepository;
use mandi_telemetry::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Result of syncing one date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub state: String,
    pub date: NaiveDate,
    pub fetched: usize,
    pub summary: IngestSummary,
}

/// Store-wide sync status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub observations: usize,
    pub latest_arrival_date: Option<NaiveDate>,
    pub entities: EntityCounts,
}

/// Fetches archive days from the feed and ingests them.
pub struct SyncService {
    feed: Arc<dyn LiveFeedClient>,
    ingestor: PriceIngestor,
    resolver: Arc<dyn EntityResolver>,
    prices: Arc<dyn PriceRepository>,
    default_state: String,
}

impl SyncService {
    pub fn new(
        feed: Arc<dyn LiveFeedClient>,
        resolver: Arc<dyn EntityResolver>,
        prices: Arc<dyn PriceRepository>,
        default_state: impl Into<String>,
    ) -> Self {
        Self {
            feed,
            ingestor: PriceIngestor::new(resolver.clone(), prices.clone()),
            resolver,
            prices,
            default_state: default_state.into(),
        }
    }

    pub fn default_state(&self) -> &str {
        &self.default_state
    }

    /// Sync one date for a state (the configured state when `None`).
    pub async fn sync_date(
        &self,
        date: NaiveDate,
        state: Option<String>,
    ) -> RegistryResult<SyncReport> {
        let state = state.unwrap_or_else(|| self.default_state.clone());
        let records = self.feed.fetch_daily(state.clone(), date).await?;
        let fetched = records.len();
        info!(%state, %date, fetched, "Syncing archive day");

        let summary = self.ingestor.ingest(&records);
        Metrics::ingested(summary.created, summary.updated, summary.errors);
        Ok(SyncReport {
            state,
            date,
            fetched,
            summary,
        })
    }

    /// Sync the day before `today`.
    pub async fn sync_yesterday(&self, today: NaiveDate) -> RegistryResult<SyncReport> {
        self.sync_date(today - Duration::days(1), None).await
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            observations: self.prices.count(),
            latest_arrival_date: self.prices.latest_date(),
            entities: self.resolver.counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::reference::ReferenceStore;
    use mandi_core::{LiveRecord, ParsedPriceFields};
    use mandi_feed::MockFeedClient;
    use mandi_persistence::InMemoryPriceStore;

    fn record(date: NaiveDate) -> LiveRecord {
        LiveRecord {
            state: "Gujarat".to_string(),
            district: "Amreli".to_string(),
            market: "Amreli".to_string(),
            commodity: "Cotton".to_string(),
            variety: "Other".to_string(),
            grade: "FAQ".to_string(),
            commodity_code: Some("15".to_string()),
            arrival_date_raw: date.format("%d/%m/%Y").to_string(),
            arrival_date: Some(date),
            prices: ParsedPriceFields::parse(Some("6000"), Some("7000"), Some("6500")),
        }
    }

    fn service(feed: Arc<MockFeedClient>) -> SyncService {
        SyncService::new(
            feed,
            Arc::new(ReferenceStore::new()),
            Arc::new(InMemoryPriceStore::new()),
            "Gujarat",
        )
    }

    #[tokio::test]
    async fn test_sync_yesterday() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 11).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let feed = Arc::new(MockFeedClient::new());
        feed.set_daily(vec![record(yesterday), record(today)]);
        let sync = service(feed);

        let report = sync.sync_yesterday(today).await.unwrap();
        assert_eq!(report.date, yesterday);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.summary.created, 1);

        let status = sync.status();
        assert_eq!(status.observations, 1);
        assert_eq!(status.latest_arrival_date, Some(yesterday));
        assert_eq!(status.entities.markets, 1);
    }

    #[tokio::test]
    async fn test_sync_propagates_upstream_failure() {
        let feed = Arc::new(MockFeedClient::new());
        feed.fail_with("timeout");
        let sync = service(feed);
        let err = sync
            .sync_date(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Feed(_)));
    }
}
