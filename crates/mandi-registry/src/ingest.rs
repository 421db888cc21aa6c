//! Ingestion of upstream records into the price repository.

use crate::error::{RegistryError, RegistryResult};
use crate::reference::EntityResolver;
use mandi_core::{LiveRecord, PriceObservation};
use mandi_persistence::{PriceRepository, UpsertOutcome};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name used when the upstream leaves variety or grade blank.
const UNKNOWN_NAME: &str = "Unknown";

/// Cap on per-record error details kept in a summary.
const MAX_ERROR_DETAILS: usize = 50;

/// Why a single record was not ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestErrorDetail {
    pub index: usize,
    pub market: String,
    pub commodity: String,
    pub reason: String,
}

/// Batch ingestion result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    /// Records stored with at least one price field coerced to 0.
    pub invalid_prices: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<IngestErrorDetail>,
}

/// Resolves (or creates) the entities of each record and upserts its observation.
#[derive(Clone)]
pub struct PriceIngestor {
    resolver: Arc<dyn EntityResolver>,
    prices: Arc<dyn PriceRepository>,
}

impl PriceIngestor {
    pub fn new(resolver: Arc<dyn EntityResolver>, prices: Arc<dyn PriceRepository>) -> Self {
        Self { resolver, prices }
    }

    /// Ingest a batch. A bad record is counted and skipped, never aborting the batch.
    pub fn ingest(&self, records: &[LiveRecord]) -> IngestSummary {
        let mut summary = IngestSummary {
            total: records.len(),
            ..Default::default()
        };

        for (index, record) in records.iter().enumerate() {
            match self.ingest_one(record) {
                Ok(outcome) => {
                    match outcome {
                        UpsertOutcome::Created => summary.created += 1,
                        UpsertOutcome::Updated => summary.updated += 1,
                        UpsertOutcome::Unchanged => summary.unchanged += 1,
                    }
                    if !record.prices.is_valid() {
                        summary.invalid_prices += 1;
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    debug!(index, market = %record.market, commodity = %record.commodity, %e, "Record not ingested");
                    if summary.error_details.len() < MAX_ERROR_DETAILS {
                        summary.error_details.push(IngestErrorDetail {
                            index,
                            market: record.market.clone(),
                            commodity: record.commodity.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if summary.errors > 0 {
            warn!(errors = summary.errors, total = summary.total, "Ingestion finished with errors");
        }
        info!(
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            invalid_prices = summary.invalid_prices,
            "Ingestion completed"
        );
        summary
    }

    fn ingest_one(&self, record: &LiveRecord) -> RegistryResult<UpsertOutcome> {
        let arrival_date = record.arrival_date.ok_or_else(|| {
            RegistryError::InvalidRecord(format!(
                "unparsable arrival date {:?}",
                record.arrival_date_raw
            ))
        })?;

        let state = self.resolver.resolve_or_create_state(&record.state)?;
        let district = self
            .resolver
            .resolve_or_create_district(state.id, &record.district)?;
        let market = self
            .resolver
            .resolve_or_create_market(district.id, &record.market)?;
        let commodity = self
            .resolver
            .resolve_or_create_commodity(&record.commodity, record.commodity_code.as_deref())?;
        let variety = self
            .resolver
            .resolve_or_create_variety(or_unknown(&record.variety))?;
        let grade = self
            .resolver
            .resolve_or_create_grade(or_unknown(&record.grade))?;

        let prices = record.prices.lenient();
        let observation = PriceObservation {
            market: market.id,
            commodity: commodity.id,
            variety: variety.id,
            grade: grade.id,
            arrival_date,
            min_price: prices.min_price,
            max_price: prices.max_price,
            modal_price: prices.modal_price,
        };

        Ok(self.prices.upsert(observation)?)
    }
}

fn or_unknown(name: &str) -> &str {
    if name.trim().is_empty() {
        UNKNOWN_NAME
    } else {
        name
    }
}
