//! Matching live records against stored alerts.
//!
//! Records are processed one at a time. Every alert that fires is deleted
//! before the next record is looked at, whatever happened to its
//! notification, so an alert can notify at most once.

use crate::devices::DeviceDirectory;
use crate::dispatcher::{AlertContext, AlertNotification, DynDispatcher};
use mandi_core::{AlertEvaluation, AlertId, LiveRecord, TriggeredAlert};
use mandi_persistence::{AlertStore, PersistenceError};
use mandi_registry::{Commodity, District, EntityResolver, Market};
use mandi_telemetry::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a record was not matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidPrice,
    UnknownDistrict,
    UnknownMarket,
    UnknownCommodity,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::InvalidPrice => "invalid_price",
            SkipReason::UnknownDistrict => "unknown_district",
            SkipReason::UnknownMarket => "unknown_market",
            SkipReason::UnknownCommodity => "unknown_commodity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Skipped(SkipReason),
    Matched {
        /// Active alerts examined.
        processed: usize,
        /// Notifications accepted by the dispatcher.
        notified: usize,
        /// Fired alerts deleted.
        retired: usize,
    },
}

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub records: usize,
    pub skipped: usize,
    pub processed: usize,
    pub notified: usize,
    pub retired: usize,
}

impl SweepReport {
    fn add(&mut self, outcome: RecordOutcome) {
        self.records += 1;
        match outcome {
            RecordOutcome::Skipped(_) => self.skipped += 1,
            RecordOutcome::Matched {
                processed,
                notified,
                retired,
            } => {
                self.processed += processed;
                self.notified += notified;
                self.retired += retired;
            }
        }
    }
}

/// Location of a record in reference-data terms.
struct ResolvedRecord {
    district: District,
    market: Market,
    commodity: Commodity,
}

pub struct AlertMatcher {
    resolver: Arc<dyn EntityResolver>,
    alerts: Arc<dyn AlertStore>,
    devices: Arc<dyn DeviceDirectory>,
    dispatcher: DynDispatcher,
}

impl AlertMatcher {
    pub fn new(
        resolver: Arc<dyn EntityResolver>,
        alerts: Arc<dyn AlertStore>,
        devices: Arc<dyn DeviceDirectory>,
        dispatcher: DynDispatcher,
    ) -> Self {
        Self {
            resolver,
            alerts,
            devices,
            dispatcher,
        }
    }

    /// Match every record in order.
    pub async fn run(&self, records: &[LiveRecord]) -> SweepReport {
        let mut report = SweepReport::default();
        for record in records {
            report.add(self.process_record(record).await);
        }
        info!(
            records = report.records,
            skipped = report.skipped,
            processed = report.processed,
            notified = report.notified,
            retired = report.retired,
            dispatcher = self.dispatcher.name(),
            "Alert matching finished"
        );
        report
    }

    pub async fn process_record(&self, record: &LiveRecord) -> RecordOutcome {
        let Some(current) = record.prices.modal_price() else {
            debug!(
                market = %record.market,
                commodity = %record.commodity,
                "Skipping record without a usable modal price"
            );
            Metrics::data_quality_skip(SkipReason::InvalidPrice.label());
            return RecordOutcome::Skipped(SkipReason::InvalidPrice);
        };

        let resolved = match self.resolve(record) {
            Ok(resolved) => resolved,
            Err(reason) => {
                debug!(
                    district = %record.district,
                    market = %record.market,
                    commodity = %record.commodity,
                    reason = reason.label(),
                    "Skipping unresolvable record"
                );
                Metrics::data_quality_skip(reason.label());
                return RecordOutcome::Skipped(reason);
            }
        };

        let alerts = self.alerts.active_for(
            resolved.district.id,
            resolved.market.id,
            resolved.commodity.id,
        );
        let processed = alerts.len();
        let mut notified = 0;
        let mut to_retire: Vec<AlertId> = Vec::new();

        for alert in alerts {
            let AlertEvaluation::Triggered(triggered) = alert.evaluate(current) else {
                continue;
            };
            Metrics::alert_fired(triggered.alert().direction.as_str());
            if self.notify(&resolved, &triggered).await {
                notified += 1;
            }
            to_retire.push(triggered.retire());
        }

        let retired = if to_retire.is_empty() {
            0
        } else {
            match self.alerts.delete_many(&to_retire) {
                Ok(n) => n,
                Err(PersistenceError::Unjournaled { removed, source }) => {
                    warn!(error = %source, removed, "Fired alerts retired but not journaled");
                    removed
                }
                Err(e) => {
                    warn!(?e, count = to_retire.len(), "Failed to retire fired alerts");
                    0
                }
            }
        };
        Metrics::alerts_retired(retired);

        RecordOutcome::Matched {
            processed,
            notified,
            retired,
        }
    }

    fn resolve(&self, record: &LiveRecord) -> Result<ResolvedRecord, SkipReason> {
        let district = self
            .resolver
            .find_district(&record.district)
            .ok_or(SkipReason::UnknownDistrict)?;
        let market = self
            .resolver
            .find_market(district.id, &record.market)
            .ok_or(SkipReason::UnknownMarket)?;
        let commodity = self
            .resolver
            .find_commodity(&record.commodity)
            .ok_or(SkipReason::UnknownCommodity)?;
        Ok(ResolvedRecord {
            district,
            market,
            commodity,
        })
    }

    /// Deliver one fired alert. Returns whether the dispatcher accepted it.
    async fn notify(&self, resolved: &ResolvedRecord, triggered: &TriggeredAlert) -> bool {
        let alert = triggered.alert();
        let Some(token) = self.devices.token_for(&alert.owner) else {
            debug!(alert = %alert.id, owner = %alert.owner, "No device registered, retiring silently");
            Metrics::notification("no_device");
            return false;
        };

        let context = self.context(resolved, triggered);
        let result = self
            .dispatcher
            .send(token, AlertNotification::price_alert(&context))
            .await;
        Metrics::notification(result.label());

        if result.is_success() {
            info!(
                alert = %alert.id,
                owner = %alert.owner,
                direction = %alert.direction,
                target = %alert.target_price,
                current = %triggered.current_price(),
                "Price alert sent"
            );
        } else {
            warn!(alert = %alert.id, ?result, "Price alert delivery failed");
        }
        result.is_success()
    }

    fn context(&self, resolved: &ResolvedRecord, triggered: &TriggeredAlert) -> AlertContext {
        let alert = triggered.alert();
        AlertContext {
            district: resolved.district.name.clone(),
            market: resolved.market.name.clone(),
            commodity: resolved.commodity.name.clone(),
            variety: alert
                .variety
                .and_then(|id| self.resolver.variety(id))
                .map(|v| v.name),
            grade: alert
                .grade
                .and_then(|id| self.resolver.grade(id))
                .map(|g| g.name),
            direction: alert.direction,
            target_price: alert.target_price,
            current_price: triggered.current_price(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::InMemoryDeviceDirectory;
    use crate::dispatcher::{DispatchResult, MockDispatcher};
    use chrono::{Duration, Utc};
    use mandi_core::{AlertDirection, OwnerId, ParsedPriceFields, Price, PriceAlert};
    use mandi_persistence::{AlertFilter, InMemoryAlertStore, PersistenceResult};
    use mandi_registry::ReferenceStore;
    use mockall::mock;
    use rust_decimal_macros::dec;

    struct Fixture {
        refs: Arc<ReferenceStore>,
        alerts: Arc<InMemoryAlertStore>,
        devices: Arc<InMemoryDeviceDirectory>,
        dispatcher: Arc<MockDispatcher>,
        matcher: AlertMatcher,
        location: (District, Market, Commodity),
    }

    impl Fixture {
        fn new() -> Self {
            let refs = Arc::new(ReferenceStore::new());
            let state = refs.resolve_or_create_state("Gujarat").unwrap();
            let district = refs.resolve_or_create_district(state.id, "Rajkot").unwrap();
            let market = refs.resolve_or_create_market(district.id, "Gondal").unwrap();
            let commodity = refs.resolve_or_create_commodity("Cotton", None).unwrap();
            let alerts = Arc::new(InMemoryAlertStore::new());
            let devices = Arc::new(InMemoryDeviceDirectory::new());
            let dispatcher = Arc::new(MockDispatcher::new());
            let matcher = AlertMatcher::new(
                refs.clone(),
                alerts.clone(),
                devices.clone(),
                dispatcher.clone(),
            );
            Self {
                refs,
                alerts,
                devices,
                dispatcher,
                matcher,
                location: (district, market, commodity),
            }
        }

        fn add_alert(&self, owner: &str, direction: AlertDirection, target: &str) -> PriceAlert {
            let (district, market, commodity) = &self.location;
            let now = Utc::now();
            let alert = PriceAlert {
                id: AlertId::new(),
                owner: OwnerId::new(owner),
                district: district.id,
                market: market.id,
                commodity: commodity.id,
                variety: None,
                grade: None,
                target_price: target.parse().unwrap(),
                direction,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            self.alerts.insert(alert.clone()).unwrap();
            alert
        }

        fn register(&self, owner: &str) {
            self.devices
                .register(OwnerId::new(owner), format!("token-{owner}"))
                .unwrap();
        }
    }

    fn record(modal: &str) -> LiveRecord {
        LiveRecord {
            state: "Gujarat".to_string(),
            district: "Rajkot".to_string(),
            market: "Gondal".to_string(),
            commodity: "Cotton".to_string(),
            variety: "Other".to_string(),
            grade: "FAQ".to_string(),
            commodity_code: None,
            arrival_date_raw: "17/10/2026".to_string(),
            arrival_date: None,
            prices: ParsedPriceFields::parse(Some("90"), Some("250"), Some(modal)),
        }
    }

    #[tokio::test]
    async fn test_alert_fires_once_across_records() {
        let f = Fixture::new();
        f.register("farmer");
        f.add_alert("farmer", AlertDirection::Up, "100");

        let report = f.matcher.run(&[record("150"), record("200")]).await;

        assert_eq!(report.records, 2);
        assert_eq!(report.notified, 1);
        assert_eq!(report.retired, 1);
        assert_eq!(f.dispatcher.get_sends().len(), 1);
        assert!(f.alerts.is_empty());

        let (token, notification) = &f.dispatcher.get_sends()[0];
        assert_eq!(token, "token-farmer");
        assert!(notification.body.contains("Price reached ₹150 (Target: ₹100)"));
    }

    #[tokio::test]
    async fn test_unmet_alert_stays_armed() {
        let f = Fixture::new();
        f.register("farmer");
        f.add_alert("farmer", AlertDirection::Down, "100");

        let outcome = f.matcher.process_record(&record("150")).await;

        assert_eq!(
            outcome,
            RecordOutcome::Matched {
                processed: 1,
                notified: 0,
                retired: 0
            }
        );
        assert_eq!(f.alerts.len(), 1);
        assert!(f.dispatcher.get_sends().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_still_retires() {
        let f = Fixture::new();
        f.register("farmer");
        f.dispatcher
            .set_next_result(DispatchResult::Failed("offline".to_string()));
        f.add_alert("farmer", AlertDirection::Down, "100");

        let outcome = f.matcher.process_record(&record("100")).await;

        assert_eq!(
            outcome,
            RecordOutcome::Matched {
                processed: 1,
                notified: 0,
                retired: 1
            }
        );
        assert!(f.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_owner_without_device_is_retired_silently() {
        let f = Fixture::new();
        f.add_alert("nobody", AlertDirection::Up, "100");
        f.register("farmer");
        f.add_alert("farmer", AlertDirection::Up, "120");

        let outcome = f.matcher.process_record(&record("130")).await;

        assert_eq!(
            outcome,
            RecordOutcome::Matched {
                processed: 2,
                notified: 1,
                retired: 2
            }
        );
        assert_eq!(f.dispatcher.get_sends().len(), 1);
        assert!(f.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_alert_ignored() {
        let f = Fixture::new();
        f.register("farmer");
        let mut alert = f.add_alert("farmer", AlertDirection::Up, "100");
        alert.is_active = false;
        f.alerts.update(alert).unwrap();

        let outcome = f.matcher.process_record(&record("500")).await;

        assert_eq!(
            outcome,
            RecordOutcome::Matched {
                processed: 0,
                notified: 0,
                retired: 0
            }
        );
        assert_eq!(f.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_and_invalid_records_skipped() {
        let f = Fixture::new();
        f.register("farmer");
        f.add_alert("farmer", AlertDirection::Up, "100");

        let mut unknown_market = record("150");
        unknown_market.market = "Jetpur".to_string();
        let mut unknown_commodity = record("150");
        unknown_commodity.commodity = "Saffron".to_string();
        let mut unknown_district = record("150");
        unknown_district.district = "Kutch".to_string();

        assert_eq!(
            f.matcher.process_record(&unknown_market).await,
            RecordOutcome::Skipped(SkipReason::UnknownMarket)
        );
        assert_eq!(
            f.matcher.process_record(&unknown_commodity).await,
            RecordOutcome::Skipped(SkipReason::UnknownCommodity)
        );
        assert_eq!(
            f.matcher.process_record(&unknown_district).await,
            RecordOutcome::Skipped(SkipReason::UnknownDistrict)
        );
        assert_eq!(
            f.matcher.process_record(&record("n/a")).await,
            RecordOutcome::Skipped(SkipReason::InvalidPrice)
        );
        assert_eq!(f.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_variety_and_grade_names_in_notification() {
        let f = Fixture::new();
        f.register("farmer");
        let variety = f.refs.resolve_or_create_variety("Shankar-6").unwrap();
        let mut alert = f.add_alert("farmer", AlertDirection::Up, "100");
        alert.variety = Some(variety.id);
        f.alerts.update(alert).unwrap();

        f.matcher.process_record(&record("101")).await;

        let sends = f.dispatcher.get_sends();
        assert_eq!(sends[0].1.data["variety"], "Shankar-6");
        assert!(sends[0].1.body.contains("Variety: Shankar-6\n"));
    }

    mock! {
        Store {}
        impl AlertStore for Store {
            fn insert(&self, alert: PriceAlert) -> PersistenceResult<()>;
            fn update(&self, alert: PriceAlert) -> PersistenceResult<bool>;
            fn get(&self, id: AlertId) -> Option<PriceAlert>;
            fn list_for_owner(&self, owner: &OwnerId, filter: &AlertFilter) -> Vec<PriceAlert>;
            fn active_for(
                &self,
                district: mandi_core::DistrictId,
                market: mandi_core::MarketId,
                commodity: mandi_core::CommodityId,
            ) -> Vec<PriceAlert>;
            fn delete_many(&self, ids: &[AlertId]) -> PersistenceResult<usize>;
        }
    }

    #[tokio::test]
    async fn test_delete_failure_is_contained() {
        let f = Fixture::new();
        f.register("farmer");
        let (district, market, commodity) = f.location.clone();
        let now = Utc::now();
        let alert = PriceAlert {
            id: AlertId::new(),
            owner: OwnerId::new("farmer"),
            district: district.id,
            market: market.id,
            commodity: commodity.id,
            variety: None,
            grade: None,
            target_price: Price::new(dec!(100)),
            direction: AlertDirection::Up,
            is_active: true,
            created_at: now - Duration::hours(1),
            updated_at: now,
        };
        let expected_id = alert.id;

        let mut store = MockStore::new();
        store
            .expect_active_for()
            .times(1)
            .returning(move |_, _, _| vec![alert.clone()]);
        store
            .expect_delete_many()
            .withf(move |ids| ids.len() == 1 && ids[0] == expected_id)
            .times(1)
            .returning(|_| {
                Err(PersistenceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )))
            });

        let matcher = AlertMatcher::new(
            f.refs.clone(),
            Arc::new(store),
            f.devices.clone(),
            f.dispatcher.clone(),
        );
        let outcome = matcher.process_record(&record("150")).await;

        assert_eq!(
            outcome,
            RecordOutcome::Matched {
                processed: 1,
                notified: 1,
                retired: 0
            }
        );
    }

    #[tokio::test]
    async fn test_unjournaled_retirement_counts_and_does_not_refire() {
        let f = Fixture::new();
        f.register("a");
        f.register("b");
        f.add_alert("a", AlertDirection::Up, "100");
        f.add_alert("b", AlertDirection::Up, "100");

        let alerts = f.alerts.clone();
        let mut store = MockStore::new();
        store.expect_active_for().returning(move |d, m, c| alerts.active_for(d, m, c));
        let alerts = f.alerts.clone();
        store.expect_delete_many().returning(move |ids| {
            let removed = alerts.delete_many(ids)?;
            Err(PersistenceError::Unjournaled {
                removed,
                source: Box::new(PersistenceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                ))),
            })
        });

        let matcher = AlertMatcher::new(
            f.refs.clone(),
            Arc::new(store),
            f.devices.clone(),
            f.dispatcher.clone(),
        );
        let first = matcher.run(&[record("150")]).await;
        let second = matcher.run(&[record("150")]).await;

        assert_eq!(first.notified, 2);
        assert_eq!(first.retired, 2);
        assert_eq!(second.processed, 0);
        assert_eq!(f.dispatcher.get_sends().len(), 2);
    }
}
