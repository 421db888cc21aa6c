//! Shared state for the HTTP handlers.

use chrono::{Local, NaiveDate};
use mandi_alerts::{AlertService, AlertSweeper};
use mandi_analytics::AnalyticsService;
use mandi_registry::SyncService;
use std::sync::Arc;
use std::time::Instant;

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct ApiState {
    pub analytics: AnalyticsService,
    pub alerts: AlertService,
    pub sync: Arc<SyncService>,
    pub sweeper: Arc<AlertSweeper>,
    started_at: Instant,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl ApiState {
    pub fn new(
        analytics: AnalyticsService,
        alerts: AlertService,
        sync: Arc<SyncService>,
        sweeper: Arc<AlertSweeper>,
    ) -> Self {
        Self {
            analytics,
            alerts,
            sync,
            sweeper,
            started_at: Instant::now(),
            today: local_today,
        }
    }

    /// Replace the source of "today" (the server's local calendar date by default).
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
