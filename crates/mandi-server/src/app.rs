//! Main application orchestration.
//!
//! Wires the stores, feed client and dispatcher into the HTTP state, then runs
//! the server next to the scheduled alert sweep (and optional archive sync)
//! until ctrl-c or the shutdown token fires.

use crate::config::{AlertsConfig, AppConfig, DispatcherKind, StorageConfig};
use crate::error::{AppError, AppResult};
use mandi_alerts::{
    AlertMatcher, AlertService, AlertSweeper, DynDispatcher, FcmDispatcher,
    InMemoryDeviceDirectory, LogDispatcher, SweepOutcome,
};
use mandi_analytics::AnalyticsService;
use mandi_api::{run_server, ApiState};
use mandi_feed::{DataGovClient, LiveFeedClient};
use mandi_persistence::{InMemoryAlertStore, InMemoryPriceStore};
use mandi_registry::{ReferenceStore, SyncService};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REFERENCE_JOURNAL: &str = "reference.jsonl";
const PRICES_JOURNAL: &str = "prices.jsonl";
const ALERTS_JOURNAL: &str = "alerts.jsonl";
const DEVICES_JOURNAL: &str = "devices.jsonl";

struct Stores {
    reference: Arc<ReferenceStore>,
    prices: Arc<InMemoryPriceStore>,
    alerts: Arc<InMemoryAlertStore>,
    devices: Arc<InMemoryDeviceDirectory>,
}

impl Stores {
    fn open(storage: &StorageConfig) -> AppResult<Self> {
        if !storage.is_persistent() {
            warn!("No data directory configured, state will not survive a restart");
            return Ok(Self {
                reference: Arc::new(ReferenceStore::new()),
                prices: Arc::new(InMemoryPriceStore::new()),
                alerts: Arc::new(InMemoryAlertStore::new()),
                devices: Arc::new(InMemoryDeviceDirectory::new()),
            });
        }

        let stores = Self {
            reference: Arc::new(ReferenceStore::open(
                storage.journal_path(REFERENCE_JOURNAL),
            )?),
            prices: Arc::new(InMemoryPriceStore::open(
                storage.journal_path(PRICES_JOURNAL),
            )?),
            alerts: Arc::new(InMemoryAlertStore::open(
                storage.journal_path(ALERTS_JOURNAL),
            )?),
            devices: Arc::new(InMemoryDeviceDirectory::open(
                storage.journal_path(DEVICES_JOURNAL),
            )?),
        };
        info!(
            data_dir = %storage.data_dir,
            alerts = stores.alerts.len(),
            devices = stores.devices.len(),
            "Stores restored from journals"
        );
        Ok(stores)
    }
}

fn build_dispatcher(config: &AlertsConfig) -> AppResult<DynDispatcher> {
    match config.dispatcher {
        DispatcherKind::Log => Ok(Arc::new(LogDispatcher::new())),
        DispatcherKind::Fcm => {
            let dispatcher = FcmDispatcher::new(config.fcm.clone())
                .map_err(|e| AppError::Dispatcher(format!("Failed to create FCM client: {e}")))?;
            Ok(Arc::new(dispatcher))
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    state: ApiState,
    shutdown: CancellationToken,
}

impl Application {
    /// Build against the live open-data API and the configured dispatcher.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let feed = Arc::new(DataGovClient::new(config.feed.clone())?);
        let dispatcher = build_dispatcher(&config.alerts)?;
        Self::with_components(config, feed, dispatcher)
    }

    /// Build with an explicit feed and dispatcher.
    pub fn with_components(
        config: AppConfig,
        feed: Arc<dyn LiveFeedClient>,
        dispatcher: DynDispatcher,
    ) -> AppResult<Self> {
        let stores = Stores::open(&config.storage)?;

        let analytics = AnalyticsService::new(
            feed.clone(),
            stores.reference.clone(),
            stores.prices.clone(),
        )
        .with_market_limit(config.feed.market_limit);
        let alerts = AlertService::new(
            stores.reference.clone(),
            stores.alerts.clone(),
            stores.devices.clone(),
        );
        let sync = Arc::new(SyncService::new(
            feed.clone(),
            stores.reference.clone(),
            stores.prices.clone(),
            config.sync.default_state.clone(),
        ));
        let matcher = AlertMatcher::new(
            stores.reference.clone(),
            stores.alerts.clone(),
            stores.devices.clone(),
            dispatcher.clone(),
        );
        let sweeper = Arc::new(AlertSweeper::new(
            feed,
            matcher,
            config.alerts.sweep.clone(),
        ));

        info!(
            dispatcher = dispatcher.name(),
            sweep_state = %config.alerts.sweep.state,
            "Application initialized"
        );

        Ok(Self {
            state: ApiState::new(analytics, alerts, sync, sweeper),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// HTTP state, shared with the running server.
    pub fn api_state(&self) -> ApiState {
        self.state.clone()
    }

    /// Cancelling this token stops the server and the schedulers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until ctrl-c or the shutdown token is cancelled.
    pub async fn run(self) -> AppResult<()> {
        let token = self.shutdown.clone();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if self.config.alerts.sweep_enabled {
            tasks.push(tokio::spawn(sweep_loop(
                self.state.sweeper.clone(),
                Duration::from_secs(self.config.alerts.sweep_interval_secs),
                token.clone(),
            )));
        } else {
            info!("Scheduled alert sweep disabled");
        }

        if self.config.sync.schedule_enabled {
            tasks.push(tokio::spawn(sync_loop(
                self.state.sync.clone(),
                Duration::from_secs(self.config.sync.interval_secs),
                token.clone(),
            )));
        }

        let server_token = token.clone();
        let mut server = tokio::spawn(run_server(
            self.state.clone(),
            self.config.server.clone(),
            async move { server_token.cancelled().await },
        ));

        let finished = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
            _ = token.cancelled() => None,
            result = &mut server => Some(result),
        };

        token.cancel();
        let server_result = match finished {
            Some(result) => result,
            None => server.await,
        };

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        server_result.map_err(|e| AppError::Task(format!("HTTP server task: {e}")))??;
        info!("Shutdown complete");
        Ok(())
    }
}

/// First tick lands one full period after start.
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn sweep_loop(sweeper: Arc<AlertSweeper>, period: Duration, token: CancellationToken) {
    let mut interval = ticker(period);
    info!(interval_secs = period.as_secs(), "Alert sweep scheduler started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => match sweeper.sweep().await {
                Ok(SweepOutcome::Completed(report)) => info!(
                    records = report.records,
                    skipped = report.skipped,
                    notified = report.notified,
                    retired = report.retired,
                    "Scheduled alert sweep finished"
                ),
                Ok(SweepOutcome::AlreadyRunning) => {
                    debug!("Scheduled alert sweep skipped, another sweep in progress")
                }
                // Retried on the next tick.
                Err(e) => warn!(error = %e, "Scheduled alert sweep failed"),
            },
        }
    }
    info!("Alert sweep scheduler stopped");
}

async fn sync_loop(sync: Arc<SyncService>, period: Duration, token: CancellationToken) {
    let mut interval = ticker(period);
    info!(interval_secs = period.as_secs(), "Archive sync scheduler started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let today = chrono::Local::now().date_naive();
                match sync.sync_yesterday(today).await {
                    Ok(report) => info!(
                        state = %report.state,
                        date = %report.date,
                        fetched = report.fetched,
                        created = report.summary.created,
                        "Scheduled archive sync finished"
                    ),
                    Err(e) => warn!(error = %e, "Scheduled archive sync failed"),
                }
            }
        }
    }
    info!("Archive sync scheduler stopped");
}
