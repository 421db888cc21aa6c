//! Periodic alert sweep.
//!
//! One sweep fetches the configured state's live feed and runs the matcher
//! over it. Only one sweep may run at a time; a second caller gets
//! `SweepOutcome::AlreadyRunning` instead of waiting.

use crate::error::AlertResult;
use crate::matcher::{AlertMatcher, SweepReport};
use mandi_feed::{FeedScope, LiveFeedClient};
use mandi_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

fn default_state() -> String {
    "Gujarat".to_string()
}

fn default_record_limit() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// State whose feed is scanned.
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_record_limit")]
    pub record_limit: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            state: default_state(),
            record_limit: default_record_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(SweepReport),
    AlreadyRunning,
}

/// Holds the run-lock until dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                Metrics::sweep_running(true);
                Self(flag)
            })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        Metrics::sweep_running(false);
    }
}

pub struct AlertSweeper {
    feed: Arc<dyn LiveFeedClient>,
    matcher: AlertMatcher,
    config: SweepConfig,
    running: AtomicBool,
}

impl AlertSweeper {
    pub fn new(feed: Arc<dyn LiveFeedClient>, matcher: AlertMatcher, config: SweepConfig) -> Self {
        Self {
            feed,
            matcher,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sweep. Upstream failures are returned; nothing is matched in that case.
    pub async fn sweep(&self) -> AlertResult<SweepOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("Alert sweep already running, skipping");
            Metrics::sweep("already_running");
            return Ok(SweepOutcome::AlreadyRunning);
        };

        let started = Instant::now();
        let scope = FeedScope::state(self.config.state.clone()).with_limit(self.config.record_limit);
        let records = match self.feed.fetch_live(scope).await {
            Ok(records) => records,
            Err(e) => {
                warn!(state = %self.config.state, error = %e, "Alert sweep could not fetch live prices");
                Metrics::sweep("failed");
                return Err(e.into());
            }
        };

        info!(
            state = %self.config.state,
            records = records.len(),
            "Starting alert sweep"
        );
        let report = self.matcher.run(&records).await;
        Metrics::sweep("completed");
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Alert sweep completed"
        );
        Ok(SweepOutcome::Completed(report))
    }
}
