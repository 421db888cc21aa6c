//! Prometheus metrics for the price service.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric names,
//! which is a startup bug, and only happens during static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

/// Analytics requests.
/// Labels: endpoint (markets/market/commodity/compare), outcome (ok/not_found/invalid/upstream)
pub static ANALYTICS_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_analytics_requests_total",
        "Total analytics requests",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Upstream feed fetch latency in milliseconds.
pub static UPSTREAM_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mandi_upstream_latency_ms",
        "Open-data feed fetch latency in milliseconds",
        &["resource"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Upstream feed failures.
pub static UPSTREAM_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_upstream_failures_total",
        "Total failed open-data feed fetches",
        &["resource"]
    )
    .unwrap()
});

/// Alert sweeps.
/// Labels: outcome (completed/already_running/failed)
pub static SWEEPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_alert_sweeps_total",
        "Total alert sweeps",
        &["outcome"]
    )
    .unwrap()
});

/// Sweep in progress (1 while a sweep holds the run-lock).
pub static SWEEP_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("mandi_alert_sweep_running", "Alert sweep in progress").unwrap()
});

/// Alerts whose condition matched.
pub static ALERTS_FIRED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_alerts_fired_total",
        "Total alerts whose target was crossed",
        &["direction"]
    )
    .unwrap()
});

/// Notification deliveries.
/// Labels: result (delivered/invalid_token/throttled/failed/no_device)
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_notifications_total",
        "Total notification delivery attempts",
        &["result"]
    )
    .unwrap()
});

/// Alerts deleted after firing.
pub static ALERTS_RETIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("mandi_alerts_retired_total", "Total alerts retired after firing")
        .unwrap()
});

/// Live records skipped for data-quality reasons.
pub static DATA_QUALITY_SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_data_quality_skips_total",
        "Total live records skipped",
        &["reason"]
    )
    .unwrap()
});

/// Ingested archive records.
/// Labels: result (created/updated/error)
pub static INGESTED_RECORDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mandi_ingested_records_total",
        "Total archive records ingested",
        &["result"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn analytics_request(endpoint: &str, outcome: &str) {
        ANALYTICS_REQUESTS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn upstream_latency(resource: &str, latency_ms: f64) {
        UPSTREAM_LATENCY_MS
            .with_label_values(&[resource])
            .observe(latency_ms);
    }

    pub fn upstream_failure(resource: &str) {
        UPSTREAM_FAILURES_TOTAL.with_label_values(&[resource]).inc();
    }

    pub fn sweep(outcome: &str) {
        SWEEPS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn sweep_running(running: bool) {
        SWEEP_RUNNING.set(i64::from(running));
    }

    pub fn alert_fired(direction: &str) {
        ALERTS_FIRED_TOTAL.with_label_values(&[direction]).inc();
    }

    pub fn notification(result: &str) {
        NOTIFICATIONS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn alerts_retired(count: usize) {
        ALERTS_RETIRED_TOTAL.inc_by(count as u64);
    }

    pub fn data_quality_skip(reason: &str) {
        DATA_QUALITY_SKIPS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an ingestion batch.
    pub fn ingested(created: usize, updated: usize, errors: usize) {
        for (label, count) in [("created", created), ("updated", updated), ("error", errors)] {
            INGESTED_RECORDS_TOTAL
                .with_label_values(&[label])
                .inc_by(count as f64);
        }
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather() -> TelemetryResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
