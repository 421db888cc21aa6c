//! Prometheus metrics and structured logging for the mandi price service.
//!
//! - Prometheus metrics for analytics requests, upstream fetches, alert sweeps
//!   and notification delivery
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather, Metrics};
