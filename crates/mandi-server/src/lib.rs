//! Mandi price analytics server.
//!
//! Builds the stores, upstream feed client and notification dispatcher from
//! `AppConfig`, then serves the HTTP API alongside the scheduled alert sweep.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AlertsConfig, AppConfig, DispatcherKind, StorageConfig, SyncConfig};
pub use error::{AppError, AppResult};
