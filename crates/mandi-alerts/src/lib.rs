//! Price alerts for mandi.
//!
//! - `AlertService`: owner-scoped create, list, update, toggle and delete
//! - `AlertMatcher`: evaluates live records against active alerts, notifies
//!   and deletes every alert that fires
//! - `AlertSweeper`: periodic matcher run over one state's live feed, guarded
//!   by a run-lock
//! - `NotificationDispatcher`: push delivery (FCM, log, mock)

pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod service;
pub mod sweep;

pub use devices::{DeviceDirectory, InMemoryDeviceDirectory};
pub use dispatcher::{
    AlertContext, AlertNotification, DispatchResult, DynDispatcher, FcmConfig, FcmDispatcher,
    LogDispatcher, MockDispatcher, NotificationDispatcher,
};
pub use error::{AlertError, AlertResult};
pub use matcher::{AlertMatcher, RecordOutcome, SkipReason, SweepReport};
pub use service::{AlertQuery, AlertService, AlertStats, AlertUpdate, AlertView, NewAlertRequest};
pub use sweep::{AlertSweeper, SweepConfig, SweepOutcome};
