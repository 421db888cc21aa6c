//! HTTP surface for mandi.
//!
//! Routes are mounted under `/api/{version}`:
//!
//! - `analytics/*`: market reconciliation, commodity trends, market comparison
//! - `alerts/*`, `devices`: owner-scoped alert management (owner from `x-user-id`)
//! - `sync/*`, `alerts/sweep`: archive ingestion and manual alert sweeps
//!
//! `/health` and `/metrics` sit at the root.

mod config;
mod error;
mod routes;
mod server;
mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::OWNER_HEADER;
pub use server::{create_router, run_server};
pub use state::ApiState;
