//! Router construction and the HTTP server loop.

use std::future::Future;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::routes::{alerts, analytics, meta, sync};
use crate::state::ApiState;

fn api_routes() -> Router<ApiState> {
    Router::new()
        .route("/analytics/markets", get(analytics::list_markets))
        .route("/analytics/markets/{market_id}", get(analytics::market_analytics))
        .route(
            "/analytics/markets/{market_id}/commodities/{commodity_id}",
            get(analytics::commodity_analytics),
        )
        .route("/analytics/compare", get(analytics::compare))
        .route("/alerts", post(alerts::create).get(alerts::list))
        .route("/alerts/stats", get(alerts::stats))
        .route("/alerts/sweep", post(sync::sweep))
        .route(
            "/alerts/{id}",
            get(alerts::get).put(alerts::update).delete(alerts::delete),
        )
        .route("/alerts/{id}/toggle", patch(alerts::toggle))
        .route("/devices", put(alerts::register_device))
        .route("/sync/yesterday", post(sync::sync_yesterday))
        .route("/sync/date", post(sync::sync_date))
        .route("/sync/status", get(sync::status))
}

/// Create the axum router.
pub fn create_router(state: ApiState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(meta::health))
        .route("/metrics", get(meta::metrics))
        .nest(&config.api_prefix(), api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn run_server(
    state: ApiState,
    config: ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(state, &config);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, prefix = %config.api_prefix(), "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
