use super::success;
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

pub(crate) async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    success(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "uptime": state.uptime_secs(),
        "sweepRunning": state.sweeper.is_running(),
    }))
}

pub(crate) async fn metrics() -> ApiResult<impl IntoResponse> {
    let body = mandi_telemetry::gather().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
