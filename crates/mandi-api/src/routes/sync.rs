//! Archive synchronisation and manual alert sweeps.

use super::success;
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, NaiveDate};
use mandi_alerts::SweepOutcome;
use serde::Deserialize;
use serde_json::json;

const DATE_REQUIRED: &str = "Date is required (format: DD-MM-YYYY)";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncDateRequest {
    date: Option<String>,
    state: Option<String>,
}

pub(crate) async fn sync_yesterday(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let date = state.today() - Duration::days(1);
    let report = state.sync.sync_date(date, None).await?;
    let message = if report.fetched == 0 {
        "No records found for yesterday"
    } else {
        "Data synced successfully"
    };
    Ok(success(json!({ "message": message, "report": report })))
}

pub(crate) async fn sync_date(
    State(state): State<ApiState>,
    Json(request): Json<SyncDateRequest>,
) -> ApiResult<impl IntoResponse> {
    let raw = request
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request(DATE_REQUIRED))?;
    let date = NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .map_err(|_| ApiError::bad_request("Invalid date format. Use DD-MM-YYYY"))?;

    let report = state.sync.sync_date(date, request.state).await?;
    let message = if report.fetched == 0 {
        "No records found for this date"
    } else {
        "Data synced successfully"
    };
    Ok(success(json!({ "message": message, "report": report })))
}

pub(crate) async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    success(state.sync.status())
}

pub(crate) async fn sweep(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let outcome = state.sweeper.sweep().await?;
    let message = match outcome {
        SweepOutcome::Completed(_) => "Alert sweep completed",
        SweepOutcome::AlreadyRunning => "Alert sweep already running",
    };
    Ok(success(json!({ "message": message, "sweep": outcome })))
}
