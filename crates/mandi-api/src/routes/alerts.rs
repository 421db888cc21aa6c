//! Owner alert management and device registration.

use super::{success, Owner};
use crate::error::ApiResult;
use crate::state::ApiState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mandi_alerts::{AlertQuery, AlertUpdate, NewAlertRequest};
use mandi_core::AlertId;
use serde::Deserialize;
use serde_json::json;

pub(crate) async fn create(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Json(request): Json<NewAlertRequest>,
) -> ApiResult<impl IntoResponse> {
    let alert = state.alerts.create(&owner, request)?;
    Ok((
        StatusCode::CREATED,
        success(json!({
            "message": "Price alert created successfully",
            "data": { "alert": alert },
        })),
    ))
}

pub(crate) async fn list(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let alerts = state.alerts.list(&owner, query);
    success(json!({
        "count": alerts.len(),
        "data": { "alerts": alerts },
    }))
}

pub(crate) async fn get(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Path(id): Path<AlertId>,
) -> ApiResult<impl IntoResponse> {
    let alert = state.alerts.get(&owner, id)?;
    Ok(success(json!({ "data": { "alert": alert } })))
}

pub(crate) async fn update(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Path(id): Path<AlertId>,
    Json(update): Json<AlertUpdate>,
) -> ApiResult<impl IntoResponse> {
    let alert = state.alerts.update(&owner, id, update)?;
    Ok(success(json!({
        "message": "Alert updated successfully",
        "data": { "alert": alert },
    })))
}

pub(crate) async fn delete(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Path(id): Path<AlertId>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.alerts.delete(&owner, id)?;
    Ok(success(json!({
        "message": "Alert deleted successfully",
        "deleted": deleted,
    })))
}

pub(crate) async fn toggle(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Path(id): Path<AlertId>,
) -> ApiResult<impl IntoResponse> {
    let (alert, message) = state.alerts.toggle(&owner, id)?;
    Ok(success(json!({
        "message": message,
        "data": { "alert": alert },
    })))
}

pub(crate) async fn stats(State(state): State<ApiState>, Owner(owner): Owner) -> impl IntoResponse {
    success(json!({ "data": state.alerts.stats(&owner) }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceRequest {
    #[serde(default)]
    token: String,
}

pub(crate) async fn register_device(
    State(state): State<ApiState>,
    Owner(owner): Owner,
    Json(request): Json<DeviceRequest>,
) -> ApiResult<impl IntoResponse> {
    state.alerts.register_device(&owner, &request.token)?;
    Ok(success(json!({ "message": "Device registered successfully" })))
}
