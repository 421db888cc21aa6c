//! Route handlers, one module per resource.

pub(crate) mod alerts;
pub(crate) mod analytics;
pub(crate) mod meta;
pub(crate) mod sync;

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Json;
use mandi_core::OwnerId;
use serde::Serialize;

/// Header carrying the authenticated user's ID, set by the auth gateway.
pub const OWNER_HEADER: &str = "x-user-id";

/// Successful response body: `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub(crate) struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

pub(crate) fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

/// Caller identity taken from the `x-user-id` header.
pub(crate) struct Owner(pub OwnerId);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(OwnerId::new(v)))
            .ok_or(ApiError::Unauthorized)
    }
}
