//! HTTP error mapping.
//!
//! Every failure is rendered as `{"success": false, "error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mandi_alerts::AlertError;
use mandi_analytics::AnalyticsError;
use mandi_registry::RegistryError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Analytics(e) => match e {
                AnalyticsError::NotFound { .. } => StatusCode::NOT_FOUND,
                AnalyticsError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
                AnalyticsError::Upstream(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Alert(e) => match e {
                AlertError::NotFound(_) => StatusCode::NOT_FOUND,
                AlertError::Validation(_) | AlertError::Duplicate(_) => StatusCode::BAD_REQUEST,
                AlertError::Upstream(_) => StatusCode::BAD_GATEWAY,
                AlertError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Registry(e) => match e {
                RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
                RegistryError::EmptyName(_) | RegistryError::InvalidRecord(_) => {
                    StatusCode::BAD_REQUEST
                }
                RegistryError::Feed(_) => StatusCode::BAD_GATEWAY,
                RegistryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::BAD_GATEWAY {
            error!(error = %self, "Upstream feed failure");
        } else if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
