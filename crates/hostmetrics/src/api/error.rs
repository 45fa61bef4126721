//! HTTP error bodies for the scrape and health endpoints

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hostmetrics_collector::CollectorError;
use hostmetrics_mi::MiError;
use serde::{Deserialize, Serialize};

/// JSON error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code
    pub code: String,
    pub message: String,
    /// Whether scraping again may succeed
    pub retryable: bool,
}

/// Handler error carrying its status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: String, retryable: bool) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message,
                retryable,
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message.into(),
            false,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message.into(), false)
    }
}

impl From<CollectorError> for AppError {
    fn from(e: CollectorError) -> Self {
        let retryable = e.is_retryable();
        let (status, code) = match &e {
            CollectorError::Mi(MiError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT")
            }
            CollectorError::Mi(MiError::Unavailable(_) | MiError::ConnectionFailed(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNREACHABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "SCRAPE_FAILED"),
        };
        Self::new(status, code, e.to_string(), retryable)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
