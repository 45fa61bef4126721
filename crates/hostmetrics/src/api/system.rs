//! System endpoints

use std::sync::{Arc, PoisonError};

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::api::AppError;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    /// Whether the provider answered a test-connection round trip
    pub provider_reachable: bool,
    /// Provider error when unreachable
    pub error: Option<String>,
    /// Collectors that will run on the next scrape
    pub collectors: Vec<String>,
}

/// Probe the warm session
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<HealthResponse>), AppError> {
    let exporter = Arc::clone(&state.exporter);
    let response = tokio::task::spawn_blocking(move || {
        let exporter = exporter.lock().unwrap_or_else(PoisonError::into_inner);
        let probe = exporter.session().test_connection();
        HealthResponse {
            status: if probe.is_ok() { "ok" } else { "degraded" }.to_string(),
            provider_reachable: probe.is_ok(),
            error: probe.err().map(|e| e.to_string()),
            collectors: exporter
                .collector_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    })
    .await
    .map_err(|e| AppError::internal(format!("health probe panicked: {e}")))?;

    let status = if response.provider_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(response)))
}
