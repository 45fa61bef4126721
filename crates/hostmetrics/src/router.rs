//! HTTP router configuration

use std::sync::Arc;

use axum::{Router, http::Uri, routing::get};

use crate::api::{AppError, metrics, system};
use crate::state::AppState;

const LANDING: &str = "hostmetrics exporter\n\n/metrics  Prometheus text exposition\n/health   provider reachability\n";

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { LANDING }))
        .route("/metrics", get(metrics::metrics))
        .route("/health", get(system::health))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("no route for {uri}"))
}
