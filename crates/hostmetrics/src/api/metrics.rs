//! Prometheus scrape endpoint

use std::sync::{Arc, PoisonError};
use std::time::Instant;

use axum::{extract::State, http::header, response::IntoResponse};
use hostmetrics_collector::encode_text;

use crate::api::AppError;
use crate::state::AppState;

/// Run every collector and render the text exposition format
///
/// Provider calls block, so the scrape runs on the blocking pool.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let exporter = Arc::clone(&state.exporter);
    let start = Instant::now();
    let body = tokio::task::spawn_blocking(move || {
        let mut exporter = exporter.lock().unwrap_or_else(PoisonError::into_inner);
        let families = exporter.scrape()?;
        encode_text(&families)
    })
    .await
    .map_err(|e| AppError::internal(format!("scrape panicked: {e}")))??;

    tracing::debug!(elapsed = ?start.elapsed(), bytes = body.len(), "scrape served");
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
