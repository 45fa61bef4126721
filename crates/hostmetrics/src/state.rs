//! Application state shared across HTTP handlers

use std::sync::{Arc, Mutex};

use hostmetrics_collector::Exporter;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Exporter; scrapes are serialized on its lock
    pub exporter: Arc<Mutex<Exporter>>,
}

impl AppState {
    /// Create new application state
    pub fn new(exporter: Arc<Mutex<Exporter>>) -> Self {
        Self { exporter }
    }
}
