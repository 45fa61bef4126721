//! Error types for hostmetrics-collector

use hostmetrics_mi::MiError;
use thiserror::Error;

/// Errors that can occur while collecting or exporting metrics
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Query, decode or lifecycle error from the provider client
    #[error(transparent)]
    Mi(#[from] MiError),

    /// Metric could not be created, registered or encoded
    #[error("metric error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Counter sample that cannot be exported
    #[error("invalid sample for {metric}: {value}")]
    InvalidSample {
        /// Fully qualified metric name
        metric: String,
        /// Rejected value
        value: f64,
    },

    /// Collector name not known to this build
    #[error("unknown collector: {0}")]
    UnknownCollector(String),

    /// Text exposition was not valid UTF-8
    #[error("encoding failed: {0}")]
    Encode(String),
}

impl CollectorError {
    /// Check if the next scrape may succeed without intervention
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollectorError::Mi(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_provider_error() {
        let err = CollectorError::from(MiError::ConnectionFailed("reset".to_string()));
        assert!(err.is_retryable());
        let err = CollectorError::from(MiError::ElementNotFound("Name".to_string()));
        assert!(!err.is_retryable());
        assert!(!CollectorError::UnknownCollector("gpu".to_string()).is_retryable());
    }

    #[test]
    fn test_transparent_display() {
        let err = CollectorError::from(MiError::Execution("invalid class Foo".to_string()));
        assert_eq!(err.to_string(), "query execution failed: invalid class Foo");
    }
}
