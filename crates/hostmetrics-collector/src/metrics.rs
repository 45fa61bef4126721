//! Per-collector metric sets
//!
//! Every scrape builds a fresh [`MetricSet`] for each collector, so values
//! read from the provider are exported as-is rather than accumulated.

use std::collections::HashMap;

use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::CollectorError;

/// Prefix of every exported metric
pub const NAMESPACE: &str = "hostmetrics";

/// Metrics emitted by one collector during one scrape
///
/// Names are `hostmetrics_<subsystem>_<metric>`. The label names of a metric
/// are fixed by its first sample.
pub struct MetricSet {
    subsystem: String,
    registry: Registry,
    counters: HashMap<String, CounterVec>,
    gauges: HashMap<String, GaugeVec>,
}

fn split_labels<'a>(labels: &[(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
    labels.iter().copied().unzip()
}

impl MetricSet {
    pub fn new(subsystem: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            registry: Registry::new(),
            counters: HashMap::new(),
            gauges: HashMap::new(),
        }
    }

    #[must_use]
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(self.subsystem.clone())
    }

    fn qualified(&self, name: &str) -> String {
        format!("{NAMESPACE}_{}_{name}", self.subsystem)
    }

    /// Export a cumulative value without labels
    ///
    /// # Errors
    /// See [`MetricSet::counter_with_labels`].
    pub fn counter(&mut self, name: &str, help: &str, value: f64) -> Result<(), CollectorError> {
        self.counter_with_labels(name, help, &[], value)
    }

    /// Export a cumulative value
    ///
    /// # Errors
    /// [`CollectorError::InvalidSample`] for negative or non-finite values,
    /// or [`CollectorError::Metrics`] when the labels do not match the first
    /// sample of this metric.
    pub fn counter_with_labels(
        &mut self,
        name: &str,
        help: &str,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), CollectorError> {
        if !value.is_finite() || value < 0.0 {
            return Err(CollectorError::InvalidSample {
                metric: self.qualified(name),
                value,
            });
        }

        let (names, values) = split_labels(labels);
        let vec = match self.counters.get(name) {
            Some(vec) => vec.clone(),
            None => {
                let vec = CounterVec::new(self.opts(name, help), &names)?;
                self.registry.register(Box::new(vec.clone()))?;
                self.counters.insert(name.to_string(), vec.clone());
                vec
            }
        };
        vec.get_metric_with_label_values(values.as_slice())?
            .inc_by(value);
        Ok(())
    }

    /// Export a point-in-time value without labels
    ///
    /// # Errors
    /// See [`MetricSet::gauge_with_labels`].
    pub fn gauge(&mut self, name: &str, help: &str, value: f64) -> Result<(), CollectorError> {
        self.gauge_with_labels(name, help, &[], value)
    }

    /// Export a point-in-time value
    ///
    /// # Errors
    /// [`CollectorError::Metrics`] when the labels do not match the first
    /// sample of this metric.
    pub fn gauge_with_labels(
        &mut self,
        name: &str,
        help: &str,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), CollectorError> {
        let (names, values) = split_labels(labels);
        let vec = match self.gauges.get(name) {
            Some(vec) => vec.clone(),
            None => {
                let vec = GaugeVec::new(self.opts(name, help), &names)?;
                self.registry.register(Box::new(vec.clone()))?;
                self.gauges.insert(name.to_string(), vec.clone());
                vec
            }
        };
        vec.get_metric_with_label_values(values.as_slice())?
            .set(value);
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty()
    }

    /// Snapshot the set as metric families, sorted by name
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Render metric families in the Prometheus text exposition format
///
/// # Errors
/// Returns an error if the encoder rejects a family.
pub fn encode_text(families: &[MetricFamily]) -> Result<String, CollectorError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| CollectorError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names_and_types() {
        let mut set = MetricSet::new("cache");
        set.counter("copy_reads_total", "Copy reads", 12.0).unwrap();
        set.gauge("dirty_pages", "Dirty pages", 3.0).unwrap();

        let text = encode_text(&set.gather()).unwrap();
        assert!(text.contains("# TYPE hostmetrics_cache_copy_reads_total counter"));
        assert!(text.contains("hostmetrics_cache_copy_reads_total 12"));
        assert!(text.contains("# TYPE hostmetrics_cache_dirty_pages gauge"));
        assert!(text.contains("hostmetrics_cache_dirty_pages 3"));
    }

    #[test]
    fn test_labelled_gauge() {
        let mut set = MetricSet::new("printer");
        set.gauge_with_labels("status", "Status", &[("printer", "Office"), ("status", "Idle")], 1.0)
            .unwrap();
        set.gauge_with_labels("status", "Status", &[("printer", "Office"), ("status", "Offline")], 0.0)
            .unwrap();

        let text = encode_text(&set.gather()).unwrap();
        assert!(text.contains(r#"hostmetrics_printer_status{printer="Office",status="Idle"} 1"#));
        assert!(text.contains(r#"hostmetrics_printer_status{printer="Office",status="Offline"} 0"#));
    }

    #[test]
    fn test_label_arity_mismatch() {
        let mut set = MetricSet::new("printer");
        set.gauge_with_labels("job_count", "Jobs", &[("printer", "Office")], 1.0)
            .unwrap();
        let err = set.gauge("job_count", "Jobs", 1.0).unwrap_err();
        assert!(matches!(err, CollectorError::Metrics(_)));
    }

    #[test]
    fn test_negative_counter_rejected() {
        let mut set = MetricSet::new("cache");
        let err = set.counter("reads_total", "Reads", -1.0).unwrap_err();
        assert!(matches!(
            err,
            CollectorError::InvalidSample { ref metric, .. } if metric == "hostmetrics_cache_reads_total"
        ));
        assert!(set.is_empty());
    }
}
