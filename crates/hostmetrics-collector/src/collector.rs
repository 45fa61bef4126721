//! Collector trait and scrape context

use std::collections::HashMap;

use hostmetrics_mi::{PerfObject, Session};

use crate::error::CollectorError;
use crate::metrics::MetricSet;

/// Inputs shared by every collector during one scrape
pub struct ScrapeContext<'a> {
    /// Warm session owned by the exporter
    pub session: &'a Session,
    /// Perf objects requested by the enabled collectors, keyed by name
    pub perf_objects: HashMap<String, PerfObject>,
}

/// A source of metrics
///
/// Collectors are built once against the exporter's session and then
/// collected on every scrape. A failing collector never affects the others.
pub trait Collector: Send {
    /// Subsystem name, used in metric names and the enable list
    fn name(&self) -> &'static str;

    /// Perf objects this collector reads from the counter table
    fn perf_counters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Prepare for scraping
    ///
    /// # Errors
    /// Returns an error if the collector cannot work on this host.
    fn build(&mut self, _session: &Session) -> Result<(), CollectorError> {
        Ok(())
    }

    /// Emit this scrape's samples into `metrics`
    ///
    /// # Errors
    /// Returns the first query, decode or metric error.
    fn collect(
        &mut self,
        ctx: &ScrapeContext<'_>,
        metrics: &mut MetricSet,
    ) -> Result<(), CollectorError>;

    /// Release anything acquired in [`Collector::build`]
    ///
    /// # Errors
    /// Returns an error if a held resource fails to close.
    fn close(&mut self) -> Result<(), CollectorError> {
        Ok(())
    }
}
