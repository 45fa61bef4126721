//! Runs the enabled collectors against one warm session

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use hostmetrics_mi::{Application, DestinationOptions, PerfSource, Provider, Session};
use prometheus::proto::MetricFamily;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::CacheCollector;
use crate::collector::{Collector, ScrapeContext};
use crate::error::CollectorError;
use crate::metrics::MetricSet;
use crate::printer::PrinterCollector;

/// Collector names this build knows, in scrape order
pub const AVAILABLE_COLLECTORS: &[&str] = &[crate::cache::NAME, crate::printer::NAME];

/// Instantiate collectors by name
///
/// # Errors
/// [`CollectorError::UnknownCollector`] for a name not in
/// [`AVAILABLE_COLLECTORS`].
pub fn collectors_by_name<S: AsRef<str>>(
    names: &[S],
) -> Result<Vec<Box<dyn Collector>>, CollectorError> {
    names
        .iter()
        .map(|name| match name.as_ref() {
            crate::cache::NAME => Ok(Box::new(CacheCollector::new()) as Box<dyn Collector>),
            crate::printer::NAME => Ok(Box::new(PrinterCollector::new()) as Box<dyn Collector>),
            other => Err(CollectorError::UnknownCollector(other.to_string())),
        })
        .collect()
}

/// Outcome of one collector in one scrape
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOutcome {
    pub name: &'static str,
    pub success: bool,
    pub duration_secs: f64,
}

/// Owns the provider runtime, a warm session and the collectors
pub struct Exporter {
    collectors: Vec<Box<dyn Collector>>,
    perf: Arc<dyn PerfSource>,
    session: Session,
    application: Application,
}

impl Exporter {
    /// Initialize the runtime, open the session and build every collector
    ///
    /// Collectors whose build fails are logged and left out.
    ///
    /// # Errors
    /// Returns an error if the runtime cannot be initialized or the session
    /// cannot be opened.
    pub fn new(
        provider: Arc<dyn Provider>,
        perf: Arc<dyn PerfSource>,
        options: &DestinationOptions,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Result<Self, CollectorError> {
        let application = Application::initialize(provider)?;
        let session = application.new_session(Some(options))?;

        let collectors = collectors
            .into_iter()
            .filter_map(|mut collector| match collector.build(&session) {
                Ok(()) => {
                    debug!(collector = collector.name(), "collector built");
                    Some(collector)
                }
                Err(e) => {
                    warn!(collector = collector.name(), error = %e, "collector disabled");
                    None
                }
            })
            .collect::<Vec<_>>();

        info!(
            collectors = ?collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "exporter ready"
        );

        Ok(Self {
            collectors,
            perf,
            session,
            application,
        })
    }

    /// Names of the collectors that built successfully
    #[must_use]
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn perf_objects(&self) -> HashMap<String, hostmetrics_mi::PerfObject> {
        let mut names: Vec<String> = self
            .collectors
            .iter()
            .flat_map(|c| c.perf_counters().iter().map(|n| (*n).to_string()))
            .collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return HashMap::new();
        }

        self.perf.perf_objects(&names).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read perf counter table");
            HashMap::new()
        })
    }

    /// Collect every enabled collector once
    ///
    /// A failing collector is logged and reported through
    /// `hostmetrics_exporter_collector_success`; it never fails the scrape.
    ///
    /// # Errors
    /// Returns an error only if the exporter's own metrics cannot be built.
    #[instrument(skip(self))]
    pub fn scrape(&mut self) -> Result<Vec<MetricFamily>, CollectorError> {
        let ctx = ScrapeContext {
            session: &self.session,
            perf_objects: self.perf_objects(),
        };

        let mut families = Vec::new();
        let mut outcomes = Vec::with_capacity(self.collectors.len());
        for collector in &mut self.collectors {
            let name = collector.name();
            let mut metrics = MetricSet::new(name);
            let start = Instant::now();
            let result = collector.collect(&ctx, &mut metrics);
            let duration_secs = start.elapsed().as_secs_f64();

            let success = match result {
                Ok(()) => {
                    families.extend(metrics.gather());
                    true
                }
                Err(e) => {
                    error!(collector = name, error = %e, retryable = e.is_retryable(), "collector failed");
                    false
                }
            };
            outcomes.push(CollectorOutcome {
                name,
                success,
                duration_secs,
            });
        }

        families.extend(exporter_metrics(&outcomes)?);
        Ok(families)
    }

    /// Close the collectors, the session and the runtime
    ///
    /// # Errors
    /// Returns the first error hit; every resource is still released.
    pub fn close(mut self) -> Result<(), CollectorError> {
        let mut first_error = None;
        for collector in &mut self.collectors {
            if let Err(e) = collector.close() {
                warn!(collector = collector.name(), error = %e, "failed to close collector");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.session.close() {
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.application.close() {
            first_error.get_or_insert(e.into());
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn exporter_metrics(outcomes: &[CollectorOutcome]) -> Result<Vec<MetricFamily>, CollectorError> {
    let mut metrics = MetricSet::new("exporter");
    for outcome in outcomes {
        let labels = [("collector", outcome.name)];
        metrics.gauge_with_labels(
            "collector_success",
            "Whether the collector succeeded in the last scrape",
            &labels,
            if outcome.success { 1.0 } else { 0.0 },
        )?;
        metrics.gauge_with_labels(
            "collector_duration_seconds",
            "Time the collector took in the last scrape",
            &labels,
            outcome.duration_secs,
        )?;
    }
    Ok(metrics.gather())
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("collectors", &self.collector_names())
            .field("session", &self.session)
            .field("application", &self.application)
            .finish()
    }
}
