//! hostmetrics-collector: metric collectors over hostmetrics-mi
//!
//! Collectors read the management provider and the perf counter table
//! through one warm session and export Prometheus metric families.

pub mod cache;
pub mod collector;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod printer;

pub use cache::CacheCollector;
pub use collector::{Collector, ScrapeContext};
pub use error::CollectorError;
pub use exporter::{AVAILABLE_COLLECTORS, CollectorOutcome, Exporter, collectors_by_name};
pub use metrics::{MetricSet, encode_text};
pub use printer::PrinterCollector;
