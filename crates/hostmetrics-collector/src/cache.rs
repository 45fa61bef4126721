//! File system cache counters from the `Cache` perf object

use hostmetrics_mi::MiError;
use hostmetrics_mi::perfdata::unmarshal_object;
use tracing::debug;

use crate::collector::{Collector, ScrapeContext};
use crate::error::CollectorError;
use crate::metrics::MetricSet;

pub const NAME: &str = "cache";

/// Perf object read by this collector
pub const PERF_OBJECT: &str = "Cache";

hostmetrics_mi::mi_record! {
    /// The single instance of the `Cache` perf object
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct CacheCounters {
        pub async_copy_reads: f64 => "Async Copy Reads/sec",
        pub async_data_maps: f64 => "Async Data Maps/sec",
        pub async_fast_reads: f64 => "Async Fast Reads/sec",
        pub async_mdl_reads: f64 => "Async MDL Reads/sec",
        pub async_pin_reads: f64 => "Async Pin Reads/sec",
        pub copy_read_hits: f64 => "Copy Read Hits %",
        pub copy_reads: f64 => "Copy Reads/sec",
        pub data_flushes: f64 => "Data Flushes/sec",
        pub data_flush_pages: f64 => "Data Flush Pages/sec",
        pub data_map_hits: f64 => "Data Map Hits %",
        pub data_map_pins: f64 => "Data Map Pins/sec",
        pub data_maps: f64 => "Data Maps/sec",
        pub dirty_pages: f64 => "Dirty Pages",
        pub dirty_page_threshold: f64 => "Dirty Page Threshold",
        pub fast_read_not_possibles: f64 => "Fast Read Not Possibles/sec",
        pub fast_read_resource_misses: f64 => "Fast Read Resource Misses/sec",
        pub fast_reads: f64 => "Fast Reads/sec",
        pub lazy_write_flushes: f64 => "Lazy Write Flushes/sec",
        pub lazy_write_pages: f64 => "Lazy Write Pages/sec",
        pub mdl_read_hits: f64 => "MDL Read Hits %",
        pub mdl_reads: f64 => "MDL Reads/sec",
        pub pin_read_hits: f64 => "Pin Read Hits %",
        pub pin_reads: f64 => "Pin Reads/sec",
        pub read_aheads: f64 => "Read Aheads/sec",
        pub sync_copy_reads: f64 => "Sync Copy Reads/sec",
        pub sync_data_maps: f64 => "Sync Data Maps/sec",
        pub sync_fast_reads: f64 => "Sync Fast Reads/sec",
        pub sync_mdl_reads: f64 => "Sync MDL Reads/sec",
        pub sync_pin_reads: f64 => "Sync Pin Reads/sec",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
}

struct Sample {
    metric: &'static str,
    help: &'static str,
    kind: Kind,
    value: f64,
}

const fn counter(metric: &'static str, help: &'static str, value: f64) -> Sample {
    Sample { metric, help, kind: Kind::Counter, value }
}

const fn gauge(metric: &'static str, help: &'static str, value: f64) -> Sample {
    Sample { metric, help, kind: Kind::Gauge, value }
}

impl CacheCounters {
    fn samples(&self) -> [Sample; 29] {
        [
            counter("async_copy_reads_total", "Copy reads that may wait for pages to be retrieved", self.async_copy_reads),
            counter("async_data_maps_total", "Data maps that may wait for pages to be retrieved", self.async_data_maps),
            counter("async_fast_reads_total", "Fast reads that may wait for data", self.async_fast_reads),
            counter("async_mdl_reads_total", "MDL reads that may wait for pages to be retrieved", self.async_mdl_reads),
            counter("async_pin_reads_total", "Pin reads that may wait for pages to be retrieved", self.async_pin_reads),
            gauge("copy_read_hits_percent", "Copy reads satisfied from the cache, in percent", self.copy_read_hits),
            counter("copy_reads_total", "Reads copied from the cache to an application buffer", self.copy_reads),
            counter("data_flushes_total", "Cache flushes of data pages", self.data_flushes),
            counter("data_flush_pages_total", "Pages written to disk by cache flushes", self.data_flush_pages),
            gauge("data_map_hits_percent", "Data maps resolved without a disk read, in percent", self.data_map_hits),
            counter("data_map_pins_total", "Data maps pinned in memory", self.data_map_pins),
            counter("data_maps_total", "Pages mapped from a file into the cache", self.data_maps),
            gauge("dirty_pages", "Pages in the cache not yet written to disk", self.dirty_pages),
            gauge("dirty_page_threshold", "Dirty pages above which writes are throttled", self.dirty_page_threshold),
            counter("fast_read_not_possibles_total", "Fast reads that fell back to a normal read", self.fast_read_not_possibles),
            counter("fast_read_resource_misses_total", "Fast reads missed for lack of resources", self.fast_read_resource_misses),
            counter("fast_reads_total", "Reads served from the cache bypassing the file system", self.fast_reads),
            counter("lazy_write_flushes_total", "Lazy writer flushes", self.lazy_write_flushes),
            counter("lazy_write_pages_total", "Pages written by the lazy writer", self.lazy_write_pages),
            gauge("mdl_read_hits_percent", "MDL reads satisfied from the cache, in percent", self.mdl_read_hits),
            counter("mdl_reads_total", "Reads through a memory descriptor list", self.mdl_reads),
            gauge("pin_read_hits_percent", "Pin reads satisfied from the cache, in percent", self.pin_read_hits),
            counter("pin_reads_total", "Reads that pin data in the cache", self.pin_reads),
            counter("read_aheads_total", "Sequential reads issued ahead of access", self.read_aheads),
            counter("sync_copy_reads_total", "Copy reads that wait for pages to be retrieved", self.sync_copy_reads),
            counter("sync_data_maps_total", "Data maps that wait for pages to be retrieved", self.sync_data_maps),
            counter("sync_fast_reads_total", "Fast reads that wait for data", self.sync_fast_reads),
            counter("sync_mdl_reads_total", "MDL reads that wait for pages to be retrieved", self.sync_mdl_reads),
            counter("sync_pin_reads_total", "Pin reads that wait for pages to be retrieved", self.sync_pin_reads),
        ]
    }
}

/// Collector for the system file cache
#[derive(Debug, Default)]
pub struct CacheCollector;

impl CacheCollector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Collector for CacheCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn perf_counters(&self) -> &'static [&'static str] {
        &[PERF_OBJECT]
    }

    fn collect(
        &mut self,
        ctx: &ScrapeContext<'_>,
        metrics: &mut MetricSet,
    ) -> Result<(), CollectorError> {
        // Single-instance object: anything other than one row is an error
        let mut dst: Vec<CacheCounters> = Vec::new();
        unmarshal_object(&ctx.perf_objects, PERF_OBJECT, &mut dst)?;
        let [cache] = dst.as_slice() else {
            return Err(MiError::UnexpectedInstanceCount {
                class: PERF_OBJECT.to_string(),
                found: dst.len(),
            }
            .into());
        };

        for sample in cache.samples() {
            match sample.kind {
                Kind::Counter => metrics.counter(sample.metric, sample.help, sample.value)?,
                Kind::Gauge => metrics.gauge(sample.metric, sample.help, sample.value)?,
            }
        }
        debug!(collector = NAME, "cache counters collected");

        Ok(())
    }
}
