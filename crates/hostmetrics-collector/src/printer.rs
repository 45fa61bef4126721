//! Printer and print queue state from `win32_Printer` / `win32_PrintJob`

use std::collections::BTreeMap;

use hostmetrics_mi::query::queries;
use hostmetrics_mi::{Namespace, Query, Session};
use tracing::debug;

use crate::collector::{Collector, ScrapeContext};
use crate::error::CollectorError;
use crate::metrics::MetricSet;

pub const NAME: &str = "printer";

/// `PrinterStatus` codes and their names
pub const PRINTER_STATUSES: [(u16, &str); 7] = [
    (1, "Other"),
    (2, "Unknown"),
    (3, "Idle"),
    (4, "Printing"),
    (5, "Warmup"),
    (6, "Stopped Printing"),
    (7, "Offline"),
];

hostmetrics_mi::mi_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Win32Printer {
        pub name: String => "Name",
        pub default: bool => "Default",
        pub printer_status: u16 => "PrinterStatus",
        pub job_count: u32 => "JobCountSinceLastReset",
    }
}

hostmetrics_mi::mi_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Win32PrintJob {
        /// `<printer>, <job id>`
        pub name: String => "Name",
        pub status: Option<String> => "Status",
    }
}

impl Win32PrintJob {
    /// Printer the job is queued on
    #[must_use]
    pub fn printer(&self) -> &str {
        self.name
            .rsplit_once(", ")
            .map_or(self.name.as_str(), |(printer, _)| printer)
    }
}

/// Collector for installed printers and their queues
#[derive(Debug)]
pub struct PrinterCollector {
    printers: Query,
    print_jobs: Query,
}

impl PrinterCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            printers: queries::printers(),
            print_jobs: queries::print_jobs(),
        }
    }

    fn collect_printers(
        &self,
        session: &Session,
        metrics: &mut MetricSet,
    ) -> Result<(), CollectorError> {
        let mut printers: Vec<Win32Printer> = Vec::new();
        session.query(&mut printers, &Namespace::ROOT_CIMV2, &self.printers)?;

        for printer in &printers {
            let name = printer.name.as_str();
            for (code, status) in PRINTER_STATUSES {
                metrics.gauge_with_labels(
                    "status",
                    "Printer status, one series per status set to 1 for the current one",
                    &[("printer", name), ("status", status)],
                    if printer.printer_status == code { 1.0 } else { 0.0 },
                )?;
            }
            metrics.gauge_with_labels(
                "default",
                "Whether the printer is the default printer",
                &[("printer", name)],
                if printer.default { 1.0 } else { 0.0 },
            )?;
            metrics.counter_with_labels(
                "job_count",
                "Jobs sent to the printer since its counters were last reset",
                &[("printer", name)],
                f64::from(printer.job_count),
            )?;
        }
        debug!(collector = NAME, printers = printers.len(), "printers collected");

        Ok(())
    }

    fn collect_print_jobs(
        &self,
        session: &Session,
        metrics: &mut MetricSet,
    ) -> Result<(), CollectorError> {
        let mut jobs: Vec<Win32PrintJob> = Vec::new();
        session.query(&mut jobs, &Namespace::ROOT_CIMV2, &self.print_jobs)?;

        let mut by_status: BTreeMap<(&str, &str), u32> = BTreeMap::new();
        for job in &jobs {
            let status = job.status.as_deref().unwrap_or("Unknown");
            *by_status.entry((job.printer(), status)).or_default() += 1;
        }
        for ((printer, status), count) in by_status {
            metrics.gauge_with_labels(
                "job_status",
                "Queued print jobs per printer and job status",
                &[("printer", printer), ("status", status)],
                f64::from(count),
            )?;
        }
        debug!(collector = NAME, jobs = jobs.len(), "print jobs collected");

        Ok(())
    }
}

impl Default for PrinterCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for PrinterCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build(&mut self, session: &Session) -> Result<(), CollectorError> {
        // Fails early on hosts without the print spooler classes
        let mut printers: Vec<Win32Printer> = Vec::new();
        session.query(&mut printers, &Namespace::ROOT_CIMV2, &self.printers)?;
        Ok(())
    }

    fn collect(
        &mut self,
        ctx: &ScrapeContext<'_>,
        metrics: &mut MetricSet,
    ) -> Result<(), CollectorError> {
        self.collect_printers(ctx.session, metrics)?;
        self.collect_print_jobs(ctx.session, metrics)
    }
}
