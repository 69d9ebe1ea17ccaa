//! One poll's worth of exposition text into the store.
//!
//! [`ingest`] is the step the poll loop runs after each successful scrape:
//! skip comments, parse every line, reassemble histograms, then write raw
//! samples and histograms to the store. Bad lines are logged and skipped;
//! they never abort the batch.

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::histogram::reconstruct;
use crate::parse::parse_line;
use crate::store::Store;

/// A line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// One-based position of the line in the batch.
    pub line_number: usize,
    /// Why it was skipped.
    pub error: ParseError,
}

/// Summary of one ingested batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Lines seen, including comments and blanks.
    pub lines: usize,
    /// Lines that parsed into a sample.
    pub samples: usize,
    /// Samples written as raw series after reconstruction.
    pub series_written: usize,
    /// Histograms stored.
    pub histograms_written: usize,
    /// Lines that failed to parse.
    pub skipped: Vec<SkippedLine>,
}

impl IngestReport {
    /// Returns `true` if every non-comment line parsed.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Ingests one scrape body into `store`.
///
/// # Examples
///
/// ```rust
/// use proq::{ingest, MetricKey, Store};
///
/// # fn main() -> proq::Result<()> {
/// let store = Store::with_capacity(10)?;
/// let body = "\
/// ## HELP up Whether the target is up.
/// ## TYPE up gauge
/// up 1
/// lat_bucket{le=\"0.5\"} 2
/// lat_bucket{le=\"+Inf\"} 3
/// lat_count 3
/// lat_sum 1.1
/// ";
///
/// let report = ingest(&store, body);
/// assert_eq!(report.series_written, 1);
/// assert_eq!(report.histograms_written, 1);
/// assert_eq!(store.samples(&MetricKey::bare("up"))?.values, vec![1.0]);
/// assert_eq!(store.get_histogram(&MetricKey::bare("lat"))?.bins.len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn ingest(store: &Store, body: &str) -> IngestReport {
    ingest_lines(store, body.lines())
}

/// Ingests an already split batch of lines into `store`.
///
/// Blank lines and lines starting with `#` are skipped silently. Raw
/// samples are written in the order they were received.
pub fn ingest_lines<'a, I>(store: &Store, lines: I) -> IngestReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = IngestReport::default();
    let mut samples = Vec::new();

    for (i, line) in lines.into_iter().enumerate() {
        report.lines += 1;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed) {
            Ok(sample) => samples.push(sample),
            Err(error) => {
                let line_number = i + 1;
                warn!(line_number, %error, "skipping unparsable metric line");
                report.skipped.push(SkippedLine { line_number, error });
            }
        }
    }
    report.samples = samples.len();

    let reconstruction = reconstruct(samples);
    for sample in &reconstruction.residual {
        store.update(sample);
    }
    report.series_written = reconstruction.residual.len();
    report.histograms_written = store.update_histograms(reconstruction.histograms.into_values());

    debug!(
        lines = report.lines,
        samples = report.samples,
        series = report.series_written,
        histograms = report.histograms_written,
        skipped = report.skipped.len(),
        "ingested batch"
    );
    report
}
