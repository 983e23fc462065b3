use crate::errors::{CsvFlowError, CsvFlowResult};
use crate::observability::BenchReport;
use crate::options::IngestOptions;
use crate::pipeline::{self, Source};
use crate::writers::{self, RowWriter};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

const PROGRESS_EVERY: u64 = 1 << 16;

#[derive(Debug, Clone, Default)]
pub struct BenchConfig {
    /// Show a spinner on stderr while rows are read.
    pub progress: bool,
    /// Also write every row here; format follows the extension.
    pub output: Option<PathBuf>,
}

/// Ingest `path` once, start to finish, and time it.
pub fn run_benchmark(
    path: &Path,
    options: &IngestOptions,
    config: &BenchConfig,
) -> CsvFlowResult<BenchReport> {
    info!("Reading {:?}", path);
    let start = Instant::now();

    let mut rows = pipeline::open(Source::from(path), options)?;
    info!("Schema has {} columns", rows.schema().len());

    let mut sink: Option<Box<dyn RowWriter>> = match &config.output {
        Some(out) => {
            info!("Writing rows to {:?}", out);
            Some(writers::for_path(out, rows.schema())?)
        }
        None => None,
    };

    let pb = if config.progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .map_err(|e| CsvFlowError::Unknown(e.into()))?,
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut count: u64 = 0;
    for row in rows.by_ref() {
        let row = row?;
        if let Some(sink) = sink.as_mut() {
            sink.write_row(&row)?;
        }
        count += 1;
        if count % PROGRESS_EVERY == 0 {
            pb.set_message(format!("{} rows", count));
            pb.tick();
        }
    }
    if let Some(sink) = sink.as_mut() {
        sink.finish()?;
    }

    let elapsed = start.elapsed();
    pb.finish_and_clear();

    let report = BenchReport::new(rows.stats(), elapsed);
    info!(
        "Parsed {} rows in {:.2}s ({} comment lines, {} skipped)",
        report.rows, report.duration_secs, report.stats.comment_lines, report.stats.rows_skipped
    );
    Ok(report)
}
