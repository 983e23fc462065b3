use crate::options::IngestOptions;
use crate::pipeline::IngestionStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

// Shortest duration a rate is computed over.
const MIN_DURATION: Duration = Duration::from_micros(1);

/// Result of one timed ingestion pass.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub rows: u64,
    pub duration_secs: f64,
    pub rows_per_sec: f64,
    pub bytes_read: u64,
    pub mb_per_sec: f64,
    pub stats: IngestionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage: Option<Lineage>,
}

impl BenchReport {
    pub fn new(stats: IngestionStats, elapsed: Duration) -> Self {
        let secs = elapsed.max(MIN_DURATION).as_secs_f64();
        let rows = stats.rows_parsed;
        let rows_per_sec = if rows == 0 { 0.0 } else { rows as f64 / secs };
        Self {
            rows,
            duration_secs: elapsed.as_secs_f64(),
            rows_per_sec,
            bytes_read: stats.bytes_read,
            mb_per_sec: stats.bytes_read as f64 / (1024.0 * 1024.0) / secs,
            stats,
            lineage: None,
        }
    }

    /// The two-line summary printed by the CLI.
    pub fn render_text(&self) -> String {
        format!(
            "Parsed {} rows in {:.2}s\nRate: {} rows/sec",
            format_thousands(self.rows),
            self.duration_secs,
            format_thousands(self.rows_per_sec as u64)
        )
    }
}

/// Where a report came from: which run, which input, with which options.
#[derive(Debug, Clone, Serialize)]
pub struct Lineage {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub input: InputFileStats,
    pub options: IngestOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFileStats {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

impl InputFileStats {
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        Ok(Self {
            path: path.display().to_string(),
            sha256: compute_file_hash(path)?,
            size_bytes: path.metadata()?.len(),
        })
    }
}

pub fn compute_file_hash<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// `1234567` -> `"1,234,567"`.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(360856), "360,856");
    }

    #[test]
    fn test_report_rates() {
        let stats = IngestionStats {
            rows_parsed: 1000,
            bytes_read: 2 * 1024 * 1024,
            ..Default::default()
        };
        let report = BenchReport::new(stats, Duration::from_secs(2));
        assert_eq!(report.rows_per_sec, 500.0);
        assert_eq!(report.mb_per_sec, 1.0);
        assert_eq!(
            report.render_text(),
            "Parsed 1,000 rows in 2.00s\nRate: 500 rows/sec"
        );
    }

    #[test]
    fn test_zero_rows_and_zero_duration() {
        let report = BenchReport::new(IngestionStats::default(), Duration::ZERO);
        assert_eq!(report.rows_per_sec, 0.0);
        assert!(report.mb_per_sec.is_finite());

        let stats = IngestionStats {
            rows_parsed: 5,
            ..Default::default()
        };
        let report = BenchReport::new(stats, Duration::ZERO);
        assert!(report.rows_per_sec.is_finite());
        assert!(report.rows_per_sec > 0.0);
    }

    #[test]
    fn test_rate_is_truncated() {
        let stats = IngestionStats {
            rows_parsed: 2999,
            ..Default::default()
        };
        let report = BenchReport::new(stats, Duration::from_secs(2));
        assert!(report.render_text().ends_with("Rate: 1,499 rows/sec"));
    }

    #[test]
    fn test_file_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let hash = compute_file_hash(file.path()).unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let stats = InputFileStats::from_path(file.path()).unwrap();
        assert_eq!(stats.size_bytes, 3);
    }
}
