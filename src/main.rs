use chrono::Utc;
use clap::{Parser, ValueEnum};
use csvflow::errors::CsvFlowError;
use csvflow::observability::{InputFileStats, Lineage};
use csvflow::{
    BenchConfig, Compression, Encoding, IngestOptions, MalformedPolicy, MismatchPolicy,
    ScalarType,
};
use miette::Result;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, ValueEnum, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "csvflow")]
#[command(version = "0.1.0")]
#[command(about = "Streaming gzip CSV ingestion benchmark", long_about = None)]
struct Cli {
    /// Gzip-compressed (or plain) CSV file to ingest
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Field delimiter (a single ASCII character, or "tab")
    #[arg(long, value_parser = parse_byte, default_value = ",")]
    delimiter: u8,

    /// Quote character
    #[arg(long, value_parser = parse_byte, default_value = "\"")]
    quote: u8,

    /// Comment marker; lines starting with it are skipped
    #[arg(long, value_parser = parse_byte, default_value = "#", conflicts_with = "no_comment")]
    comment: u8,

    /// Treat every line as data
    #[arg(long)]
    no_comment: bool,

    /// The first record is data; columns are named column_1, column_2, ...
    #[arg(long)]
    no_header: bool,

    /// How to handle rows whose field count differs from the header's
    #[arg(long, value_enum, default_value_t = MismatchPolicy::Strict)]
    mismatch: MismatchPolicy,

    /// Skip malformed rows instead of failing
    #[arg(long)]
    lenient: bool,

    /// Keep only these columns, in this order
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Declare a column type, e.g. --dtype source_id=string
    #[arg(long, value_name = "NAME=TYPE", value_parser = parse_dtype)]
    dtype: Vec<(String, ScalarType)>,

    /// Infer column types from this many leading rows
    #[arg(long, value_name = "N", default_value_t = 0)]
    infer_rows: usize,

    /// Read-ahead buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = csvflow::options::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    #[arg(long, value_enum, default_value_t = Encoding::Utf8)]
    encoding: Encoding,

    #[arg(long, value_enum, default_value_t = Compression::Auto)]
    compression: Compression,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Also write rows to this .csv or .jsonl file
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (Info -> Debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Silence all logs
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format (text or json)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            delimiter: self.delimiter,
            quote: self.quote,
            comment: (!self.no_comment).then_some(self.comment),
            has_header: !self.no_header,
            mismatch: self.mismatch,
            malformed: if self.lenient {
                MalformedPolicy::Skip
            } else {
                MalformedPolicy::Fail
            },
            encoding: self.encoding,
            compression: self.compression,
            buffer_size: self.buffer_size,
            columns: self.columns.clone(),
            dtypes: self.dtype.iter().cloned().collect(),
            infer_schema_rows: self.infer_rows,
            ..Default::default()
        }
    }
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    match s {
        "tab" | "\\t" => Ok(b'\t'),
        _ => match s.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(format!("expected a single ASCII character, got {:?}", s)),
        },
    }
}

fn parse_dtype(s: &str) -> std::result::Result<(String, ScalarType), String> {
    let (name, ty) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=TYPE, got {:?}", s))?;
    Ok((name.to_string(), ty.parse()?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // CSVFLOW_LOG overrides the CLI level
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("CSVFLOW_LOG")
        .from_env_lossy();

    let run_id = Uuid::new_v4();

    // stdout carries the report only
    match cli.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_span_list(false)
                .with_current_span(false)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let _span = tracing::info_span!("root", run_id = %run_id).entered();

    let options = cli.ingest_options();
    let config = BenchConfig {
        progress: !cli.quiet,
        output: cli.output.clone(),
    };

    let mut report = csvflow::run_benchmark(&cli.path, &options, &config)?;

    match cli.format {
        ReportFormat::Text => println!("{}", report.render_text()),
        ReportFormat::Json => {
            let input =
                InputFileStats::from_path(&cli.path).map_err(|source| CsvFlowError::Open {
                    path: cli.path.clone(),
                    source,
                })?;
            report.lineage = Some(Lineage {
                run_id: run_id.to_string(),
                timestamp: Utc::now(),
                input,
                options,
                output: cli.output.as_ref().map(|p| p.display().to_string()),
            });
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CsvFlowError::Unknown(e.into()))?;
            println!("{}", json);
        }
    }

    Ok(())
}
