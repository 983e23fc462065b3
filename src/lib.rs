//! Streaming ingestion of gzip-compressed CSV files.
//!
//! ```no_run
//! use csvflow::{open, IngestOptions, Source};
//!
//! let mut rows = open(Source::from("data.csv.gz"), &IngestOptions::default())?;
//! for row in rows.by_ref() {
//!     let row = row?;
//!     println!("{:?}", row.values());
//! }
//! println!("{:?}", rows.stats());
//! # Ok::<(), csvflow::CsvFlowError>(())
//! ```

pub mod assembler;
pub mod errors;
pub mod io;
pub mod observability;
pub mod options;
pub mod pipeline;
pub mod row;
pub mod runner;
pub mod schema;
pub mod tokenizer;
pub mod writers;

pub use errors::{CsvFlowError, CsvFlowResult, ErrorKind, Position};
pub use io::Compression;
pub use observability::BenchReport;
pub use options::{Encoding, IngestOptions, MalformedPolicy, MismatchPolicy};
pub use pipeline::{open, IngestionStats, RowIterator, Source};
pub use row::{Row, Scalar};
pub use runner::{run_benchmark, BenchConfig};
pub use schema::{Column, ScalarType, Schema};
