//! Streaming pipeline: byte stream -> tokenizer -> assembler -> rows.
//!
//! Nothing is materialized beyond the current record, except the bounded
//! sample buffer used for schema inference.

use crate::assembler::{RowAssembler, TextRow};
use crate::errors::{CsvFlowError, CsvFlowResult, ErrorKind};
use crate::io::ByteStream;
use crate::options::{IngestOptions, MalformedPolicy};
use crate::row::Row;
use crate::schema::Schema;
use crate::tokenizer::{Dialect, Tokenizer};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Read;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub enum Source {
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

/// Counters for one ingestion pass. Timing is left to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    /// Data rows yielded to the consumer.
    pub rows_parsed: u64,
    /// Records tokenized, header included.
    pub records: u64,
    pub comment_lines: u64,
    /// Malformed rows dropped under `MalformedPolicy::Skip`.
    pub rows_skipped: u64,
    /// Decompressed bytes pulled from the source.
    pub bytes_read: u64,
    /// Size of the source file, when known.
    pub compressed_bytes: Option<u64>,
}

/// Open `source` and read its header. The returned iterator yields rows in
/// file order and is fused after the first error.
pub fn open(source: Source, options: &IngestOptions) -> CsvFlowResult<RowIterator> {
    options.validate()?;
    let stream = match source {
        Source::Path(path) => ByteStream::open(&path, options.compression)?,
        Source::Reader(reader) => ByteStream::from_reader(reader, options.compression)?,
    };

    let mut records = RecordReader {
        tokenizer: Tokenizer::new(stream, Dialect::from(options), options.buffer_size),
        malformed: options.malformed,
        rows_skipped: 0,
    };

    if !records.advance()? {
        return Err(CsvFlowError::EmptySource);
    }

    let (mut assembler, first) = {
        let record = records.tokenizer.record();
        if options.has_header {
            (RowAssembler::from_header(&record, options)?, None)
        } else {
            let assembler = RowAssembler::headerless(record.len(), options);
            let first = assembler.decode_text(&record)?;
            (assembler, Some(first))
        }
    };

    let mut pending = VecDeque::new();
    if options.infer_schema_rows > 0 {
        let mut samples: Vec<TextRow> = first.into_iter().collect();
        while samples.len() < options.infer_schema_rows && records.advance()? {
            samples.push(assembler.decode_text(&records.tokenizer.record())?);
        }
        debug!("Inferring column types from {} rows", samples.len());
        pending.extend(assembler.infer(samples));
    } else if let Some(first) = first {
        pending.push_back(assembler.coerce_text(first));
    }

    debug!(
        "Schema: [{}]",
        assembler
            .schema()
            .columns()
            .iter()
            .map(|c| match c.dtype {
                Some(t) => format!("{}: {}", c.name, t),
                None => c.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(RowIterator {
        records,
        assembler,
        pending,
        rows_parsed: 0,
        done: false,
    })
}

/// Tokenizer plus the malformed-row policy.
struct RecordReader {
    tokenizer: Tokenizer<ByteStream>,
    malformed: MalformedPolicy,
    rows_skipped: u64,
}

impl RecordReader {
    /// Read the next record, dropping malformed ones when the policy allows.
    fn advance(&mut self) -> CsvFlowResult<bool> {
        loop {
            match self.tokenizer.read_record() {
                Ok(more) => return Ok(more),
                Err(e)
                    if self.malformed == MalformedPolicy::Skip
                        && e.kind() == ErrorKind::MalformedRow =>
                {
                    warn!("Skipping {}", e);
                    self.rows_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct RowIterator {
    records: RecordReader,
    assembler: RowAssembler,
    pending: VecDeque<Row>,
    rows_parsed: u64,
    done: bool,
}

impl RowIterator {
    pub fn schema(&self) -> &Schema {
        self.assembler.schema()
    }

    pub fn stats(&self) -> IngestionStats {
        let tokenizer = &self.records.tokenizer;
        let stream = tokenizer.get_ref();
        IngestionStats {
            rows_parsed: self.rows_parsed,
            records: tokenizer.records(),
            comment_lines: tokenizer.comment_lines(),
            rows_skipped: self.records.rows_skipped,
            bytes_read: stream.position(),
            compressed_bytes: stream.compressed_len(),
        }
    }

    fn next_row(&mut self) -> CsvFlowResult<Option<Row>> {
        if !self.records.advance()? {
            return Ok(None);
        }
        self.assembler
            .assemble(&self.records.tokenizer.record())
            .map(Some)
    }
}

impl Iterator for RowIterator {
    type Item = CsvFlowResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.pending.pop_front() {
            self.rows_parsed += 1;
            return Some(Ok(row));
        }
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => {
                self.rows_parsed += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                self.done = true;
                debug!("Exhausted source after {} rows", self.rows_parsed);
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for RowIterator {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Scalar;
    use crate::schema::ScalarType;
    use std::io::Cursor;

    fn reader(input: &str) -> Source {
        Source::Reader(Box::new(Cursor::new(input.as_bytes().to_vec())))
    }

    #[test]
    fn test_schema_available_before_iteration() {
        let iter = open(reader("a,b\n1,2\n"), &IngestOptions::default()).unwrap();
        assert_eq!(iter.schema().names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(iter.stats().rows_parsed, 0);
    }

    #[test]
    fn test_empty_source() {
        let err = open(reader("#just a comment\n\n"), &IngestOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::EmptySource);
    }

    #[test]
    fn test_headerless() {
        let opts = IngestOptions {
            has_header: false,
            ..Default::default()
        };
        let iter = open(reader("1,x\n2,y\n"), &opts).unwrap();
        assert_eq!(
            iter.schema().names().collect::<Vec<_>>(),
            vec!["column_1", "column_2"]
        );
        let rows: Vec<Row> = iter.collect::<CsvFlowResult<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values(), &[Scalar::Int(1), Scalar::from("x")]);
        assert_eq!(rows[0].position().record, 1);
    }

    #[test]
    fn test_fused_after_error() {
        let mut iter = open(reader("a,b\n1,2,3\n4,5\n"), &IngestOptions::default()).unwrap();
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_lenient_skips_malformed_row() {
        let opts = IngestOptions {
            malformed: MalformedPolicy::Skip,
            ..Default::default()
        };
        let mut iter = open(reader("a,b\n1,2\n3,\"open\n"), &opts).unwrap();
        let rows: Vec<Row> = iter.by_ref().collect::<CsvFlowResult<_>>().unwrap();
        assert_eq!(rows.len(), 1);
        let stats = iter.stats();
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.rows_parsed, 1);
    }

    #[test]
    fn test_strict_malformed_fails() {
        let iter = open(reader("a,b\n1,2\n3,\"open\n"), &IngestOptions::default()).unwrap();
        let result: CsvFlowResult<Vec<Row>> = iter.collect();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedRow);
    }

    #[test]
    fn test_inference_buffers_bounded_sample() {
        let opts = IngestOptions {
            infer_schema_rows: 2,
            ..Default::default()
        };
        let mut iter = open(reader("x,y\n1,true\n2.5,false\n3,maybe\n"), &opts).unwrap();
        let types: Vec<Option<ScalarType>> =
            iter.schema().columns().iter().map(|c| c.dtype).collect();
        assert_eq!(types, vec![Some(ScalarType::Float), Some(ScalarType::Boolean)]);

        let rows: Vec<Row> = iter.by_ref().collect::<CsvFlowResult<_>>().unwrap();
        assert_eq!(rows[0].values(), &[Scalar::Float(1.0), Scalar::Bool(true)]);
        // past the sample the inferred types still apply; misfits degrade
        assert_eq!(rows[2].values(), &[Scalar::Float(3.0), Scalar::from("maybe")]);
        assert_eq!(iter.stats().rows_parsed, 3);
    }

    #[test]
    fn test_stats() {
        let input = "#c1\na,b\n#c2\n1,2\n3,4\n";
        let mut iter = open(reader(input), &IngestOptions::default()).unwrap();
        for row in iter.by_ref() {
            row.unwrap();
        }
        let stats = iter.stats();
        assert_eq!(stats.rows_parsed, 2);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.comment_lines, 2);
        assert_eq!(stats.bytes_read, input.len() as u64);
        assert_eq!(stats.compressed_bytes, None);
    }

    #[test]
    fn test_invalid_options() {
        let opts = IngestOptions {
            delimiter: b'"',
            ..Default::default()
        };
        let err = open(reader("a\n"), &opts).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
