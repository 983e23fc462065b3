//! Row sinks used by the benchmark's `--output` option.

use crate::errors::{CsvFlowError, CsvFlowResult};
use crate::row::{Row, Scalar};
use crate::schema::Schema;
use anyhow::Context;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub trait RowWriter {
    fn write_row(&mut self, row: &Row) -> CsvFlowResult<()>;
    fn finish(&mut self) -> CsvFlowResult<()>;
}

/// Open a writer for `path`, picking the format from its extension.
pub fn for_path(path: &Path, schema: &Schema) -> CsvFlowResult<Box<dyn RowWriter>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jsonl") | Some("ndjson") => Ok(Box::new(JsonlWriter::to_path(path, schema)?)),
        Some("csv") => {
            let mut writer = CsvWriter::to_path(path)?;
            writer.write_header(schema)?;
            Ok(Box::new(writer))
        }
        _ => Err(CsvFlowError::Config(format!(
            "cannot pick an output format for {}; use a .csv or .jsonl extension",
            path.display()
        ))),
    }
}

fn create(path: &Path) -> CsvFlowResult<File> {
    File::create(path).map_err(|source| CsvFlowError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn write_failed(e: std::io::Error) -> CsvFlowError {
    CsvFlowError::Unknown(anyhow::Error::new(e).context("Failed to write output"))
}

/// Writes rows back out as CSV with the default dialect, quoting whatever
/// would otherwise read back differently.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    line: Vec<u8>,
}

impl CsvWriter<File> {
    pub fn to_path(path: &Path) -> CsvFlowResult<Self> {
        Ok(Self::to_writer(create(path)?))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            line: Vec::new(),
        }
    }

    pub fn write_header(&mut self, schema: &Schema) -> CsvFlowResult<()> {
        self.line.clear();
        for (idx, name) in schema.names().enumerate() {
            if idx > 0 {
                self.line.push(b',');
            }
            push_field(&mut self.line, name, false);
        }
        self.flush_line()
    }

    fn flush_line(&mut self) -> CsvFlowResult<()> {
        self.line.push(b'\n');
        self.writer.write_all(&self.line).map_err(write_failed)
    }

    pub fn into_inner(self) -> CsvFlowResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| write_failed(e.into_error()))
    }
}

impl<W: Write> RowWriter for CsvWriter<W> {
    fn write_row(&mut self, row: &Row) -> CsvFlowResult<()> {
        self.line.clear();
        for (idx, value) in row.values().iter().enumerate() {
            if idx > 0 {
                self.line.push(b',');
            }
            match value {
                Scalar::Null => {}
                // quoted so it reads back as an empty string, not null
                Scalar::Str(s) => push_field(&mut self.line, s, true),
                other => self.line.extend_from_slice(other.to_string().as_bytes()),
            }
        }
        self.flush_line()
    }

    fn finish(&mut self) -> CsvFlowResult<()> {
        self.writer.flush().map_err(write_failed)
    }
}

fn push_field(out: &mut Vec<u8>, text: &str, quote_empty: bool) {
    let needs_quotes = (quote_empty && text.is_empty())
        || text.starts_with('#')
        || text.starts_with([' ', '\t'])
        || text.bytes().any(|b| matches!(b, b',' | b'"' | b'\n' | b'\r'));
    if !needs_quotes {
        out.extend_from_slice(text.as_bytes());
        return;
    }
    out.push(b'"');
    for b in text.bytes() {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}

/// One JSON object per row, keys in schema order.
pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    columns: Vec<String>,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &Path, schema: &Schema) -> CsvFlowResult<Self> {
        Ok(Self::to_writer(create(path)?, schema))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W, schema: &Schema) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns: schema.names().map(str::to_string).collect(),
        }
    }

    pub fn into_inner(self) -> CsvFlowResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| write_failed(e.into_error()))
    }
}

impl<W: Write> RowWriter for JsonlWriter<W> {
    fn write_row(&mut self, row: &Row) -> CsvFlowResult<()> {
        let record = JsonRecord {
            columns: &self.columns,
            values: row.values(),
        };
        serde_json::to_writer(&mut self.writer, &record)
            .context("Failed to serialize row")?;
        self.writer.write_all(b"\n").map_err(write_failed)
    }

    fn finish(&mut self) -> CsvFlowResult<()> {
        self.writer.flush().map_err(write_failed)
    }
}

struct JsonRecord<'a> {
    columns: &'a [String],
    values: &'a [Scalar],
}

impl Serialize for JsonRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Position;
    use crate::schema::Column;

    fn schema(names: &[&str]) -> Schema {
        Schema::new(
            names
                .iter()
                .map(|n| Column {
                    name: n.to_string(),
                    dtype: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_csv_quoting() {
        let mut writer = CsvWriter::to_writer(Vec::new());
        writer.write_header(&schema(&["a", "b,c"])).unwrap();
        let row = Row::new(
            vec![
                Scalar::from("x,y"),
                Scalar::from("say \"hi\""),
                Scalar::from(""),
                Scalar::Null,
                Scalar::from("#tag"),
                Scalar::Float(1.0),
            ],
            Position::default(),
        );
        writer.write_row(&row).unwrap();
        writer.finish().unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "a,\"b,c\"\n\"x,y\",\"say \"\"hi\"\"\",\"\",,\"#tag\",1.0\n"
        );
    }

    #[test]
    fn test_jsonl_keeps_column_order() {
        let mut writer = JsonlWriter::to_writer(Vec::new(), &schema(&["z", "a"]));
        let row = Row::new(
            vec![Scalar::Int(1), Scalar::Null],
            Position::default(),
        );
        writer.write_row(&row).unwrap();
        writer.finish().unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "{\"z\":1,\"a\":null}\n");
    }

    #[test]
    fn test_for_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = for_path(&dir.path().join("out.parquet"), &schema(&["a"]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("out.parquet"));
    }
}
