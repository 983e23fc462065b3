//! Turns tokenized records into typed rows.

use crate::errors::{CsvFlowError, CsvFlowResult, Position};
use crate::options::{Encoding, IngestOptions, MismatchPolicy};
use crate::row::{Row, Scalar};
use crate::schema::{ScalarType, Schema, TypeInference};
use crate::tokenizer::{Field, RawRecord};
use std::borrow::Cow;
use tracing::warn;

/// Decoded but not yet coerced row, held while the schema is being inferred.
#[derive(Debug, Clone)]
pub(crate) struct TextRow {
    cells: Vec<Option<(String, bool)>>,
    position: Position,
}

#[derive(Debug, Clone)]
pub struct RowAssembler {
    schema: Schema,
    width: usize,
    projection: Option<Vec<usize>>,
    mismatch: MismatchPolicy,
    encoding: Encoding,
    null_values: Vec<String>,
}

impl RowAssembler {
    /// Use `record` as the header row.
    pub fn from_header(record: &RawRecord<'_>, opts: &IngestOptions) -> CsvFlowResult<Self> {
        let mut names = Vec::with_capacity(record.len());
        for (idx, field) in record.iter().enumerate() {
            let name = decode(opts.encoding, field, idx, record.position())?;
            names.push(name.into_owned());
        }
        Ok(Self::new(Schema::from_header(names), opts))
    }

    /// Generated column names for a source without a header row.
    pub fn headerless(width: usize, opts: &IngestOptions) -> Self {
        Self::new(Schema::generated(width), opts)
    }

    fn new(mut source: Schema, opts: &IngestOptions) -> Self {
        for name in opts.dtypes.keys() {
            if source.index_of(name).is_none() {
                warn!("Type declared for unknown column '{}'", name);
            }
        }
        source.apply_dtypes(&opts.dtypes);

        let width = source.len();
        let (schema, projection) = match &opts.columns {
            Some(names) => {
                let (projected, indices, missing) = source.project(names);
                for name in missing {
                    warn!("Requested column '{}' is not in the header, ignoring", name);
                }
                (projected, Some(indices))
            }
            None => (source, None),
        };

        Self {
            schema,
            width,
            projection,
            mismatch: opts.mismatch,
            encoding: opts.encoding,
            null_values: opts.null_values.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Field count every record is checked against.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn assemble(&self, record: &RawRecord<'_>) -> CsvFlowResult<Row> {
        self.check_width(record)?;
        let position = record.position();
        let mut values = Vec::with_capacity(self.schema.len());
        for (idx, column) in self.schema.columns().iter().enumerate() {
            let (src, field) = self.field_for(record, idx);
            let value = match field {
                Some(field) => {
                    let text = decode(self.encoding, field, src, position)?;
                    self.coerce(&text, field.is_quoted(), column.dtype)
                }
                None => Scalar::Null,
            };
            values.push(value);
        }
        Ok(Row::new(values, position))
    }

    pub(crate) fn decode_text(&self, record: &RawRecord<'_>) -> CsvFlowResult<TextRow> {
        self.check_width(record)?;
        let position = record.position();
        let mut cells = Vec::with_capacity(self.schema.len());
        for idx in 0..self.schema.len() {
            let (src, field) = self.field_for(record, idx);
            let cell = match field {
                Some(field) => {
                    let text = decode(self.encoding, field, src, position)?;
                    Some((text.into_owned(), field.is_quoted()))
                }
                None => None,
            };
            cells.push(cell);
        }
        Ok(TextRow { cells, position })
    }

    /// Fix column types from sample rows, then coerce the samples with them.
    pub(crate) fn infer(&mut self, samples: Vec<TextRow>) -> Vec<Row> {
        let mut inference = TypeInference::new(self.schema.len());
        for sample in &samples {
            let values: Vec<Scalar> = sample
                .cells
                .iter()
                .zip(self.schema.columns())
                .map(|(cell, column)| match cell {
                    Some((text, quoted)) => self.coerce(text, *quoted, column.dtype),
                    None => Scalar::Null,
                })
                .collect();
            inference.observe(&values);
        }
        inference.finish(&mut self.schema);

        samples
            .into_iter()
            .map(|sample| self.coerce_text(sample))
            .collect()
    }

    pub(crate) fn coerce_text(&self, row: TextRow) -> Row {
        let values = row
            .cells
            .iter()
            .zip(self.schema.columns())
            .map(|(cell, column)| match cell {
                Some((text, quoted)) => self.coerce(text, *quoted, column.dtype),
                None => Scalar::Null,
            })
            .collect();
        Row::new(values, row.position)
    }

    fn check_width(&self, record: &RawRecord<'_>) -> CsvFlowResult<()> {
        let found = record.len();
        let ok = match self.mismatch {
            MismatchPolicy::Strict => found == self.width,
            MismatchPolicy::Pad => found <= self.width,
            MismatchPolicy::Truncate => found >= self.width,
        };
        if ok {
            Ok(())
        } else {
            Err(CsvFlowError::ColumnCountMismatch {
                position: record.position(),
                expected: self.width,
                found,
            })
        }
    }

    fn field_for<'a>(&self, record: &RawRecord<'a>, idx: usize) -> (usize, Option<Field<'a>>) {
        let src = match &self.projection {
            Some(indices) => indices[idx],
            None => idx,
        };
        (src, record.get(src))
    }

    /// Null check, then the declared type or the integer -> float ->
    /// boolean -> string cascade. Never fails; text that does not fit
    /// stays a string.
    pub fn coerce(&self, text: &str, quoted: bool, dtype: Option<ScalarType>) -> Scalar {
        if !quoted && self.null_values.iter().any(|n| n == text) {
            return Scalar::Null;
        }
        let typed = match dtype {
            Some(ScalarType::String) => None,
            Some(ScalarType::Integer) => parse_int(text).map(Scalar::Int),
            Some(ScalarType::Float) => parse_float(text).map(Scalar::Float),
            Some(ScalarType::Boolean) => parse_bool(text).map(Scalar::Bool),
            None => parse_int(text)
                .map(Scalar::Int)
                .or_else(|| parse_float(text).map(Scalar::Float))
                .or_else(|| parse_bool(text).map(Scalar::Bool)),
        };
        typed.unwrap_or_else(|| Scalar::Str(text.to_string()))
    }
}

fn decode<'f>(
    encoding: Encoding,
    field: Field<'f>,
    column: usize,
    position: Position,
) -> CsvFlowResult<Cow<'f, str>> {
    encoding
        .decode(field.as_bytes())
        .ok_or(CsvFlowError::Encoding {
            position,
            column: column + 1,
            encoding: encoding.name(),
        })
}

fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>().ok()
}

// Requires a digit so words like "nan" or "inf" stay strings, and a
// finite result so overflow like "1e999" does too.
fn parse_float(text: &str) -> Option<f64> {
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
