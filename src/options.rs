//! Ingestion options shared by the tokenizer, assembler and pipeline.

use crate::errors::{CsvFlowError, CsvFlowResult};
use crate::io::Compression;
use crate::schema::ScalarType;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// What to do when a row's field count differs from the schema's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Any mismatch is an error.
    #[default]
    Strict,
    /// Short rows are padded with nulls; long rows are an error.
    Pad,
    /// Long rows lose their trailing fields; short rows are an error.
    Truncate,
}

/// What to do with a row the tokenizer cannot close (unterminated quote).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    #[default]
    Fail,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "Latin-1",
        }
    }

    /// Decode a field; `None` when the bytes are invalid for this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Encoding::Latin1 => {
                if bytes.is_ascii() {
                    // ASCII is valid UTF-8 as-is
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestOptions {
    pub delimiter: u8,
    pub quote: u8,
    /// Lines whose first non-whitespace byte is this are skipped.
    pub comment: Option<u8>,
    pub has_header: bool,
    #[serde(default)]
    pub mismatch: MismatchPolicy,
    #[serde(default)]
    pub malformed: MalformedPolicy,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub compression: Compression,
    /// Tokenizer read-ahead buffer, in bytes.
    pub buffer_size: usize,
    /// Keep only these columns, in this order.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Declared column types; take precedence over inference.
    #[serde(default)]
    pub dtypes: HashMap<String, ScalarType>,
    /// Number of leading rows used to infer column types (0 disables).
    #[serde(default)]
    pub infer_schema_rows: usize,
    /// Unquoted field values that mean null.
    pub null_values: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            comment: Some(b'#'),
            has_header: true,
            mismatch: MismatchPolicy::default(),
            malformed: MalformedPolicy::default(),
            encoding: Encoding::default(),
            compression: Compression::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            columns: None,
            dtypes: HashMap::new(),
            infer_schema_rows: 0,
            null_values: vec![String::new(), "null".to_string(), "NULL".to_string()],
        }
    }
}

impl IngestOptions {
    pub fn validate(&self) -> CsvFlowResult<()> {
        let terminators = [b'\n', b'\r'];
        if terminators.contains(&self.delimiter) {
            return Err(CsvFlowError::Config(
                "delimiter cannot be a line terminator".to_string(),
            ));
        }
        if terminators.contains(&self.quote) {
            return Err(CsvFlowError::Config(
                "quote cannot be a line terminator".to_string(),
            ));
        }
        if self.delimiter == self.quote {
            return Err(CsvFlowError::Config(format!(
                "delimiter and quote are both {:?}",
                self.delimiter as char
            )));
        }
        if let Some(comment) = self.comment {
            if comment == self.delimiter || comment == self.quote || terminators.contains(&comment)
            {
                return Err(CsvFlowError::Config(format!(
                    "comment byte {:?} collides with delimiter, quote or line terminator",
                    comment as char
                )));
            }
        }
        if self.buffer_size == 0 {
            return Err(CsvFlowError::Config(
                "buffer size must be at least one byte".to_string(),
            ));
        }
        Ok(())
    }
}
