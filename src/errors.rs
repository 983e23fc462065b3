use miette::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where in the decompressed stream a record starts.
///
/// `record` is 1-based and counts the header, so the first data row of a
/// file with a header is record 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub byte_offset: u64,
    pub line: u64,
    pub record: u64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} (line {}, byte offset {})",
            self.record, self.line, self.byte_offset
        )
    }
}

/// Coarse error classes, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Encoding,
    MalformedRow,
    ColumnCountMismatch,
    EmptySource,
    Config,
    Other,
}

#[derive(Error, Diagnostic, Debug)]
pub enum CsvFlowError {
    #[error("Failed to open {}: {source}", .path.display())]
    #[diagnostic(
        code("CSVFLOW-001"),
        help("Check file paths and permissions.")
    )]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {position}: {source}")]
    #[diagnostic(
        code("CSVFLOW-002"),
        help("The source could not be read. A truncated or corrupt gzip stream is the usual cause.")
    )]
    Io {
        position: Position,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {encoding} in column {column} at {position}")]
    #[diagnostic(
        code("CSVFLOW-003"),
        help("Declare the file's encoding with --encoding.")
    )]
    Encoding {
        position: Position,
        column: usize,
        encoding: &'static str,
    },

    #[error("Malformed row at {position}: {reason}")]
    #[diagnostic(
        code("CSVFLOW-004"),
        help("Use --lenient to skip malformed rows.")
    )]
    MalformedRow { position: Position, reason: String },

    #[error("Column count mismatch at {position}: expected {expected} fields, found {found}")]
    #[diagnostic(
        code("CSVFLOW-005"),
        help("Use --mismatch pad or --mismatch truncate to tolerate ragged rows.")
    )]
    ColumnCountMismatch {
        position: Position,
        expected: usize,
        found: usize,
    },

    #[error("Source contains no header row")]
    #[diagnostic(
        code("CSVFLOW-006"),
        help("The file is empty or holds only comment and blank lines.")
    )]
    EmptySource,

    #[error("Configuration error: {0}")]
    #[diagnostic(code("CSVFLOW-007"), help("Check the ingestion options."))]
    Config(String),

    #[error(transparent)]
    #[diagnostic(code("CSVFLOW-000"))]
    Unknown(#[from] anyhow::Error),
}

impl CsvFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CsvFlowError::Open { .. } | CsvFlowError::Io { .. } => ErrorKind::Io,
            CsvFlowError::Encoding { .. } => ErrorKind::Encoding,
            CsvFlowError::MalformedRow { .. } => ErrorKind::MalformedRow,
            CsvFlowError::ColumnCountMismatch { .. } => ErrorKind::ColumnCountMismatch,
            CsvFlowError::EmptySource => ErrorKind::EmptySource,
            CsvFlowError::Config(_) => ErrorKind::Config,
            CsvFlowError::Unknown(_) => ErrorKind::Other,
        }
    }

    /// Position of the offending record, for row-level errors.
    pub fn position(&self) -> Option<Position> {
        match self {
            CsvFlowError::Io { position, .. }
            | CsvFlowError::Encoding { position, .. }
            | CsvFlowError::MalformedRow { position, .. }
            | CsvFlowError::ColumnCountMismatch { position, .. } => Some(*position),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CsvFlowError {
    fn from(source: std::io::Error) -> Self {
        CsvFlowError::Io {
            position: Position::default(),
            source,
        }
    }
}

pub type CsvFlowResult<T> = Result<T, CsvFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let pos = Position {
            byte_offset: 12,
            line: 3,
            record: 2,
        };
        assert_eq!(pos.to_string(), "row 2 (line 3, byte offset 12)");
    }

    #[test]
    fn test_mismatch_message_and_kind() {
        let err = CsvFlowError::ColumnCountMismatch {
            position: Position {
                byte_offset: 4,
                line: 2,
                record: 2,
            },
            expected: 2,
            found: 3,
        };
        assert_eq!(err.kind(), ErrorKind::ColumnCountMismatch);
        assert_eq!(err.position().map(|p| p.record), Some(2));
        assert!(err.to_string().contains("expected 2 fields, found 3"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: CsvFlowError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
