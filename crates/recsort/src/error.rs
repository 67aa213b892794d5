//! Sort engine error types.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Result type for sort operations.
pub type Result<T> = std::result::Result<T, SortError>;

/// Errors returned by the card compilers and the sort engine.
#[derive(Debug, Error, Diagnostic)]
pub enum SortError {
    /// Malformed control card text.
    #[error("parse error at index {index}: {message}")]
    #[diagnostic(code(sort::parse))]
    Parse {
        message: String,
        index: usize,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    /// Field format code that is not one of CH, SS, ZD, PD, FI, BI.
    #[error("unrecognized field format '{code}' at index {index}")]
    #[diagnostic(
        code(sort::unrecognized_format),
        help("supported formats are CH, SS, ZD, PD, FI and BI")
    )]
    UnrecognizedFormat {
        code: String,
        index: usize,
        #[source_code]
        src: String,
        #[label("unknown format")]
        span: SourceSpan,
    },

    /// A record does not contain a declared field range.
    #[error("record {record}: field at position {position} length {length} exceeds record length {actual}")]
    #[diagnostic(code(sort::record_too_short))]
    RecordTooShort {
        record: u64,
        position: usize,
        length: usize,
        actual: usize,
    },

    /// A numeric field holds bytes that are not valid for its format.
    #[error("record {record}: invalid numeric data at position {position}: {detail}")]
    #[diagnostic(code(sort::invalid_numeric))]
    InvalidNumeric {
        record: u64,
        position: usize,
        detail: String,
    },

    /// A fixed-length input ended in the middle of a record.
    #[error("record {record}: truncated fixed-length record, expected {expected} bytes but got {actual}")]
    #[diagnostic(code(sort::truncated))]
    Truncated {
        record: u64,
        expected: usize,
        actual: usize,
    },

    /// A value does not fit the width of its target field.
    #[error("value {value} does not fit a {length}-byte {format} field")]
    #[diagnostic(code(sort::overflow))]
    Overflow {
        value: String,
        length: usize,
        format: &'static str,
    },

    /// Output sink count does not match the configured destinations.
    #[error("expected {expected} output destination(s), got {actual}")]
    #[diagnostic(code(sort::destination_mismatch))]
    DestinationMismatch { expected: usize, actual: usize },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {detail}")]
    #[diagnostic(code(sort::config))]
    Config { detail: String },

    /// I/O error on an input, output or spill file.
    #[error("I/O error: {0}")]
    #[diagnostic(code(sort::io))]
    Io(#[from] std::io::Error),
}

impl SortError {
    /// Builds a parse error pointing at `index` within `src`.
    pub fn parse(message: impl Into<String>, index: usize, src: &str) -> Self {
        SortError::Parse {
            message: message.into(),
            index,
            src: src.to_string(),
            span: span_at(index, src),
        }
    }

    /// Builds an unrecognized-format error pointing at `index` within `src`.
    pub fn unrecognized_format(code: &str, index: usize, src: &str) -> Self {
        SortError::UnrecognizedFormat {
            code: code.to_string(),
            index,
            src: src.to_string(),
            span: SourceSpan::new(index.min(src.len()).into(), code.len().max(1)),
        }
    }

    /// Stamps a 1-based input record number onto a runtime data error.
    ///
    /// Accessors raise data errors without knowing which record they were
    /// reading; the engine fills the number in. Other variants pass through.
    pub fn at_record(self, number: u64) -> Self {
        match self {
            SortError::RecordTooShort {
                position,
                length,
                actual,
                ..
            } => SortError::RecordTooShort {
                record: number,
                position,
                length,
                actual,
            },
            SortError::InvalidNumeric {
                position, detail, ..
            } => SortError::InvalidNumeric {
                record: number,
                position,
                detail,
            },
            SortError::Truncated {
                expected, actual, ..
            } => SortError::Truncated {
                record: number,
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Re-anchors a card error raised on an operand into its enclosing
    /// statement, where the operand starts at `offset`.
    pub(crate) fn within(self, offset: usize, statement: &str) -> Self {
        match self {
            SortError::Parse { message, index, .. } => {
                SortError::parse(message, index + offset, statement)
            }
            SortError::UnrecognizedFormat { code, index, .. } => {
                SortError::unrecognized_format(&code, index + offset, statement)
            }
            other => other,
        }
    }

    /// Returns true for errors caused by record contents rather than by
    /// configuration or I/O.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            SortError::RecordTooShort { .. }
                | SortError::InvalidNumeric { .. }
                | SortError::Truncated { .. }
        )
    }
}

fn span_at(index: usize, src: &str) -> SourceSpan {
    let start = index.min(src.len());
    let len = usize::from(start < src.len());
    SourceSpan::new(start.into(), len)
}
