//! Typed views over raw record bytes.
//!
//! A field accessor names a byte range and a format. Character formats
//! yield the bytes themselves; numeric formats decode to a
//! [`rust_decimal::Decimal`]. Constant accessors ignore the record.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::encoding::Encoding;
use crate::error::{Result, SortError};

pub mod binary;
pub mod packed;
pub mod zoned;

/// Field formats understood by the card language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    /// Character.
    Ch,
    /// Character, searched as a substring by `EQ`/`NE` filters.
    Ss,
    /// Zoned decimal.
    Zd,
    /// Packed decimal.
    Pd,
    /// Signed big-endian binary.
    Fi,
    /// Unsigned big-endian binary.
    Bi,
}

impl FieldFormat {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "CH" => Some(FieldFormat::Ch),
            "SS" => Some(FieldFormat::Ss),
            "ZD" => Some(FieldFormat::Zd),
            "PD" => Some(FieldFormat::Pd),
            "FI" => Some(FieldFormat::Fi),
            "BI" => Some(FieldFormat::Bi),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FieldFormat::Ch => "CH",
            FieldFormat::Ss => "SS",
            FieldFormat::Zd => "ZD",
            FieldFormat::Pd => "PD",
            FieldFormat::Fi => "FI",
            FieldFormat::Bi => "BI",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldFormat::Ch | FieldFormat::Ss)
    }

    pub fn is_numeric(&self) -> bool {
        !self.is_text()
    }

    /// Widest field whose values fit a `Decimal`.
    pub fn max_length(&self) -> Option<usize> {
        match self {
            FieldFormat::Ch | FieldFormat::Ss => None,
            FieldFormat::Zd => Some(28),
            FieldFormat::Pd => Some(14),
            FieldFormat::Fi | FieldFormat::Bi => Some(8),
        }
    }
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Low-level codec failure, before it is tied to a field position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid digit nibble 0x{nibble:X} in byte 0x{byte:02X}")]
    BadDigit { nibble: u8, byte: u8 },
    #[error("invalid sign nibble 0x{0:X}")]
    BadSign(u8),
    #[error("value {value} does not fit {length} bytes")]
    Overflow { value: String, length: usize },
}

/// Truncates a value to an integer, as every numeric format stores one.
pub(crate) fn integral(value: Decimal) -> Option<i128> {
    value.trunc().to_i128()
}

/// Wraps an accumulated integer back into a `Decimal`.
pub(crate) fn from_integral(value: i128) -> std::result::Result<Decimal, CodecError> {
    Decimal::try_from_i128_with_scale(value, 0).map_err(|_| CodecError::Overflow {
        value: value.to_string(),
        length: 0,
    })
}

/// A typed byte range of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccessor {
    start: usize,
    length: usize,
    format: FieldFormat,
    encoding: Encoding,
}

impl FieldAccessor {
    /// Creates an accessor from a 1-based start position.
    pub fn new(
        position: usize,
        length: usize,
        format: FieldFormat,
        encoding: Encoding,
    ) -> Result<Self> {
        if position == 0 {
            return Err(SortError::Config {
                detail: "field positions start at 1".to_string(),
            });
        }
        if length == 0 {
            return Err(SortError::Config {
                detail: "field length must be at least 1".to_string(),
            });
        }
        if position.checked_add(length).is_none() {
            return Err(SortError::Config {
                detail: format!("field at position {position} length {length} is out of range"),
            });
        }
        if let Some(max) = format.max_length() {
            if length > max {
                return Err(SortError::Config {
                    detail: format!("{format} field length {length} exceeds maximum of {max}"),
                });
            }
        }
        Ok(Self {
            start: position - 1,
            length,
            format,
            encoding,
        })
    }

    /// 1-based start position.
    pub fn position(&self) -> usize {
        self.start + 1
    }

    /// 0-based start offset.
    pub fn offset(&self) -> usize {
        self.start
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// 0-based offset one past the last byte.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn format(&self) -> FieldFormat {
        self.format
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The raw bytes of the field.
    pub fn bytes<'r>(&self, record: &'r [u8]) -> Result<&'r [u8]> {
        record
            .get(self.start..self.end())
            .ok_or(SortError::RecordTooShort {
                record: 0,
                position: self.position(),
                length: self.length,
                actual: record.len(),
            })
    }

    /// Decodes the field as a number.
    pub fn decimal(&self, record: &[u8]) -> Result<Decimal> {
        let bytes = self.bytes(record)?;
        let decoded = match self.format {
            FieldFormat::Zd => zoned::unzone(bytes, self.encoding),
            FieldFormat::Pd => packed::unpack(bytes),
            FieldFormat::Fi => binary::decode_signed(bytes),
            FieldFormat::Bi => binary::decode_unsigned(bytes),
            FieldFormat::Ch | FieldFormat::Ss => {
                return parse_text_number(&self.encoding.decode(bytes), self.position())
            }
        };
        decoded.map_err(|e| self.codec_error(e))
    }

    /// Encodes `value` into the field's bytes of `record`, in place.
    pub fn store(&self, record: &mut [u8], value: Decimal) -> Result<()> {
        let actual = record.len();
        let position = self.position();
        let length = self.length;
        let target = record
            .get_mut(self.start..self.start + length)
            .ok_or(SortError::RecordTooShort {
                record: 0,
                position,
                length,
                actual,
            })?;
        let encoded = match self.format {
            FieldFormat::Zd => zoned::zone(value, target, self.encoding),
            FieldFormat::Pd => packed::pack(value, target),
            FieldFormat::Fi => binary::encode_signed(value, target),
            FieldFormat::Bi => binary::encode_unsigned(value, target),
            FieldFormat::Ch | FieldFormat::Ss => {
                return Err(SortError::Config {
                    detail: format!("cannot store a number into a {} field", self.format),
                })
            }
        };
        encoded.map_err(|e| self.codec_error(e))
    }

    /// Checks that the field exists in `record` and decodes if numeric.
    pub fn validate(&self, record: &[u8]) -> Result<()> {
        if self.format.is_numeric() {
            self.decimal(record).map(|_| ())
        } else {
            self.bytes(record).map(|_| ())
        }
    }

    fn codec_error(&self, error: CodecError) -> SortError {
        match error {
            CodecError::Overflow { value, .. } => SortError::Overflow {
                value,
                length: self.length,
                format: self.format.code(),
            },
            other => SortError::InvalidNumeric {
                record: 0,
                position: self.position(),
                detail: format!("{} field: {}", self.format, other),
            },
        }
    }
}

fn parse_text_number(text: &str, position: usize) -> Result<Decimal> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    Decimal::from_str(unsigned).map_err(|_| SortError::InvalidNumeric {
        record: 0,
        position,
        detail: format!("'{trimmed}' is not a number"),
    })
}

/// Parses a decimal constant such as `100`, `-5` or `+2.5`.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let unsigned = text.strip_prefix('+').unwrap_or(text);
    if unsigned.is_empty() || unsigned.starts_with('+') {
        return None;
    }
    Decimal::from_str(unsigned).ok()
}

/// Reads a value out of a record or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Field(FieldAccessor),
    /// Decimal constant.
    Decimal(Decimal),
    /// `C'...'` constant, already in the display encoding.
    Text(Vec<u8>),
    /// `X'...'` constant; `value` is the unsigned big-endian reading when
    /// it fits a `Decimal`.
    Hex {
        bytes: Vec<u8>,
        value: Option<Decimal>,
    },
}

impl Accessor {
    /// Field accessor from a 1-based position.
    pub fn field(
        position: usize,
        length: usize,
        format: FieldFormat,
        encoding: Encoding,
    ) -> Result<Self> {
        FieldAccessor::new(position, length, format, encoding).map(Accessor::Field)
    }

    /// Hex constant from its bytes.
    pub fn hex(bytes: Vec<u8>) -> Self {
        let value = bytes
            .iter()
            .try_fold(0u128, |acc, &b| acc.checked_mul(256)?.checked_add(u128::from(b)))
            .and_then(|v| i128::try_from(v).ok())
            .and_then(|v| from_integral(v).ok());
        Accessor::Hex { bytes, value }
    }

    pub fn as_field(&self) -> Option<&FieldAccessor> {
        match self {
            Accessor::Field(field) => Some(field),
            _ => None,
        }
    }

    /// True for `CH` and `SS` fields.
    pub fn is_text_field(&self) -> bool {
        self.as_field().is_some_and(|f| f.format().is_text())
    }

    /// True for `C'...'` and `X'...'` constants.
    pub fn is_literal(&self) -> bool {
        matches!(self, Accessor::Text(_) | Accessor::Hex { .. })
    }

    pub fn is_constant(&self) -> bool {
        !matches!(self, Accessor::Field(_))
    }

    /// The bytes this accessor contributes to a text comparison.
    pub fn text<'r>(&'r self, record: &'r [u8], encoding: Encoding) -> Result<Cow<'r, [u8]>> {
        match self {
            Accessor::Field(field) => field.bytes(record).map(Cow::Borrowed),
            Accessor::Text(bytes) | Accessor::Hex { bytes, .. } => Ok(Cow::Borrowed(bytes)),
            Accessor::Decimal(value) => Ok(Cow::Owned(encoding.encode_str(&value.to_string()))),
        }
    }

    /// The value this accessor contributes to a numeric comparison.
    ///
    /// String constants hold display-encoded bytes and are decoded with
    /// `encoding` before parsing.
    pub fn decimal(&self, record: &[u8], encoding: Encoding) -> Result<Decimal> {
        match self {
            Accessor::Field(field) => field.decimal(record),
            Accessor::Decimal(value) => Ok(*value),
            Accessor::Hex { value, .. } => value.ok_or_else(|| SortError::InvalidNumeric {
                record: 0,
                position: 0,
                detail: "hex constant is too long to compare numerically".to_string(),
            }),
            Accessor::Text(bytes) => {
                parse_text_number(&encoding.decode(bytes), 0)
            }
        }
    }
}
