//! Record framing for inputs and outputs.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SortError};

/// How records are delimited in a byte stream.
///
/// In TOML this is `{ fixed = 80 }` or `{ separator = "\r\n" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordFormat {
    /// Every record is exactly `length` bytes.
    Fixed {
        #[serde(rename = "fixed")]
        length: usize,
    },
    /// Records end with `separator`; the last one may omit it.
    Separated { separator: String },
}

impl RecordFormat {
    pub fn fixed(length: usize) -> Self {
        RecordFormat::Fixed { length }
    }

    pub fn separated(separator: impl Into<String>) -> Self {
        RecordFormat::Separated {
            separator: separator.into(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, RecordFormat::Fixed { .. })
    }
}

impl Default for RecordFormat {
    fn default() -> Self {
        RecordFormat::separated("\n")
    }
}

/// Reads records from a byte stream.
pub struct RecordReader<R> {
    inner: BufReader<R>,
    format: RecordFormat,
    count: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, format: &RecordFormat) -> Self {
        Self {
            inner: BufReader::new(inner),
            format: format.clone(),
            count: 0,
        }
    }

    /// Records returned so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Reads the next record, or `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let record = match &self.format {
            RecordFormat::Fixed { length } => self.read_fixed(*length)?,
            RecordFormat::Separated { separator } => {
                let separator = separator.clone();
                self.read_separated(separator.as_bytes())?
            }
        };
        if record.is_some() {
            self.count += 1;
        }
        Ok(record)
    }

    fn read_fixed(&mut self, length: usize) -> Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            match self.inner.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            n if n == length => Ok(Some(buffer)),
            actual => Err(SortError::Truncated {
                record: self.count + 1,
                expected: length,
                actual,
            }),
        }
    }

    fn read_separated(&mut self, separator: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(&last) = separator.last() else {
            return Err(SortError::Config {
                detail: "record separator must not be empty".to_string(),
            });
        };
        let mut buffer = Vec::new();
        loop {
            if self.inner.read_until(last, &mut buffer)? == 0 {
                break;
            }
            if buffer.ends_with(separator) {
                buffer.truncate(buffer.len() - separator.len());
                return Ok(Some(buffer));
            }
        }
        Ok(if buffer.is_empty() { None } else { Some(buffer) })
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Writes records to a byte stream.
pub struct RecordWriter<W: Write> {
    inner: BufWriter<W>,
    separator: Option<Vec<u8>>,
    count: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W, format: &RecordFormat) -> Self {
        let separator = match format {
            RecordFormat::Fixed { .. } => None,
            RecordFormat::Separated { separator } => Some(separator.as_bytes().to_vec()),
        };
        Self {
            inner: BufWriter::new(inner),
            separator,
            count: 0,
        }
    }

    /// Writes one record, followed by the separator if there is one.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.inner.write_all(record)?;
        if let Some(separator) = &self.separator {
            self.inner.write_all(separator)?;
        }
        self.count += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// A re-openable sort input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortInput {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl SortInput {
    pub fn file(path: impl AsRef<Path>) -> Self {
        SortInput::File(path.as_ref().to_path_buf())
    }

    /// Opens a fresh reader positioned at the start.
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(match self {
            SortInput::File(path) => Box::new(File::open(path)?),
            SortInput::Bytes(bytes) => Box::new(Cursor::new(bytes.as_slice())),
        })
    }

    /// Size of the input in bytes.
    pub fn byte_len(&self) -> Result<u64> {
        Ok(match self {
            SortInput::File(path) => fs::metadata(path)?.len(),
            SortInput::Bytes(bytes) => bytes.len() as u64,
        })
    }
}

impl From<Vec<u8>> for SortInput {
    fn from(bytes: Vec<u8>) -> Self {
        SortInput::Bytes(bytes)
    }
}

impl From<&[u8]> for SortInput {
    fn from(bytes: &[u8]) -> Self {
        SortInput::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for SortInput {
    fn from(path: PathBuf) -> Self {
        SortInput::File(path)
    }
}
