//! Sort run configuration.
//!
//! A `SortConfig` travels explicitly into every compiler and into the
//! engine. It can be built in code or loaded from a TOML file:
//!
//! ```toml
//! memory_limit = 67108864
//! stable = true
//! encoding = "ebcdic"
//! record_format = { fixed = 80 }
//! header_records = 1
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoding::{Collation, Encoding};
use crate::error::{Result, SortError};
use crate::record::RecordFormat;

/// Default in-memory ceiling: 100 MiB.
pub const DEFAULT_MEMORY_LIMIT: u64 = 100 * 1024 * 1024;

/// Configuration for one sort run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Input size in bytes above which the external sort is used.
    pub memory_limit: u64,
    /// Keep input order for equal keys.
    pub stable: bool,
    /// Display encoding of record text.
    pub encoding: Encoding,
    /// Collating encoding for character keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_encoding: Option<Encoding>,
    /// Leading records copied verbatim to every output.
    pub header_records: usize,
    /// Spill worker count; 0 uses the rayon default.
    pub workers: usize,
    /// Parent directory for spill files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// How records are framed in inputs and outputs.
    pub record_format: RecordFormat,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            stable: true,
            encoding: Encoding::Ascii,
            sort_encoding: None,
            header_records: 0,
            workers: 0,
            temp_dir: None,
            record_format: RecordFormat::default(),
        }
    }
}

impl SortConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SortConfig = toml::from_str(text).map_err(|e| SortError::Config {
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SortError::Config {
            detail: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SortError::Config {
            detail: e.to_string(),
        })
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit == 0 {
            return Err(SortError::Config {
                detail: "memory_limit must be greater than zero".to_string(),
            });
        }
        match &self.record_format {
            RecordFormat::Fixed { length: 0 } => Err(SortError::Config {
                detail: "fixed record length must be greater than zero".to_string(),
            }),
            RecordFormat::Separated { separator } if separator.is_empty() => {
                Err(SortError::Config {
                    detail: "record separator must not be empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Collation table for character keys.
    pub fn collation(&self) -> Collation {
        Collation::new(self.encoding, self.sort_encoding)
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_sort_encoding(mut self, encoding: Option<Encoding>) -> Self {
        self.sort_encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    #[must_use]
    pub fn with_header_records(mut self, count: usize) -> Self {
        self.header_records = count;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SortConfig::default();
        assert_eq!(config.memory_limit, 100 * 1024 * 1024);
        assert!(config.stable);
        assert_eq!(config.encoding, Encoding::Ascii);
        assert_eq!(config.sort_encoding, None);
        assert_eq!(
            config.record_format,
            RecordFormat::Separated {
                separator: "\n".to_string()
            }
        );
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            memory_limit = 4096
            stable = false
            encoding = "ebcdic"
            sort_encoding = "ascii"
            record_format = { fixed = 80 }
            header_records = 2
            workers = 4
        "#;
        let config = SortConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.memory_limit, 4096);
        assert!(!config.stable);
        assert_eq!(config.encoding, Encoding::Ebcdic);
        assert_eq!(config.sort_encoding, Some(Encoding::Ascii));
        assert_eq!(config.record_format, RecordFormat::Fixed { length: 80 });
        assert_eq!(config.header_records, 2);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_separator_config() {
        let config = SortConfig::from_toml_str(r#"record_format = { separator = "\r\n" }"#).unwrap();
        assert_eq!(
            config.record_format,
            RecordFormat::Separated {
                separator: "\r\n".to_string()
            }
        );
        assert_eq!(config.memory_limit, DEFAULT_MEMORY_LIMIT);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            SortConfig::from_toml_str("memory_limit = \"lots\""),
            Err(SortError::Config { .. })
        ));
        assert!(matches!(
            SortConfig::from_toml_str("record_format = { fixed = 0 }"),
            Err(SortError::Config { .. })
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SortConfig::default()
            .with_memory_limit(1024)
            .with_record_format(RecordFormat::Fixed { length: 12 })
            .with_encoding(Encoding::Ebcdic);
        let text = config.to_toml_string().unwrap();
        assert_eq!(SortConfig::from_toml_str(&text).unwrap(), config);
    }
}
