//! User-tunable defaults for readers and writers, stored as TOML.
//!
//! ```toml
//! binary_chunk_size = 4096
//! pretty_json = true
//!
//! [lock]
//! wait = true
//! retries = 10
//! delay_ms = 20
//!
//! [csv]
//! delimiter = ";"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs_op::lock::LockOptions;
use crate::stream::format::{CsvDialect, ReadFormat, DEFAULT_CHUNK_SIZE};

/// File name looked up in the platform config directory.
pub const SETTINGS_FILE: &str = "stream.toml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot read settings `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Retry contended locks instead of failing on the first attempt.
    pub wait: bool,
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            wait: false,
            retries: 5,
            delay_ms: 50,
        }
    }
}

impl LockSettings {
    pub fn options(&self) -> LockOptions {
        if self.wait {
            LockOptions::waiting(self.retries, Duration::from_millis(self.delay_ms))
        } else {
            LockOptions::no_wait()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lock: LockSettings,
    pub binary_chunk_size: usize,
    pub csv: CsvDialect,
    pub pretty_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            lock: LockSettings::default(),
            binary_chunk_size: DEFAULT_CHUNK_SIZE,
            csv: CsvDialect::default(),
            pretty_json: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(s)?;
        if settings.binary_chunk_size == 0 {
            return Err(SettingsError::Invalid(
                "binary_chunk_size must be positive".into(),
            ));
        }
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load [`SETTINGS_FILE`] from the user's config directory, or defaults
    /// when there is none.
    pub fn load_default() -> Result<Self, SettingsError> {
        match default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::load(path)
            }
            _ => Ok(Settings::default()),
        }
    }

    pub fn binary_format(&self) -> ReadFormat {
        ReadFormat::Binary {
            chunk_size: self.binary_chunk_size,
        }
    }
}

/// Location of the per-user settings file, if the platform has one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "filekit").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.lock.options(), LockOptions::no_wait());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let s = Settings::from_toml_str(
            r#"
pretty_json = true

[lock]
wait = true
delay_ms = 10

[csv]
delimiter = ";"
escape = "\\"
"#,
        )
        .unwrap();
        assert!(s.pretty_json);
        assert_eq!(
            s.lock.options(),
            LockOptions::waiting(5, Duration::from_millis(10))
        );
        assert_eq!(s.csv.delimiter, b';');
        assert_eq!(s.csv.quote, b'"');
        assert_eq!(s.csv.escape, Some(b'\\'));
        assert_eq!(s.binary_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Settings::from_toml_str("binary_chunk_size = 0"),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[csv]\ndelimiter = \"é\""),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
