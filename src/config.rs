//! Settings file.
//!
//! A JSON object with any subset of the [`Settings`] fields; missing fields
//! take their defaults and out-of-range values are clamped on load.
//!
//! ```json
//! { "download_dir": "/data/games", "max_concurrent": 2 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::download::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use crate::manager::{DEFAULT_MAX_CONCURRENT, clamp_concurrency};

/// Directory name under the platform data and download dirs.
pub const APP_DIR_NAME: &str = "lockerdl";
/// Settings file name inside the app data dir.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

const MIN_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 20;

/// Errors reading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings JSON.
    #[error(
        "malformed settings file {path}: {source}\n  Suggestion: Fix the JSON or delete the file to use defaults"
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for every download.
    pub download_dir: PathBuf,
    /// Most transfers running at once, 1 to 10.
    pub max_concurrent: usize,
    /// `SQLite` job database.
    pub database_path: PathBuf,
    /// Connect timeout for transfers, 10 to 20 seconds.
    pub connect_timeout_secs: u64,
    /// Per-read timeout for transfers, 10 to 20 seconds.
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            download_dir: dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            database_path: data_dir.join("downloads.db"),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Loads settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid JSON for these settings.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings.normalized())
    }

    /// Returns a copy with every bounded field clamped into range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = clamp_concurrency(self.max_concurrent);
        self.connect_timeout_secs = self
            .connect_timeout_secs
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        self.read_timeout_secs = self
            .read_timeout_secs
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        self
    }

    /// Transfer connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Transfer read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// `<data_dir>/lockerdl`, or `./.lockerdl` when the platform has no data dir.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from(".").join(format!(".{APP_DIR_NAME}")),
        |dir| dir.join(APP_DIR_NAME),
    )
}

/// Default settings file location.
#[must_use]
pub fn default_settings_path() -> PathBuf {
    default_data_dir().join(SETTINGS_FILE_NAME)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_concurrent, 3);
    }

    #[test]
    fn test_settings_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"download_dir": "/data/games", "max_concurrent": 2}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.download_dir, PathBuf::from("/data/games"));
        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.read_timeout_secs, DEFAULT_READ_TIMEOUT_SECS);
    }

    #[test]
    fn test_settings_out_of_range_values_are_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"max_concurrent": 0, "connect_timeout_secs": 1, "read_timeout_secs": 600}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
        assert_eq!(settings.read_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_settings_malformed_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn test_default_settings_path_file_name() {
        assert!(default_settings_path().ends_with("lockerdl/settings.json"));
    }
}
