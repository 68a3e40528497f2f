use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnupSettings {
    /// Root used when `--install-path` is not given.
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default)]
    pub release_index_file: Option<PathBuf>,

    /// Directory of archives served to the installer.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    #[serde(default)]
    pub strict_muxer: bool,

    /// Unset waits for the installation lock indefinitely.
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for DnupSettings {
    fn default() -> Self {
        Self {
            install_root: None,
            architecture: None,
            release_index_file: None,
            archive_dir: None,
            strict_muxer: false,
            lock_timeout_secs: None,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl DnupSettings {
    /// Read settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    /// Returns an error when the settings cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_error = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        let content = serde_json::to_vec_pretty(self).map_err(|err| write_error(err.into()))?;
        dnup_platform::write_atomic(path, &content).map_err(write_error)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }
}
