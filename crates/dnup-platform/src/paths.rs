use std::path::{Path, PathBuf};
use thiserror::Error;

/// Relocates every application directory below a single root when set.
pub const HOME_ENV_VAR: &str = "DNUP_HOME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// `DNUP_HOME` takes precedence over the platform directories.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/cache/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
            return Ok(Self::under(Path::new(&home)));
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support/dnup"),
                cache_dir: home.join("Library/Caches/dnup"),
                data_dir: home.join("Library/Application Support/dnup"),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join("dnup"),
                cache_dir: dirs::cache_dir()
                    .ok_or(AppPathsError::CacheDirUnavailable)?
                    .join("dnup"),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join("dnup"),
            })
        }
    }

    /// Lay out all application directories below `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn manifest_file(&self) -> PathBuf {
        self.data_dir.join("manifest.json")
    }

    #[must_use]
    pub fn lock_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }

    #[must_use]
    pub fn release_index_file(&self) -> PathBuf {
        self.cache_dir.join("releases-index.json")
    }

    /// Local archive feed consulted by `dnup install`.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join("archives")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("dnup.log")
    }

    /// Default install root used when neither the caller nor the settings
    /// name one.
    #[must_use]
    pub fn default_install_root(&self) -> PathBuf {
        self.data_dir.join("dotnet")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.lock_dir())?;
        Ok(())
    }
}
