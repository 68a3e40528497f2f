//! Persistent record of what dnup has installed.
//!
//! Every read and write takes a [`ScopedMutex`] on
//! [`MODIFY_INSTALLATION_STATES`] as proof that the caller holds the
//! cross-process lock.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dnup_backend::{DotnetInstall, InstallComponent, InstallError, InstallRoot, ReleaseVersion};
use dnup_platform::{MODIFY_INSTALLATION_STATES, ScopedMutex, write_atomic};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default)]
    installs: Vec<ManifestRecord>,
}

/// One stored install. Component and version stay as strings so records
/// written by newer versions of dnup survive a rewrite untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestRecord {
    root_path: PathBuf,
    architecture: String,
    component: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ManifestRecord {
    fn from_install(install: &DotnetInstall) -> Self {
        Self {
            root_path: install.root.path.clone(),
            architecture: install.root.architecture.clone(),
            component: install.component.as_str().to_string(),
            version: install.version.to_string(),
            installed_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    fn to_install(&self) -> Option<DotnetInstall> {
        let component = InstallComponent::from_name(&self.component)?;
        let version: ReleaseVersion = self.version.parse().ok()?;
        Some(DotnetInstall::new(
            InstallRoot::new(self.root_path.clone(), self.architecture.clone()),
            component,
            version,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct InstallManifest {
    path: PathBuf,
}

impl InstallManifest {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installs recorded for `root`, or for every root when `root` is `None`.
    ///
    /// # Errors
    /// Returns [`InstallError::ManifestCorrupted`] when the file exists but
    /// cannot be parsed.
    pub fn get_installed_versions(
        &self,
        lock: &ScopedMutex,
        root: Option<&InstallRoot>,
    ) -> Result<Vec<DotnetInstall>, InstallError> {
        check_lock(lock);
        let manifest = self.load()?;
        Ok(manifest
            .installs
            .iter()
            .filter_map(ManifestRecord::to_install)
            .filter(|install| root.is_none_or(|root| install.root == *root))
            .collect())
    }

    /// Whether `install` is already recorded.
    ///
    /// # Errors
    /// Same as [`Self::get_installed_versions`].
    pub fn contains(&self, lock: &ScopedMutex, install: &DotnetInstall) -> Result<bool, InstallError> {
        Ok(self
            .get_installed_versions(lock, Some(&install.root))?
            .contains(install))
    }

    /// Record `install`. Returns `false` without touching the file when an
    /// equal record already exists.
    ///
    /// # Errors
    /// Returns an error when the manifest is corrupted or cannot be written.
    pub fn add_installed_version(
        &self,
        lock: &ScopedMutex,
        install: &DotnetInstall,
    ) -> Result<bool, InstallError> {
        check_lock(lock);
        let mut manifest = self.load()?;

        let exists = manifest
            .installs
            .iter()
            .filter_map(ManifestRecord::to_install)
            .any(|recorded| recorded == *install);
        if exists {
            debug!("{install} is already recorded");
            return Ok(false);
        }

        manifest.schema_version = SCHEMA_VERSION;
        manifest.installs.push(ManifestRecord::from_install(install));
        self.save(&manifest)?;
        info!("Recorded {install}");
        Ok(true)
    }

    fn load(&self) -> Result<ManifestFile, InstallError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ManifestFile::default());
            }
            Err(error) => {
                return Err(InstallError::io_with_path(
                    "failed to read install manifest",
                    &self.path,
                    &error,
                ));
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(self.corrupted("file is empty"));
        }

        let manifest: ManifestFile =
            serde_json::from_slice(&bytes).map_err(|error| self.corrupted(error))?;

        let opaque = manifest
            .installs
            .iter()
            .filter(|record| record.to_install().is_none())
            .count();
        if opaque > 0 {
            warn!(
                "{opaque} manifest record(s) in {} are not understood and will be preserved as-is",
                self.path.display()
            );
        }
        Ok(manifest)
    }

    fn save(&self, manifest: &ManifestFile) -> Result<(), InstallError> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|error| InstallError::manifest("failed to serialize manifest", error))?;
        write_atomic(&self.path, &json).map_err(|error| {
            InstallError::io_with_path("failed to write install manifest", &self.path, &error)
        })
    }

    fn corrupted(&self, details: impl std::fmt::Display) -> InstallError {
        InstallError::ManifestCorrupted {
            path: self.path.clone(),
            details: details.to_string(),
        }
    }
}

fn check_lock(lock: &ScopedMutex) {
    debug_assert_eq!(
        lock.name(),
        MODIFY_INSTALLATION_STATES,
        "manifest access requires the installation state lock"
    );
}
