use std::path::PathBuf;

use dnup_platform::LockError;
use thiserror::Error;

use crate::channel::{ChannelParseError, ComponentSpecError};
use crate::types::{InstallComponent, ReleaseVersion};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    InvalidChannel(#[from] ChannelParseError),

    #[error("Unknown component: {0}")]
    InvalidComponent(String),

    #[error("{} is only available on Windows", .component.display_name())]
    UnsupportedComponent { component: InstallComponent },

    #[error("No {component} version matches channel '{channel}'")]
    VersionNotFound {
        channel: String,
        component: InstallComponent,
    },

    #[error("{component} {version} is not a published release")]
    InvalidVersion {
        version: ReleaseVersion,
        component: InstallComponent,
    },

    #[error("Install manifest at {path} is corrupted: {details}")]
    ManifestCorrupted { path: PathBuf, details: String },

    #[error("Install manifest error ({context}): {details}")]
    Manifest {
        context: &'static str,
        details: String,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Cannot replace {path} because it is in use: {details}")]
    MuxerInUse { path: PathBuf, details: String },

    #[error("Download failed ({stage}): {details}")]
    DownloadFailed { stage: DownloadStage, details: String },

    #[error("Archive is corrupted or truncated: {details}")]
    ArchiveCorrupted { details: String },

    #[error("Extraction failed ({context}): {details}")]
    ExtractionFailed {
        context: &'static str,
        details: String,
    },

    #[error("Release index error: {details}")]
    ReleaseIndex { details: String },

    #[error("IO error ({kind}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("{operation} called in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

/// Where a download went wrong, so connectivity problems can be told apart
/// from server-side failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    #[error("connectivity")]
    Connectivity,
    #[error("server")]
    Server,
    #[error("verification")]
    Verification,
}

impl InstallError {
    pub fn download(stage: DownloadStage, details: impl Into<String>) -> Self {
        Self::DownloadFailed {
            stage,
            details: details.into(),
        }
    }

    pub fn extraction(context: &'static str, details: impl std::fmt::Display) -> Self {
        Self::ExtractionFailed {
            context,
            details: details.to_string(),
        }
    }

    pub fn manifest(context: &'static str, details: impl std::fmt::Display) -> Self {
        Self::Manifest {
            context,
            details: details.to_string(),
        }
    }

    pub fn release_index(details: impl Into<String>) -> Self {
        Self::ReleaseIndex {
            details: details.into(),
        }
    }

    /// Wrap an I/O error with the path it concerns.
    #[must_use]
    pub fn io_with_path(context: &'static str, path: &std::path::Path, source: &std::io::Error) -> Self {
        Self::Io {
            kind: source.kind(),
            message: format!("{context}: {}: {source}", path.display()),
        }
    }

    #[must_use]
    pub fn is_disk_full(&self) -> bool {
        matches!(self, Self::Io { kind, .. } if *kind == std::io::ErrorKind::StorageFull)
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io { kind, .. } if *kind == std::io::ErrorKind::PermissionDenied)
    }
}

impl From<std::io::Error> for InstallError {
    fn from(err: std::io::Error) -> Self {
        InstallError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ComponentSpecError> for InstallError {
    fn from(err: ComponentSpecError) -> Self {
        match err {
            ComponentSpecError::UnknownComponent(name) => InstallError::InvalidComponent(name),
            ComponentSpecError::Channel(error) => InstallError::InvalidChannel(error),
        }
    }
}
