use std::path::Path;

use crate::error::InstallError;
use crate::release::ProductInfo;
use crate::types::{InstallComponent, InstallRoot, ReleaseVersion};

/// Read-only view of the published release index.
pub trait ReleaseIndex: Send + Sync {
    /// All product lines, in any order.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    fn products(&self) -> Result<Vec<ProductInfo>, InstallError>;

    /// Whether `version` was published for `component`.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    fn is_published(
        &self,
        component: InstallComponent,
        version: &ReleaseVersion,
    ) -> Result<bool, InstallError> {
        Ok(self.products()?.iter().any(|product| {
            product
                .versions_for(component)
                .any(|published| published == version)
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    /// Archive format published for the running platform.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(windows) { Self::Zip } else { Self::TarGz }
    }
}

/// Expected hash of a downloaded archive, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveDigest {
    Sha256(String),
    Sha512(String),
}

impl ArchiveDigest {
    /// Pick the algorithm from the hex digest length.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            64 => Some(Self::Sha256(hex.to_ascii_lowercase())),
            128 => Some(Self::Sha512(hex.to_ascii_lowercase())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub component: InstallComponent,
    pub version: ReleaseVersion,
    pub root: InstallRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub format: ArchiveFormat,
    pub digest: Option<ArchiveDigest>,
}

/// Fetches the archive for a component version.
pub trait ArchiveDownloader: Send + Sync {
    /// Write the archive for `request` to `destination`.
    ///
    /// # Errors
    /// Returns [`InstallError::DownloadFailed`] when the archive cannot be
    /// fetched.
    fn download_archive(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
    ) -> Result<DownloadedArchive, InstallError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{ReleaseEntry, ReleaseType, SupportPhase};

    struct MockIndex {
        products: Vec<ProductInfo>,
    }

    impl ReleaseIndex for MockIndex {
        fn products(&self) -> Result<Vec<ProductInfo>, InstallError> {
            Ok(self.products.clone())
        }
    }

    fn v(text: &str) -> ReleaseVersion {
        text.parse().expect("valid version in test")
    }

    #[test]
    fn is_published_checks_component_lists() {
        let index = MockIndex {
            products: vec![ProductInfo {
                channel_version: "9.0".to_string(),
                release_type: ReleaseType::Sts,
                support_phase: SupportPhase::Active,
                releases: vec![ReleaseEntry {
                    release_version: v("9.0.1"),
                    sdks: vec![v("9.0.102")],
                    runtime: Some(v("9.0.1")),
                    aspnetcore: None,
                    windowsdesktop: None,
                }],
            }],
        };

        assert!(index.is_published(InstallComponent::Sdk, &v("9.0.102")).expect("lookup"));
        assert!(!index.is_published(InstallComponent::Runtime, &v("9.0.102")).expect("lookup"));
        assert!(index.is_published(InstallComponent::Runtime, &v("9.0.1")).expect("lookup"));
        assert!(!index.is_published(InstallComponent::AspNetCore, &v("9.0.1")).expect("lookup"));
    }

    #[test]
    fn digest_algorithm_follows_length() {
        assert!(matches!(ArchiveDigest::from_hex(&"a".repeat(64)), Some(ArchiveDigest::Sha256(_))));
        assert!(matches!(ArchiveDigest::from_hex(&"B".repeat(128)), Some(ArchiveDigest::Sha512(ref hex)) if hex == &"b".repeat(128)));
        assert!(ArchiveDigest::from_hex("abcd").is_none());
        assert!(ArchiveDigest::from_hex(&"z".repeat(64)).is_none());
    }
}
