//! One archive's trip from the release index to an install root.
//!
//! ```text
//! Created --prepare--> Prepared --extract--> Extracted --finalize--> Finalized
//!    \__________________\_______________________\______ any error --> Failed
//! ```
//!
//! Dropping the extractor in any state removes the scratch directory and any
//! staged muxer that was not moved into place.

use std::fmt;
use std::path::{Path, PathBuf};

use dnup_backend::{
    ArchiveDownloader, ArchiveFormat, ArchiveRequest, DownloadStage, InstallError, ReleaseIndex,
};
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::archive;
use crate::layout::InstallLayout;
use crate::muxer::{MuxerAction, MuxerPolicy, MuxerReconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Created,
    Prepared,
    Extracted,
    Finalized,
    Failed,
}

impl ExtractorState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Prepared => "prepared",
            Self::Extracted => "extracted",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExtractorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct PreparedArchive {
    path: PathBuf,
    format: ArchiveFormat,
}

pub struct ArchiveExtractor<'a> {
    request: ArchiveRequest,
    index: &'a dyn ReleaseIndex,
    downloader: &'a dyn ArchiveDownloader,
    scratch: TempDir,
    archive: Option<PreparedArchive>,
    muxer: MuxerReconciler,
    state: ExtractorState,
}

impl<'a> ArchiveExtractor<'a> {
    /// # Errors
    /// Returns an error if the scratch directory cannot be created.
    pub fn new(
        request: ArchiveRequest,
        index: &'a dyn ReleaseIndex,
        downloader: &'a dyn ArchiveDownloader,
        policy: MuxerPolicy,
    ) -> Result<Self, InstallError> {
        let scratch = tempfile::Builder::new()
            .prefix("dnup-download-")
            .tempdir()
            .map_err(|error| InstallError::extraction("failed to create scratch directory", error))?;
        let muxer = MuxerReconciler::new(InstallLayout::new(request.root.path.clone()), policy);
        Ok(Self {
            request,
            index,
            downloader,
            scratch,
            archive: None,
            muxer,
            state: ExtractorState::Created,
        })
    }

    #[must_use]
    pub fn state(&self) -> ExtractorState {
        self.state
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Check the version is published, download the archive into the
    /// scratch directory and verify its digest.
    ///
    /// # Errors
    /// Returns [`InstallError::InvalidVersion`] for an unpublished version,
    /// or the downloader's or verifier's error.
    pub fn prepare(&mut self) -> Result<(), InstallError> {
        self.require("prepare", ExtractorState::Created)?;
        let result = self.download_and_verify();
        self.advance(result, ExtractorState::Prepared)
    }

    /// Unpack the prepared archive into the install root.
    ///
    /// # Errors
    /// Returns [`InstallError::ArchiveCorrupted`] for unreadable archives or
    /// an I/O error when the root cannot be written.
    pub fn extract(&mut self) -> Result<(), InstallError> {
        self.require("extract", ExtractorState::Prepared)?;
        let result = self.unpack();
        self.advance(result, ExtractorState::Extracted)
    }

    /// Reconcile the muxer.
    ///
    /// # Errors
    /// Returns [`InstallError::MuxerInUse`] under [`MuxerPolicy::Strict`]
    /// when a due replacement fails.
    pub fn finalize(&mut self) -> Result<MuxerAction, InstallError> {
        self.require("finalize", ExtractorState::Extracted)?;
        let result = self.muxer.finalize_after_extraction();
        self.advance(result, ExtractorState::Finalized)
    }

    fn require(&self, operation: &'static str, expected: ExtractorState) -> Result<(), InstallError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(InstallError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn advance<T>(
        &mut self,
        result: Result<T, InstallError>,
        next: ExtractorState,
    ) -> Result<T, InstallError> {
        match &result {
            Ok(_) => self.state = next,
            Err(error) => {
                warn!(
                    "{} {} failed while {}: {error}",
                    self.request.component, self.request.version, self.state
                );
                self.state = ExtractorState::Failed;
            }
        }
        result
    }

    fn download_and_verify(&mut self) -> Result<(), InstallError> {
        let ArchiveRequest {
            component, version, ..
        } = &self.request;
        if !self.index.is_published(*component, version)? {
            return Err(InstallError::InvalidVersion {
                version: version.clone(),
                component: *component,
            });
        }

        let destination = self
            .scratch
            .path()
            .join(format!("{}-{version}", component.archive_prefix()));
        info!("Downloading {component} {version}");
        let downloaded = self.downloader.download_archive(&self.request, &destination)?;
        if !destination.is_file() {
            return Err(InstallError::download(
                DownloadStage::Server,
                format!("no archive was written for {component} {version}"),
            ));
        }

        match &downloaded.digest {
            Some(digest) => archive::verify_digest(&destination, digest)?,
            None => debug!("No digest published for {component} {version}; skipping verification"),
        }

        self.archive = Some(PreparedArchive {
            path: destination,
            format: downloaded.format,
        });
        Ok(())
    }

    fn unpack(&mut self) -> Result<(), InstallError> {
        let Some(prepared) = &self.archive else {
            return Err(InstallError::InvalidState {
                operation: "extract",
                state: "no prepared archive",
            });
        };
        let root = &self.request.root.path;
        std::fs::create_dir_all(root)
            .map_err(|error| InstallError::io_with_path("failed to create install root", root, &error))?;

        self.muxer.record_pre_extraction_state();
        let muxer = &mut self.muxer;
        let written = archive::unpack(&prepared.path, prepared.format, root, &mut || {
            muxer.muxer_extraction_path()
        })?;
        info!(
            "Extracted {} {} into {} ({written} files)",
            self.request.component,
            self.request.version,
            root.display()
        );
        Ok(())
    }
}

impl Drop for ArchiveExtractor<'_> {
    fn drop(&mut self) {
        if self.state != ExtractorState::Finalized {
            debug!(
                "Discarding {} {} extractor in state {}",
                self.request.component, self.request.version, self.state
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use dnup_backend::{
        ArchiveDigest, ArchiveDownloader, ArchiveFormat, ArchiveRequest, DownloadedArchive,
        InstallComponent, InstallError, InstallRoot, ProductInfo, ReleaseEntry, ReleaseType,
        ReleaseVersion, SupportPhase,
    };

    use super::{ArchiveExtractor, ExtractorState};
    use crate::archive::tests::write_zip;
    use crate::muxer::{MuxerAction, MuxerPolicy};
    use crate::release_index::FileReleaseIndex;

    fn v(text: &str) -> ReleaseVersion {
        text.parse().expect("valid version in test")
    }

    fn index() -> FileReleaseIndex {
        FileReleaseIndex::from_products(vec![ProductInfo {
            channel_version: "9.0".to_string(),
            release_type: ReleaseType::Sts,
            support_phase: SupportPhase::Active,
            releases: vec![ReleaseEntry {
                release_version: v("9.0.7"),
                sdks: vec![],
                runtime: Some(v("9.0.7")),
                aspnetcore: None,
                windowsdesktop: None,
            }],
        }])
    }

    /// Writes a small runtime zip, optionally with a wrong digest.
    struct ZipDownloader {
        digest: Option<ArchiveDigest>,
    }

    impl ArchiveDownloader for ZipDownloader {
        fn download_archive(
            &self,
            request: &ArchiveRequest,
            destination: &Path,
        ) -> Result<DownloadedArchive, InstallError> {
            let runtime = format!("shared/Microsoft.NETCore.App/{}/System.Runtime.dll", request.version);
            write_zip(
                destination,
                &[
                    (dnup_platform::muxer_file_name(), b"muxer"),
                    (runtime.as_str(), b"runtime"),
                ],
            );
            Ok(DownloadedArchive {
                format: ArchiveFormat::Zip,
                digest: self.digest.clone(),
            })
        }
    }

    fn request(root: &Path, version: &str) -> ArchiveRequest {
        ArchiveRequest {
            component: InstallComponent::Runtime,
            version: v(version),
            root: InstallRoot::new(root, "x64"),
        }
    }

    #[test]
    fn full_lifecycle_installs_files_and_muxer() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path().join("dotnet");
        let index = index();
        let downloader = ZipDownloader { digest: None };

        let mut extractor =
            ArchiveExtractor::new(request(&root, "9.0.7"), &index, &downloader, MuxerPolicy::Lenient)
                .expect("extractor should be created");
        let scratch = extractor.scratch_dir().to_path_buf();

        extractor.prepare().expect("prepare");
        assert_eq!(extractor.state(), ExtractorState::Prepared);
        extractor.extract().expect("extract");
        assert_eq!(extractor.finalize().expect("finalize"), MuxerAction::Installed);
        assert_eq!(extractor.state(), ExtractorState::Finalized);
        drop(extractor);

        assert!(!scratch.exists(), "scratch directory is removed on drop");
        assert!(root.join("shared/Microsoft.NETCore.App/9.0.7/System.Runtime.dll").is_file());
        assert_eq!(
            std::fs::read(root.join(dnup_platform::muxer_file_name())).expect("muxer"),
            b"muxer"
        );
        let leftovers: Vec<_> = std::fs::read_dir(&root)
            .expect("root readable")
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unpublished_version_fails_prepare() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = ZipDownloader { digest: None };
        let mut extractor = ArchiveExtractor::new(
            request(temp.path(), "9.0.5"),
            &index,
            &downloader,
            MuxerPolicy::Lenient,
        )
        .expect("extractor should be created");

        assert!(matches!(
            extractor.prepare(),
            Err(InstallError::InvalidVersion { .. })
        ));
        assert_eq!(extractor.state(), ExtractorState::Failed);
        assert!(matches!(
            extractor.extract(),
            Err(InstallError::InvalidState { operation: "extract", state: "failed" })
        ));
    }

    #[test]
    fn digest_mismatch_fails_before_touching_root() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path().join("dotnet");
        let index = index();
        let downloader = ZipDownloader {
            digest: Some(ArchiveDigest::Sha512("0".repeat(128))),
        };
        let mut extractor =
            ArchiveExtractor::new(request(&root, "9.0.7"), &index, &downloader, MuxerPolicy::Strict)
                .expect("extractor should be created");

        assert!(matches!(
            extractor.prepare(),
            Err(InstallError::DownloadFailed { .. })
        ));
        assert!(!root.exists());
    }

    #[test]
    fn operations_must_run_in_order() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = ZipDownloader { digest: None };
        let mut extractor = ArchiveExtractor::new(
            request(temp.path(), "9.0.7"),
            &index,
            &downloader,
            MuxerPolicy::Lenient,
        )
        .expect("extractor should be created");

        assert!(matches!(
            extractor.finalize(),
            Err(InstallError::InvalidState { operation: "finalize", state: "created" })
        ));
        assert_eq!(extractor.state(), ExtractorState::Created);
    }
}
