use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Sender;
use dnup_backend::{
    ArchiveDownloader, ArchiveRequest, DotnetInstall, InstallComponent, InstallError,
    InstallPhase, InstallProgress, InstallRoot, ReleaseIndex, ReleaseVersion, UpdateChannel,
};
use dnup_platform::{AppPaths, MODIFY_INSTALLATION_STATES, ScopedMutex};
use log::{debug, info};

use crate::extract::ArchiveExtractor;
use crate::layout::InstallLayout;
use crate::manifest::InstallManifest;
use crate::muxer::{MuxerAction, MuxerPolicy};
use crate::resolver::ChannelResolver;

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Disable the release fallback of the `preview` channel.
    pub no_fallback: bool,
    pub muxer_policy: MuxerPolicy,
    /// Bound on the wait for the installation lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    pub progress: Option<Sender<InstallProgress>>,
}

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub root: InstallRoot,
    pub channel: UpdateChannel,
    pub component: InstallComponent,
    pub options: InstallOptions,
}

impl InstallRequest {
    #[must_use]
    pub fn new(root: InstallRoot, channel: UpdateChannel, component: InstallComponent) -> Self {
        Self {
            root,
            channel,
            component,
            options: InstallOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
    /// The shared framework was already on disk, laid down by another
    /// component's archive; only the manifest entry was added.
    RecordedExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub install: DotnetInstall,
    pub status: InstallStatus,
    pub muxer: MuxerAction,
}

/// Installs components into roots, holding [`MODIFY_INSTALLATION_STATES`]
/// for the whole operation so two processes never both decide a component
/// is missing.
pub struct Installer<'a> {
    index: &'a dyn ReleaseIndex,
    downloader: &'a dyn ArchiveDownloader,
    manifest: InstallManifest,
    lock_dir: PathBuf,
}

impl<'a> Installer<'a> {
    #[must_use]
    pub fn new(
        index: &'a dyn ReleaseIndex,
        downloader: &'a dyn ArchiveDownloader,
        manifest: InstallManifest,
        lock_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            downloader,
            manifest,
            lock_dir: lock_dir.into(),
        }
    }

    /// Installer using the manifest and lock directory under `paths`.
    #[must_use]
    pub fn for_paths(
        index: &'a dyn ReleaseIndex,
        downloader: &'a dyn ArchiveDownloader,
        paths: &AppPaths,
    ) -> Self {
        Self::new(
            index,
            downloader,
            InstallManifest::new(paths.manifest_file()),
            paths.lock_dir(),
        )
    }

    #[must_use]
    pub fn manifest(&self) -> &InstallManifest {
        &self.manifest
    }

    /// Take the installation lock, honoring `timeout` when given.
    ///
    /// # Errors
    /// Returns [`InstallError::Lock`] on timeout or lock I/O failure.
    pub fn lock(&self, timeout: Option<Duration>) -> Result<ScopedMutex, InstallError> {
        let guard = match timeout {
            Some(timeout) => {
                ScopedMutex::acquire_timeout(&self.lock_dir, MODIFY_INSTALLATION_STATES, timeout)?
            }
            None => ScopedMutex::acquire(&self.lock_dir, MODIFY_INSTALLATION_STATES)?,
        };
        Ok(guard)
    }

    /// Resolve, extract and record one component.
    ///
    /// A component already recorded for the root returns
    /// [`InstallStatus::AlreadyInstalled`] without downloading anything. A
    /// runtime whose shared framework directory already exists, for example
    /// from an SDK archive, is recorded without a download and returns
    /// [`InstallStatus::RecordedExisting`].
    ///
    /// # Errors
    /// Returns [`InstallError::UnsupportedComponent`] for a component this
    /// host cannot run, [`InstallError::VersionNotFound`] when the channel
    /// matches nothing, and any lock, download, extraction or manifest error.
    pub fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, InstallError> {
        let InstallRequest {
            root,
            channel,
            component,
            options,
        } = request;
        let component = *component;
        let report = |version: Option<&ReleaseVersion>, phase: InstallPhase| {
            if let Some(progress) = &options.progress {
                let _ = progress.send(InstallProgress {
                    component,
                    version: version.cloned(),
                    phase,
                });
            }
        };

        if !component.is_supported_on_host() {
            return Err(InstallError::UnsupportedComponent { component });
        }

        let lock = self.lock(options.lock_timeout)?;

        report(None, InstallPhase::Resolving);
        let version = ChannelResolver::new(self.index).resolve_required(
            channel,
            component,
            options.no_fallback,
        )?;
        let install = DotnetInstall::new(root.clone(), component, version.clone());

        if self.manifest.contains(&lock, &install)? {
            info!("{install} is already installed");
            report(Some(&version), InstallPhase::Complete);
            return Ok(InstallOutcome {
                install,
                status: InstallStatus::AlreadyInstalled,
                muxer: MuxerAction::NotStaged,
            });
        }

        let layout = InstallLayout::new(root.path());
        let expected = layout.component_path(component, &version);
        if component.runtime_directory_name().is_some() && expected.is_dir() {
            info!("{install}: files already exist, recording without download");
            report(Some(&version), InstallPhase::Recording);
            self.manifest.add_installed_version(&lock, &install)?;
            report(Some(&version), InstallPhase::Complete);
            return Ok(InstallOutcome {
                install,
                status: InstallStatus::RecordedExisting,
                muxer: MuxerAction::NotStaged,
            });
        }

        let mut extractor = ArchiveExtractor::new(
            ArchiveRequest {
                component,
                version: version.clone(),
                root: root.clone(),
            },
            self.index,
            self.downloader,
            options.muxer_policy,
        )?;

        report(Some(&version), InstallPhase::Downloading);
        extractor.prepare()?;
        report(Some(&version), InstallPhase::Extracting);
        extractor.extract()?;

        if !expected.is_dir() {
            return Err(InstallError::extraction(
                "archive is missing component files",
                format!("{} was not created", expected.display()),
            ));
        }

        report(Some(&version), InstallPhase::Finalizing);
        let muxer = extractor.finalize()?;
        drop(extractor);

        report(Some(&version), InstallPhase::Recording);
        self.manifest.add_installed_version(&lock, &install)?;
        drop(lock);

        debug!("Muxer outcome for {install}: {muxer:?}");
        report(Some(&version), InstallPhase::Complete);
        Ok(InstallOutcome {
            install,
            status: InstallStatus::Installed,
            muxer,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dnup_backend::{
        ArchiveDownloader, ArchiveFormat, ArchiveRequest, DownloadedArchive, InstallComponent,
        InstallError, InstallPhase, InstallRoot, ProductInfo, ReleaseEntry, ReleaseType,
        ReleaseVersion, SupportPhase,
    };

    use super::{InstallOptions, InstallRequest, InstallStatus, Installer};
    use crate::archive::tests::write_zip;
    use crate::manifest::InstallManifest;
    use crate::muxer::MuxerAction;
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
                sdks: vec![v("9.0.302")],
                runtime: Some(v("9.0.7")),
                aspnetcore: Some(v("9.0.7")),
                windowsdesktop: None,
            }],
        }])
    }

    #[derive(Default)]
    struct CountingDownloader {
        calls: AtomicUsize,
        omit_component_dir: bool,
    }

    impl ArchiveDownloader for CountingDownloader {
        fn download_archive(
            &self,
            request: &ArchiveRequest,
            destination: &Path,
        ) -> Result<DownloadedArchive, InstallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let file = if self.omit_component_dir {
                "LICENSE.txt".to_string()
            } else {
                format!("shared/Microsoft.NETCore.App/{}/System.Runtime.dll", request.version)
            };
            write_zip(
                destination,
                &[(dnup_platform::muxer_file_name(), b"muxer"), (file.as_str(), b"payload")],
            );
            Ok(DownloadedArchive {
                format: ArchiveFormat::Zip,
                digest: None,
            })
        }
    }

    #[test]
    fn second_install_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader::default();
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(temp.path().join("manifest.json")),
            temp.path().join("locks"),
        );
        let request = InstallRequest::new(
            InstallRoot::new(temp.path().join("dotnet"), "x64"),
            "9.0".parse().expect("valid channel"),
            InstallComponent::Runtime,
        );

        let first = installer.install(&request).expect("first install");
        assert_eq!(first.status, InstallStatus::Installed);
        assert_eq!(first.muxer, MuxerAction::Installed);
        assert_eq!(first.install.version, v("9.0.7"));

        let second = installer.install(&request).expect("second install");
        assert_eq!(second.status, InstallStatus::AlreadyInstalled);
        assert_eq!(second.install, first.install);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_channel_is_version_not_found() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader::default();
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(temp.path().join("manifest.json")),
            temp.path().join("locks"),
        );
        let request = InstallRequest::new(
            InstallRoot::new(temp.path().join("dotnet"), "x64"),
            "9.0.3xx".parse().expect("valid channel"),
            InstallComponent::Runtime,
        );

        assert!(matches!(
            installer.install(&request),
            Err(InstallError::VersionNotFound { .. })
        ));
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(not(windows))]
    #[test]
    fn windows_desktop_is_rejected_off_windows() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader::default();
        let manifest_path = temp.path().join("manifest.json");
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(&manifest_path),
            temp.path().join("locks"),
        );
        let request = InstallRequest::new(
            InstallRoot::new(temp.path().join("dotnet"), "x64"),
            "9.0".parse().expect("valid channel"),
            InstallComponent::WindowsDesktop,
        );

        let error = installer
            .install(&request)
            .expect_err("windows desktop cannot install here");
        assert!(matches!(
            error,
            InstallError::UnsupportedComponent {
                component: InstallComponent::WindowsDesktop
            }
        ));
        assert!(
            error
                .to_string()
                .contains("Windows Desktop Runtime is only available on Windows")
        );
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert!(!manifest_path.exists());
    }

    #[test]
    fn runtime_files_on_disk_are_recorded_without_download() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader::default();
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(temp.path().join("manifest.json")),
            temp.path().join("locks"),
        );
        let root = InstallRoot::new(temp.path().join("dotnet"), "x64");
        std::fs::create_dir_all(root.path().join("shared/Microsoft.NETCore.App/9.0.7"))
            .expect("runtime dir should be created");
        let request = InstallRequest::new(
            root,
            "9.0".parse().expect("valid channel"),
            InstallComponent::Runtime,
        );

        let outcome = installer.install(&request).expect("install");
        assert_eq!(outcome.status, InstallStatus::RecordedExisting);
        assert_eq!(outcome.muxer, MuxerAction::NotStaged);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);

        let repeat = installer.install(&request).expect("repeat install");
        assert_eq!(repeat.status, InstallStatus::AlreadyInstalled);
    }

    #[test]
    fn archive_without_component_files_is_not_recorded() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader {
            omit_component_dir: true,
            ..CountingDownloader::default()
        };
        let manifest_path = temp.path().join("manifest.json");
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(&manifest_path),
            temp.path().join("locks"),
        );
        let root = InstallRoot::new(temp.path().join("dotnet"), "x64");
        let request = InstallRequest::new(
            root.clone(),
            "9.0.7".parse().expect("valid channel"),
            InstallComponent::Runtime,
        );

        assert!(matches!(
            installer.install(&request),
            Err(InstallError::ExtractionFailed { .. })
        ));
        assert!(!manifest_path.exists());
        let staged: Vec<_> = std::fs::read_dir(root.path())
            .expect("root exists")
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(staged.is_empty(), "staged muxer is cleaned up on failure");
    }

    #[test]
    fn progress_ends_with_complete_and_survives_dropped_receiver() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let index = index();
        let downloader = CountingDownloader::default();
        let installer = Installer::new(
            &index,
            &downloader,
            InstallManifest::new(temp.path().join("manifest.json")),
            temp.path().join("locks"),
        );
        let (sender, receiver) = crossbeam_channel::unbounded();
        let request = InstallRequest::new(
            InstallRoot::new(temp.path().join("dotnet"), "x64"),
            "latest".parse().expect("valid channel"),
            InstallComponent::Runtime,
        )
        .with_options(InstallOptions {
            progress: Some(sender),
            ..InstallOptions::default()
        });

        installer.install(&request).expect("install");
        let phases: Vec<InstallPhase> = receiver.try_iter().map(|event| event.phase).collect();
        assert_eq!(
            phases,
            vec![
                InstallPhase::Resolving,
                InstallPhase::Downloading,
                InstallPhase::Extracting,
                InstallPhase::Finalizing,
                InstallPhase::Recording,
                InstallPhase::Complete,
            ]
        );

        drop(receiver);
        let repeat = installer.install(&request).expect("repeat install");
        assert_eq!(repeat.status, InstallStatus::AlreadyInstalled);
    }
}
