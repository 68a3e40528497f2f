use std::path::{Path, PathBuf};

use dnup_backend::{
    ArchiveDigest, ArchiveDownloader, ArchiveFormat, ArchiveRequest, DownloadStage,
    DownloadedArchive, InstallComponent, InstallError, ReleaseVersion,
};
use log::debug;

/// Serves archives from a directory laid out like the official download
/// feed: `<prefix>-<version>-<os>-<arch>.<ext>`, with an optional
/// `<archive>.sha512` sidecar holding the expected hash.
#[derive(Debug, Clone)]
pub struct LocalArchiveDirectory {
    dir: PathBuf,
    format: ArchiveFormat,
    os: String,
}

impl LocalArchiveDirectory {
    /// Archives in the running platform's native format.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_format(dir, ArchiveFormat::native())
    }

    #[must_use]
    pub fn with_format(dir: impl Into<PathBuf>, format: ArchiveFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            os: dnup_platform::archive_os_name().to_string(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn archive_file_name(
        &self,
        component: InstallComponent,
        version: &ReleaseVersion,
        architecture: &str,
    ) -> String {
        format!(
            "{}-{version}-{}-{}.{}",
            component.archive_prefix(),
            self.os,
            architecture.to_ascii_lowercase(),
            self.format.extension()
        )
    }

    fn sidecar_digest(source: &Path) -> Result<Option<ArchiveDigest>, InstallError> {
        let mut sidecar = source.as_os_str().to_owned();
        sidecar.push(".sha512");
        let sidecar = PathBuf::from(sidecar);

        let text = match std::fs::read_to_string(&sidecar) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(InstallError::download(
                    DownloadStage::Connectivity,
                    format!("failed to read {}: {error}", sidecar.display()),
                ));
            }
        };

        let hash = text.split_whitespace().next().unwrap_or_default();
        ArchiveDigest::from_hex(hash).map(Some).ok_or_else(|| {
            InstallError::download(
                DownloadStage::Verification,
                format!("{} does not hold a sha256 or sha512 digest", sidecar.display()),
            )
        })
    }
}

impl ArchiveDownloader for LocalArchiveDirectory {
    fn download_archive(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
    ) -> Result<DownloadedArchive, InstallError> {
        let name = self.archive_file_name(
            request.component,
            &request.version,
            &request.root.architecture,
        );
        let source = self.dir.join(&name);
        if !source.is_file() {
            return Err(InstallError::download(
                DownloadStage::Server,
                format!("{name} is not available in {}", self.dir.display()),
            ));
        }

        let digest = Self::sidecar_digest(&source)?;
        let copied = std::fs::copy(&source, destination).map_err(|error| {
            if error.kind() == std::io::ErrorKind::StorageFull {
                InstallError::io_with_path("failed to store archive", destination, &error)
            } else {
                InstallError::download(
                    DownloadStage::Connectivity,
                    format!("failed to copy {}: {error}", source.display()),
                )
            }
        })?;
        debug!("Fetched {name} ({copied} bytes)");

        Ok(DownloadedArchive {
            format: self.format,
            digest,
        })
    }
}
