use std::path::{Path, PathBuf};

use dnup_backend::{DotnetInstall, InstallComponent, ReleaseVersion};
use log::debug;

const SHARED_DIR: &str = "shared";
const SDK_DIR: &str = "sdk";

/// On-disk structure of an install root.
///
/// ```text
/// <root>/dotnet[.exe]
/// <root>/sdk/<version>/
/// <root>/shared/Microsoft.NETCore.App/<version>/
/// <root>/shared/Microsoft.AspNetCore.App/<version>/
/// <root>/shared/Microsoft.WindowsDesktop.App/<version>/
/// ```
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn muxer_path(&self) -> PathBuf {
        self.root.join(dnup_platform::muxer_file_name())
    }

    /// Directory holding every version of `component`.
    #[must_use]
    pub fn component_directory(&self, component: InstallComponent) -> PathBuf {
        match component.runtime_directory_name() {
            Some(name) => self.root.join(SHARED_DIR).join(name),
            None => self.root.join(SDK_DIR),
        }
    }

    /// Directory an install of `component` at `version` populates.
    #[must_use]
    pub fn component_path(&self, component: InstallComponent, version: &ReleaseVersion) -> PathBuf {
        self.component_directory(component).join(version.to_string())
    }

    /// Directories an archive for `component` at `version` is known to
    /// create. ASP.NET Core and Windows Desktop archives also carry the
    /// matching base runtime, assumed to share the component's version.
    #[must_use]
    pub fn archive_directories(
        &self,
        component: InstallComponent,
        version: &ReleaseVersion,
    ) -> Vec<PathBuf> {
        let mut directories = vec![self.component_path(component, version)];
        if matches!(
            component,
            InstallComponent::AspNetCore | InstallComponent::WindowsDesktop
        ) {
            directories.push(self.component_path(InstallComponent::Runtime, version));
        }
        directories
    }

    /// Versions of `component` present on disk, ascending. Directories whose
    /// names are not versions are ignored.
    #[must_use]
    pub fn installed_versions(&self, component: InstallComponent) -> Vec<ReleaseVersion> {
        let directory = self.component_directory(component);
        let Ok(entries) = std::fs::read_dir(&directory) else {
            return Vec::new();
        };

        let mut versions: Vec<ReleaseVersion> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                match name.parse() {
                    Ok(version) => Some(version),
                    Err(_) => {
                        debug!("Ignoring non-version directory {}", entry.path().display());
                        None
                    }
                }
            })
            .collect();
        versions.sort();
        versions
    }

    /// Highest version across every shared runtime directory. The muxer
    /// ships with the runtime, so this is the version the muxer should match.
    #[must_use]
    pub fn highest_runtime_version(&self) -> Option<ReleaseVersion> {
        InstallComponent::ALL
            .into_iter()
            .filter(|component| component.runtime_directory_name().is_some())
            .filter_map(|component| self.installed_versions(component).pop())
            .max()
    }

    /// Whether any of `installs` in this root put `directory` on disk.
    #[must_use]
    pub fn is_directory_referenced(&self, directory: &Path, installs: &[DotnetInstall]) -> bool {
        let key = dnup_platform::path_key(directory);
        let root_key = dnup_platform::path_key(&self.root);
        installs
            .iter()
            .filter(|install| dnup_platform::path_key(&install.root.path) == root_key)
            .flat_map(|install| self.archive_directories(install.component, &install.version))
            .any(|candidate| dnup_platform::path_key(&candidate) == key)
    }
}
