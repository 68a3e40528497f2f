use semver::Prerelease;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A `major.minor.patch[-prerelease]` version as published by the release
/// index. Build metadata is accepted and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pre: Prerelease,
}

impl ReleaseVersion {
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Prerelease::EMPTY,
        }
    }

    /// Attach a prerelease label such as `preview.6.25358.103`.
    ///
    /// # Errors
    /// Returns an error if the label is not a dot-separated list of
    /// alphanumeric identifiers.
    pub fn with_prerelease(mut self, label: &str) -> Result<Self, VersionParseError> {
        self.pre = parse_prerelease(label)?;
        Ok(self)
    }

    #[must_use]
    pub fn prerelease(&self) -> Option<&str> {
        if self.pre.is_empty() {
            None
        } else {
            Some(self.pre.as_str())
        }
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// SDK feature band digit: `9.0.304` is in band `3` (`3xx`).
    #[must_use]
    pub fn feature_band(&self) -> u64 {
        self.patch / 100
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            // An empty prerelease sorts above every non-empty one.
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z format, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
    #[error("Invalid prerelease label: {label}")]
    InvalidPrerelease { label: String },
}

fn parse_prerelease(label: &str) -> Result<Prerelease, VersionParseError> {
    if label.is_empty() {
        return Err(VersionParseError::InvalidPrerelease {
            label: label.to_string(),
        });
    }
    Prerelease::new(label).map_err(|_| VersionParseError::InvalidPrerelease {
        label: label.to_string(),
    })
}

fn parse_numeric(component: VersionComponent, value: &str) -> Result<u64, VersionParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        });
    }
    value
        .parse()
        .map_err(|_| VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        })
}

impl FromStr for ReleaseVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let without_build = s.split_once('+').map_or(s, |(head, _)| head);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        };

        let version = Self::new(
            parse_numeric(VersionComponent::Major, major)?,
            parse_numeric(VersionComponent::Minor, minor)?,
            parse_numeric(VersionComponent::Patch, patch)?,
        );
        match pre {
            Some(label) => version.with_prerelease(label),
            None => Ok(version),
        }
    }
}

impl Serialize for ReleaseVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The installable product parts. Never interchangeable, even at equal
/// version numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallComponent {
    Sdk,
    Runtime,
    AspNetCore,
    WindowsDesktop,
}

impl InstallComponent {
    pub const ALL: [Self; 4] = [
        Self::Sdk,
        Self::Runtime,
        Self::AspNetCore,
        Self::WindowsDesktop,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Runtime => "runtime",
            Self::AspNetCore => "aspnetcore",
            Self::WindowsDesktop => "windowsdesktop",
        }
    }

    /// Case-insensitive lookup of a component by its manifest name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|component| component.as_str().eq_ignore_ascii_case(name.trim()))
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Sdk => ".NET SDK",
            Self::Runtime => ".NET Runtime",
            Self::AspNetCore => "ASP.NET Core Runtime",
            Self::WindowsDesktop => "Windows Desktop Runtime",
        }
    }

    /// Directory under `shared/` holding this component's versions. The SDK
    /// has no shared framework directory of its own.
    #[must_use]
    pub const fn runtime_directory_name(self) -> Option<&'static str> {
        match self {
            Self::Sdk => None,
            Self::Runtime => Some("Microsoft.NETCore.App"),
            Self::AspNetCore => Some("Microsoft.AspNetCore.App"),
            Self::WindowsDesktop => Some("Microsoft.WindowsDesktop.App"),
        }
    }

    /// Windows Desktop ships for Windows only; everything else installs
    /// anywhere.
    #[must_use]
    pub const fn is_supported_on_host(self) -> bool {
        match self {
            Self::WindowsDesktop => cfg!(windows),
            Self::Sdk | Self::Runtime | Self::AspNetCore => true,
        }
    }

    /// Name used in published archive file names.
    #[must_use]
    pub const fn archive_prefix(self) -> &'static str {
        match self {
            Self::Sdk => "dotnet-sdk",
            Self::Runtime => "dotnet-runtime",
            Self::AspNetCore => "aspnetcore-runtime",
            Self::WindowsDesktop => "windowsdesktop-runtime",
        }
    }
}

impl fmt::Display for InstallComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory tree holding one installation for one architecture.
///
/// Equality and hashing use [`dnup_platform::path_key`], so `/opt/dotnet/`
/// and `/opt/dotnet` name the same root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRoot {
    pub path: PathBuf,
    pub architecture: String,
}

impl InstallRoot {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, architecture: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            architecture: architecture.into(),
        }
    }

    /// Root for the architecture of the running process.
    #[must_use]
    pub fn native(path: impl Into<PathBuf>) -> Self {
        Self::new(path, dnup_platform::default_architecture())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self) -> (String, String) {
        (
            dnup_platform::path_key(&self.path),
            self.architecture.to_ascii_lowercase(),
        )
    }
}

impl PartialEq for InstallRoot {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for InstallRoot {}

impl Hash for InstallRoot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for InstallRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.architecture)
    }
}

/// One installed `(root, component, version)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotnetInstall {
    pub root: InstallRoot,
    pub component: InstallComponent,
    pub version: ReleaseVersion,
}

impl DotnetInstall {
    #[must_use]
    pub fn new(root: InstallRoot, component: InstallComponent, version: ReleaseVersion) -> Self {
        Self {
            root,
            component,
            version,
        }
    }
}

impl fmt::Display for DotnetInstall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} in {}", self.component, self.version, self.root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Resolving,
    Downloading,
    Extracting,
    Finalizing,
    Recording,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub component: InstallComponent,
    pub version: Option<ReleaseVersion>,
    pub phase: InstallPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> ReleaseVersion {
        text.parse().expect("valid version in test")
    }

    #[test]
    fn parse_release_version() {
        let version = v("9.0.103");
        assert_eq!((version.major, version.minor, version.patch), (9, 0, 103));
        assert_eq!(version.prerelease(), None);
        assert_eq!(version.feature_band(), 1);
    }

    #[test]
    fn parse_prerelease_version() {
        let version = v("10.0.100-preview.6.25358.103");
        assert_eq!(version.prerelease(), Some("preview.6.25358.103"));
        assert!(version.is_prerelease());
        assert_eq!(version.to_string(), "10.0.100-preview.6.25358.103");
    }

    #[test]
    fn parse_drops_build_metadata_and_v_prefix() {
        assert_eq!(v("v9.0.0+abc123"), ReleaseVersion::new(9, 0, 0));
    }

    #[test]
    fn parse_rejects_malformed_versions() {
        assert!(matches!(
            "9.0".parse::<ReleaseVersion>(),
            Err(VersionParseError::InvalidFormat { .. })
        ));
        assert!(matches!(
            "9.x.0".parse::<ReleaseVersion>(),
            Err(VersionParseError::InvalidComponent {
                component: VersionComponent::Minor,
                ..
            })
        ));
        assert!(matches!(
            "9.0.0-".parse::<ReleaseVersion>(),
            Err(VersionParseError::InvalidPrerelease { .. })
        ));
        assert!("9.0.+1".parse::<ReleaseVersion>().is_err());
    }

    #[test]
    fn release_sorts_above_prerelease() {
        assert!(v("10.0.0") > v("10.0.0-preview.7.25380.108"));
        assert!(v("10.0.0") > v("10.0.0-rc.2.25502.107"));
        assert!(v("10.0.1-preview.1") > v("10.0.0"));
    }

    #[test]
    fn prerelease_identifiers_compare_numerically() {
        assert!(v("10.0.0-preview.6.1") > v("10.0.0-preview.5.9"));
        assert!(v("10.0.0-preview.10.0") > v("10.0.0-preview.9.0"));
        assert!(v("10.0.0-rc.1.0") > v("10.0.0-preview.7.0"));
        assert!(v("1.0.0-beta.10") > v("1.0.0-beta.2"));
    }

    #[test]
    fn version_ordering_by_components() {
        assert!(v("9.0.0") > v("8.0.400"));
        assert!(v("9.1.0") > v("9.0.999"));
        assert!(v("9.0.2") > v("9.0.1"));
        assert_eq!(v("9.0.2").cmp(&v("9.0.2")), Ordering::Equal);
    }

    #[test]
    fn version_serializes_as_string() {
        let json = serde_json::to_string(&v("9.0.0-rc.1")).expect("serialize");
        assert_eq!(json, "\"9.0.0-rc.1\"");
        let back: ReleaseVersion = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, v("9.0.0-rc.1"));
    }

    #[test]
    fn component_names_round_trip_case_insensitively() {
        for component in InstallComponent::ALL {
            assert_eq!(InstallComponent::from_name(component.as_str()), Some(component));
        }
        assert_eq!(
            InstallComponent::from_name("AspNetCore"),
            Some(InstallComponent::AspNetCore)
        );
        assert_eq!(InstallComponent::from_name("node"), None);
    }

    #[test]
    fn runtime_directory_names_are_fixed() {
        assert_eq!(
            InstallComponent::Runtime.runtime_directory_name(),
            Some("Microsoft.NETCore.App")
        );
        assert_eq!(
            InstallComponent::AspNetCore.runtime_directory_name(),
            Some("Microsoft.AspNetCore.App")
        );
        assert_eq!(
            InstallComponent::WindowsDesktop.runtime_directory_name(),
            Some("Microsoft.WindowsDesktop.App")
        );
        assert_eq!(InstallComponent::Sdk.runtime_directory_name(), None);
    }

    #[test]
    fn only_windows_desktop_depends_on_host() {
        for component in [
            InstallComponent::Sdk,
            InstallComponent::Runtime,
            InstallComponent::AspNetCore,
        ] {
            assert!(component.is_supported_on_host());
        }
        assert_eq!(
            InstallComponent::WindowsDesktop.is_supported_on_host(),
            cfg!(windows)
        );
    }

    #[test]
    fn install_roots_compare_by_normalized_path_and_architecture() {
        let a = InstallRoot::new("/opt/dotnet/", "x64");
        let b = InstallRoot::new("/opt/dotnet", "X64");
        let c = InstallRoot::new("/opt/dotnet", "arm64");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn installs_differ_by_component_at_equal_versions() {
        let root = InstallRoot::new("/opt/dotnet", "x64");
        let sdk = DotnetInstall::new(root.clone(), InstallComponent::Sdk, v("9.0.0"));
        let runtime = DotnetInstall::new(root, InstallComponent::Runtime, v("9.0.0"));
        assert_ne!(sdk, runtime);
    }
}
