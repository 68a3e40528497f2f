use serde::{Deserialize, Serialize};

use crate::types::{InstallComponent, ReleaseVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Lts,
    Sts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupportPhase {
    Preview,
    GoLive,
    Active,
    Maintenance,
    Eol,
}

impl SupportPhase {
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Eol)
    }
}

/// One published patch release of a product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseEntry {
    pub release_version: ReleaseVersion,
    #[serde(default)]
    pub sdks: Vec<ReleaseVersion>,
    #[serde(default)]
    pub runtime: Option<ReleaseVersion>,
    #[serde(default)]
    pub aspnetcore: Option<ReleaseVersion>,
    #[serde(default)]
    pub windowsdesktop: Option<ReleaseVersion>,
}

impl ReleaseEntry {
    /// Versions of `component` shipped in this release.
    pub fn versions_for(
        &self,
        component: InstallComponent,
    ) -> Box<dyn Iterator<Item = &ReleaseVersion> + '_> {
        match component {
            InstallComponent::Sdk => Box::new(self.sdks.iter()),
            InstallComponent::Runtime => Box::new(self.runtime.iter()),
            InstallComponent::AspNetCore => Box::new(self.aspnetcore.iter()),
            InstallComponent::WindowsDesktop => Box::new(self.windowsdesktop.iter()),
        }
    }
}

/// A `major.minor` product line such as .NET 9.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductInfo {
    pub channel_version: String,
    pub release_type: ReleaseType,
    pub support_phase: SupportPhase,
    #[serde(default)]
    pub releases: Vec<ReleaseEntry>,
}

impl ProductInfo {
    /// `(major, minor)` parsed from `channel_version`.
    #[must_use]
    pub fn major_minor(&self) -> Option<(u64, u64)> {
        let (major, minor) = self.channel_version.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }

    #[must_use]
    pub fn is_lts(&self) -> bool {
        self.release_type == ReleaseType::Lts
    }

    /// Every published version of `component` in this product line.
    pub fn versions_for(
        &self,
        component: InstallComponent,
    ) -> impl Iterator<Item = &ReleaseVersion> + '_ {
        self.releases
            .iter()
            .flat_map(move |release| release.versions_for(component))
    }
}
