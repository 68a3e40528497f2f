use std::collections::BTreeSet;

use dnup_backend::{
    ChannelKeyword, InstallComponent, InstallError, ProductInfo, ReleaseIndex, ReleaseType,
    ReleaseVersion, UpdateChannel,
};
use log::{debug, info};

/// Maps an [`UpdateChannel`] onto a concrete published version using a
/// [`ReleaseIndex`].
pub struct ChannelResolver<'a> {
    index: &'a dyn ReleaseIndex,
}

impl<'a> ChannelResolver<'a> {
    #[must_use]
    pub fn new(index: &'a dyn ReleaseIndex) -> Self {
        Self { index }
    }

    /// Resolve `channel` for `component`. `Ok(None)` means nothing published
    /// matches.
    ///
    /// `no_fallback` only affects the `preview` keyword: without it, an index
    /// with no prerelease at all falls back to the newest release.
    ///
    /// # Errors
    /// Returns an error when the release index cannot be read.
    pub fn resolve(
        &self,
        channel: &UpdateChannel,
        component: InstallComponent,
        no_fallback: bool,
    ) -> Result<Option<ReleaseVersion>, InstallError> {
        let products = self.index.products()?;

        let resolved = match channel {
            UpdateChannel::ExactVersion(version) => self
                .index
                .is_published(component, version)?
                .then(|| version.clone()),
            UpdateChannel::Major(major) => {
                let candidates = published(&products, component, |_| true)
                    .filter(|version| version.major == *major);
                release_or_prerelease(candidates, channel)
            }
            UpdateChannel::MajorMinor(major, minor) => {
                published(&products, component, |_| true)
                    .filter(|version| {
                        version.major == *major
                            && version.minor == *minor
                            && !version.is_prerelease()
                    })
                    .max()
                    .cloned()
            }
            UpdateChannel::FeatureBand(major, minor, band) => {
                if component != InstallComponent::Sdk {
                    debug!("Feature band channel {channel} only applies to the SDK");
                    return Ok(None);
                }
                let candidates = published(&products, component, |_| true).filter(|version| {
                    version.major == *major
                        && version.minor == *minor
                        && version.feature_band() == u64::from(*band)
                });
                release_or_prerelease(candidates, channel)
            }
            UpdateChannel::Keyword(ChannelKeyword::Latest) => {
                newest_release(published(&products, component, |_| true))
            }
            UpdateChannel::Keyword(ChannelKeyword::Lts) => newest_release(published(
                &products,
                component,
                |product| product.release_type == ReleaseType::Lts,
            )),
            UpdateChannel::Keyword(ChannelKeyword::Sts) => newest_release(published(
                &products,
                component,
                |product| product.release_type == ReleaseType::Sts,
            )),
            UpdateChannel::Keyword(ChannelKeyword::Preview) => {
                let prerelease = published(&products, component, |_| true)
                    .filter(|version| version.is_prerelease())
                    .max()
                    .cloned();
                match prerelease {
                    Some(version) => Some(version),
                    None if no_fallback => {
                        debug!("No {component} prerelease published and fallback is disabled");
                        None
                    }
                    None => newest_release(published(&products, component, |_| true)),
                }
            }
        };

        match &resolved {
            Some(version) => debug!("Resolved {component} channel {channel} to {version}"),
            None => debug!("No {component} version matches channel {channel}"),
        }
        Ok(resolved)
    }

    /// Like [`Self::resolve`], but a missing match is an error.
    ///
    /// # Errors
    /// Returns [`InstallError::VersionNotFound`] when nothing matches.
    pub fn resolve_required(
        &self,
        channel: &UpdateChannel,
        component: InstallComponent,
        no_fallback: bool,
    ) -> Result<ReleaseVersion, InstallError> {
        self.resolve(channel, component, no_fallback)?
            .ok_or_else(|| InstallError::VersionNotFound {
                channel: channel.to_string(),
                component,
            })
    }

    /// Channel names a user can ask for: the keywords, then each supported
    /// product line newest first, each followed by its SDK feature bands.
    ///
    /// # Errors
    /// Returns an error when the release index cannot be read.
    pub fn supported_channels(&self) -> Result<Vec<String>, InstallError> {
        let mut products: Vec<(u64, u64, ProductInfo)> = self
            .index
            .products()?
            .into_iter()
            .filter(|product| product.support_phase.is_supported())
            .filter_map(|product| {
                let (major, minor) = product.major_minor()?;
                Some((major, minor, product))
            })
            .collect();
        products.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

        let mut channels: Vec<String> = ChannelKeyword::ALL
            .iter()
            .map(|keyword| keyword.as_str().to_string())
            .collect();

        for (major, minor, product) in &products {
            channels.push(format!("{major}.{minor}"));
            let bands: BTreeSet<u64> = product
                .versions_for(InstallComponent::Sdk)
                .filter(|sdk| sdk.major == *major && sdk.minor == *minor)
                .map(ReleaseVersion::feature_band)
                .collect();
            channels.extend(
                bands
                    .into_iter()
                    .rev()
                    .map(|band| format!("{major}.{minor}.{band}xx")),
            );
        }

        Ok(channels)
    }
}

fn published<'p>(
    products: &'p [ProductInfo],
    component: InstallComponent,
    include: impl Fn(&ProductInfo) -> bool + 'p,
) -> impl Iterator<Item = &'p ReleaseVersion> + 'p {
    products
        .iter()
        .filter(move |product| include(product))
        .flat_map(move |product| product.versions_for(component))
}

fn newest_release<'p>(
    versions: impl Iterator<Item = &'p ReleaseVersion>,
) -> Option<ReleaseVersion> {
    versions.filter(|version| !version.is_prerelease()).max().cloned()
}

fn release_or_prerelease<'p>(
    candidates: impl Iterator<Item = &'p ReleaseVersion>,
    channel: &UpdateChannel,
) -> Option<ReleaseVersion> {
    let candidates: Vec<&ReleaseVersion> = candidates.collect();
    if let Some(release) = newest_release(candidates.iter().copied()) {
        return Some(release);
    }
    let prerelease = candidates.into_iter().max().cloned();
    if let Some(version) = &prerelease {
        info!("Channel {channel} has no release yet, using prerelease {version}");
    }
    prerelease
}
