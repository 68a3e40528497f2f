use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::{InstallComponent, ReleaseVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKeyword {
    Latest,
    Lts,
    Sts,
    Preview,
}

impl ChannelKeyword {
    pub const ALL: [Self; 4] = [Self::Latest, Self::Preview, Self::Lts, Self::Sts];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Lts => "lts",
            Self::Sts => "sts",
            Self::Preview => "preview",
        }
    }
}

/// A parsed version-selection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateChannel {
    ExactVersion(ReleaseVersion),
    Major(u64),
    MajorMinor(u64, u64),
    /// `9.0.1xx` is `FeatureBand(9, 0, 1)`.
    FeatureBand(u64, u64, u8),
    Keyword(ChannelKeyword),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid channel '{input}': {reason}")]
pub struct ChannelParseError {
    pub input: String,
    pub reason: &'static str,
}

impl ChannelParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl UpdateChannel {
    #[must_use]
    pub fn is_fully_specified(&self) -> bool {
        matches!(self, Self::ExactVersion(_))
    }
}

fn parse_number(input: &str, part: &str) -> Result<u64, ChannelParseError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChannelParseError::new(input, "expected a numeric version part"));
    }
    part.parse()
        .map_err(|_| ChannelParseError::new(input, "version part is out of range"))
}

fn parse_band(input: &str, part: &str) -> Result<u8, ChannelParseError> {
    let lower = part.to_ascii_lowercase();
    let digits = lower
        .strip_suffix("xx")
        .ok_or_else(|| ChannelParseError::new(input, "feature bands end in 'xx'"))?;
    match digits.as_bytes() {
        [digit] if digit.is_ascii_digit() => Ok(digit - b'0'),
        _ => Err(ChannelParseError::new(
            input,
            "a feature band is a single digit followed by 'xx'",
        )),
    }
}

impl FromStr for UpdateChannel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(ChannelParseError::new(s, "channel is empty"));
        }

        if let Some(keyword) = ChannelKeyword::ALL
            .into_iter()
            .find(|keyword| keyword.as_str().eq_ignore_ascii_case(input))
        {
            return Ok(Self::Keyword(keyword));
        }

        let parts: Vec<&str> = input.split('.').collect();
        match parts.as_slice() {
            [major] => Ok(Self::Major(parse_number(input, major)?)),
            [major, minor] => Ok(Self::MajorMinor(
                parse_number(input, major)?,
                parse_number(input, minor)?,
            )),
            [major, minor, third]
                if !third.contains(['-', '+']) && third.to_ascii_lowercase().ends_with("xx") =>
            {
                Ok(Self::FeatureBand(
                    parse_number(input, major)?,
                    parse_number(input, minor)?,
                    parse_band(input, third)?,
                ))
            }
            _ => input
                .parse::<ReleaseVersion>()
                .map(Self::ExactVersion)
                .map_err(|_| ChannelParseError::new(input, "not a version or channel name")),
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactVersion(version) => write!(f, "{version}"),
            Self::Major(major) => write!(f, "{major}"),
            Self::MajorMinor(major, minor) => write!(f, "{major}.{minor}"),
            Self::FeatureBand(major, minor, band) => write!(f, "{major}.{minor}.{band}xx"),
            Self::Keyword(keyword) => f.write_str(keyword.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentSpecError {
    #[error("Unknown component '{0}'")]
    UnknownComponent(String),
    #[error(transparent)]
    Channel(#[from] ChannelParseError),
}

/// `component@channel`, or a bare channel for the caller's default component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub component: InstallComponent,
    pub channel: UpdateChannel,
}

impl ComponentSpec {
    /// Parse `aspnetcore@9.0`, `runtime@lts` or plain `9.0`.
    ///
    /// # Errors
    /// Returns an error for an unknown component prefix or an invalid channel.
    pub fn parse(spec: &str, default_component: InstallComponent) -> Result<Self, ComponentSpecError> {
        let (component, channel) = match spec.split_once('@') {
            Some((name, channel)) => (
                InstallComponent::from_name(name)
                    .ok_or_else(|| ComponentSpecError::UnknownComponent(name.trim().to_string()))?,
                channel,
            ),
            None => (default_component, spec),
        };
        Ok(Self {
            component,
            channel: channel.parse()?,
        })
    }
}
