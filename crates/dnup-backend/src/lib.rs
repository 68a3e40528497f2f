mod channel;
mod error;
mod release;
mod traits;
mod types;

pub use channel::{ChannelKeyword, ChannelParseError, ComponentSpec, ComponentSpecError, UpdateChannel};
pub use error::{DownloadStage, InstallError};
pub use release::{ProductInfo, ReleaseEntry, ReleaseType, SupportPhase};
pub use traits::{
    ArchiveDigest, ArchiveDownloader, ArchiveFormat, ArchiveRequest, DownloadedArchive,
    ReleaseIndex,
};
pub use types::{
    DotnetInstall, InstallComponent, InstallPhase, InstallProgress, InstallRoot, ReleaseVersion,
    VersionComponent, VersionParseError,
};
