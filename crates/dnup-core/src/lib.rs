//! Install engine for dnup.
//!
//! This crate turns a channel request into files on disk:
//! - Channel resolution against a release index.
//! - Archive download, verification and extraction into an install root.
//! - Reconciliation of the shared `dotnet` muxer.
//! - The install manifest shared by every dnup process.

mod archive;
mod extract;
mod installer;
mod layout;
mod local_archive;
mod manifest;
mod muxer;
mod release_index;
mod resolver;

/// Archive lifecycle state machine driving a single install.
pub use extract::{ArchiveExtractor, ExtractorState};
/// Lock-holding orchestrator and its request/outcome types.
pub use installer::{InstallOptions, InstallOutcome, InstallRequest, InstallStatus, Installer};
/// Directory structure of an install root.
pub use layout::InstallLayout;
/// Archive source backed by a local directory.
pub use local_archive::LocalArchiveDirectory;
/// Persistent record of installed components.
pub use manifest::InstallManifest;
/// Muxer replacement policy, outcome and version probing.
pub use muxer::{
    MuxerAction, MuxerPolicy, MuxerReconciler, embedded_product_version, should_update_muxer,
};
/// JSON-backed release index.
pub use release_index::FileReleaseIndex;
/// Channel to version resolution.
pub use resolver::ChannelResolver;
