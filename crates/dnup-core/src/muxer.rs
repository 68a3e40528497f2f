//! Keeps the shared `dotnet` executable at the newest version any install in
//! the root has delivered.
//!
//! Extraction never writes the muxer in place. The archive's copy goes to a
//! staged temp file next to it, and [`MuxerReconciler::finalize_after_extraction`]
//! decides whether to move it over the existing one.

use std::path::{Path, PathBuf};

use dnup_backend::{InstallError, ReleaseVersion};
use log::{debug, info, warn};
use tempfile::TempPath;

use crate::layout::InstallLayout;

/// How a failed muxer replacement is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MuxerPolicy {
    /// Warn and keep the existing muxer.
    #[default]
    Lenient,
    /// Fail the install with [`InstallError::MuxerInUse`].
    Strict,
}

/// What happened to the muxer at the end of an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerAction {
    /// The archive carried no muxer.
    NotStaged,
    /// There was no muxer before; the staged one was moved into place.
    Installed,
    /// The install raised the highest runtime version, so the muxer was
    /// replaced.
    Updated,
    /// The existing muxer is at least as new; the staged one was discarded.
    KeptExisting,
    /// Replacement was due but failed; the existing muxer is untouched.
    KeptExistingAfterFailure,
}

#[derive(Debug, Clone)]
struct PreExtractionState {
    had_muxer: bool,
    highest_runtime: Option<ReleaseVersion>,
}

pub struct MuxerReconciler {
    layout: InstallLayout,
    policy: MuxerPolicy,
    pre_state: Option<PreExtractionState>,
    staged: Option<TempPath>,
}

impl MuxerReconciler {
    #[must_use]
    pub fn new(layout: InstallLayout, policy: MuxerPolicy) -> Self {
        Self {
            layout,
            policy,
            pre_state: None,
            staged: None,
        }
    }

    /// Snapshot whether a muxer exists and the highest runtime version on
    /// disk. Must run before any archive entry is written, with the
    /// installation lock held.
    ///
    /// Staged muxers left behind by an interrupted install are removed here.
    pub fn record_pre_extraction_state(&mut self) {
        self.remove_abandoned_staged_muxers();
        let state = PreExtractionState {
            had_muxer: self.layout.muxer_path().is_file(),
            highest_runtime: self.layout.highest_runtime_version(),
        };
        debug!(
            "Muxer present before extraction: {}, highest runtime: {:?}",
            state.had_muxer, state.highest_runtime
        );
        self.pre_state = Some(state);
    }

    fn remove_abandoned_staged_muxers(&self) {
        let Ok(entries) = std::fs::read_dir(self.layout.root()) else {
            return;
        };
        let prefix = format!("{}.", dnup_platform::muxer_file_name());
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".tmp") {
                continue;
            }
            if self
                .staged
                .as_ref()
                .is_some_and(|staged| staged.as_os_str() == entry.path().as_os_str())
            {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => debug!("Removed abandoned staged muxer {}", entry.path().display()),
                Err(error) => warn!(
                    "Could not remove abandoned staged muxer {}: {error}",
                    entry.path().display()
                ),
            }
        }
    }

    /// Path the archive's muxer entry should be written to. The file is
    /// created on first call and removed when the reconciler is dropped
    /// unless it was moved into place.
    ///
    /// # Errors
    /// Returns an error if the staged file cannot be created in the root.
    pub fn muxer_extraction_path(&mut self) -> Result<PathBuf, InstallError> {
        if let Some(staged) = &self.staged {
            return Ok(staged.to_path_buf());
        }
        let root = self.layout.root();
        std::fs::create_dir_all(root)
            .map_err(|error| InstallError::io_with_path("failed to create install root", root, &error))?;
        let staged = tempfile::Builder::new()
            .prefix(&format!("{}.", dnup_platform::muxer_file_name()))
            .suffix(".tmp")
            .tempfile_in(root)
            .map_err(|error| InstallError::io_with_path("failed to stage muxer", root, &error))?
            .into_temp_path();
        let path = staged.to_path_buf();
        self.staged = Some(staged);
        Ok(path)
    }

    /// Decide the muxer's fate once every archive entry is on disk.
    ///
    /// # Errors
    /// Returns [`InstallError::MuxerInUse`] when a due replacement fails
    /// under [`MuxerPolicy::Strict`], and an error when a first-time muxer
    /// cannot be placed.
    pub fn finalize_after_extraction(&mut self) -> Result<MuxerAction, InstallError> {
        let Some(staged) = self.staged.take() else {
            return Ok(MuxerAction::NotStaged);
        };
        let Some(pre) = self.pre_state.clone() else {
            return Err(InstallError::InvalidState {
                operation: "finalize_after_extraction",
                state: "no pre-extraction snapshot",
            });
        };

        let target = self.layout.muxer_path();
        let post_highest = self.layout.highest_runtime_version();

        let action = if !pre.had_muxer {
            MuxerAction::Installed
        } else if is_newer(post_highest.as_ref(), pre.highest_runtime.as_ref()) {
            MuxerAction::Updated
        } else {
            debug!(
                "Keeping existing muxer; runtime {:?} does not exceed {:?}",
                post_highest, pre.highest_runtime
            );
            return Ok(MuxerAction::KeptExisting);
        };

        match dnup_platform::replace_file(&staged, &target) {
            Ok(()) => {
                // The staged path no longer exists; only disarm its cleanup.
                if let Err(error) = staged.keep() {
                    debug!("Staged muxer cleanup could not be disarmed: {}", error.error);
                }
                mark_executable(&target)?;
                info!("Muxer {} is now at runtime {:?}", target.display(), post_highest);
                Ok(action)
            }
            Err(error) if action == MuxerAction::Installed => Err(InstallError::io_with_path(
                "failed to place muxer",
                &target,
                &error,
            )),
            Err(error) => match self.policy {
                MuxerPolicy::Strict => Err(InstallError::MuxerInUse {
                    path: target,
                    details: error.to_string(),
                }),
                MuxerPolicy::Lenient => {
                    warn!(
                        "Could not update {} ({error}); keeping the existing muxer. \
                         Close running dotnet processes and install again to update it.",
                        target.display()
                    );
                    Ok(MuxerAction::KeptExistingAfterFailure)
                }
            },
        }
    }
}

/// `post` beats `pre` when it is strictly higher, or when there was no
/// runtime before and there is one now.
fn is_newer(post: Option<&ReleaseVersion>, pre: Option<&ReleaseVersion>) -> bool {
    match (post, pre) {
        (Some(post), Some(pre)) => post > pre,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|error| InstallError::io_with_path("failed to mark muxer executable", path, &error))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}

/// Whether the muxer at `new` should replace the one at `existing`, judged
/// by the product version embedded in each file.
///
/// A missing `existing` is always replaced and a missing `new` never is.
/// When `new` carries no readable version it is not installed; when only
/// `existing` is unreadable, `new` wins.
#[must_use]
pub fn should_update_muxer(new: &Path, existing: &Path) -> bool {
    if !existing.exists() {
        return true;
    }
    if !new.exists() {
        return false;
    }
    let new_version = embedded_product_version(new);
    let existing_version = embedded_product_version(existing);
    debug!("Muxer versions: new {new_version:?}, existing {existing_version:?}");
    is_newer(new_version.as_ref(), existing_version.as_ref())
}

const PRODUCT_VERSION_KEY: &str = "ProductVersion";

/// Read the `ProductVersion` string from a binary's version resource. Both
/// UTF-16LE (PE resources) and plain ASCII encodings are recognized.
#[must_use]
pub fn embedded_product_version(path: &Path) -> Option<ReleaseVersion> {
    let bytes = std::fs::read(path).ok()?;
    product_version_utf16(&bytes).or_else(|| product_version_ascii(&bytes))
}

fn product_version_utf16(bytes: &[u8]) -> Option<ReleaseVersion> {
    let key: Vec<u8> = PRODUCT_VERSION_KEY
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect();
    let start = find(bytes, &key)? + key.len();

    let units: Vec<u16> = bytes[start..]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .skip_while(|unit| *unit == 0)
        .take_while(|unit| *unit != 0)
        .collect();
    parse_product_version(&String::from_utf16(&units).ok()?)
}

fn product_version_ascii(bytes: &[u8]) -> Option<ReleaseVersion> {
    let mut key = PRODUCT_VERSION_KEY.as_bytes().to_vec();
    key.push(0);
    let start = find(bytes, &key)? + key.len();
    let value: Vec<u8> = bytes[start..]
        .iter()
        .copied()
        .skip_while(|byte| *byte == 0)
        .take_while(|byte| *byte != 0)
        .collect();
    parse_product_version(std::str::from_utf8(&value).ok()?)
}

fn parse_product_version(value: &str) -> Option<ReleaseVersion> {
    let value = value.split_whitespace().next()?;
    value.parse().ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
