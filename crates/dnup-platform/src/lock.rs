//! Named cross-process mutual exclusion.
//!
//! A [`ScopedMutex`] is an exclusive advisory lock on `<lock_dir>/<name>.lock`.
//! The lock belongs to the open file description, so it excludes other
//! processes as well as other handles opened by the same process, and the
//! operating system drops it when the owning process exits for any reason.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use log::debug;
use thiserror::Error;

/// Lock guarding the shared manifest and every install root's muxer.
pub const MODIFY_INSTALLATION_STATES: &str = "ModifyInstallationStates";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid lock name: {0:?}")]
    InvalidName(String),
    #[error("timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },
    #[error("{context} ({path}): {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Holds a named lock until dropped.
#[derive(Debug)]
pub struct ScopedMutex {
    name: String,
    path: PathBuf,
    file: File,
}

impl ScopedMutex {
    /// Block until the named lock is held.
    ///
    /// There is no timeout; see [`ScopedMutex::acquire_timeout`] for a
    /// bounded wait.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the lock file cannot be
    /// opened or locked.
    pub fn acquire(lock_dir: &Path, name: &str) -> Result<Self, LockError> {
        let (path, file) = open_lock_file(lock_dir, name)?;
        debug!("Waiting for lock {name}");
        file.lock_exclusive()
            .map_err(|error| LockError::io("failed to acquire lock", &path, error))?;
        Self::held(name, path, file)
    }

    /// Take the named lock only if nobody else holds it.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the lock file cannot be
    /// opened, or locking fails for a reason other than contention.
    pub fn try_acquire(lock_dir: &Path, name: &str) -> Result<Option<Self>, LockError> {
        let (path, file) = open_lock_file(lock_dir, name)?;
        match file.try_lock_exclusive() {
            Ok(()) => Self::held(name, path, file).map(Some),
            Err(error) if is_contended(&error) => Ok(None),
            Err(error) => Err(LockError::io("failed to acquire lock", &path, error)),
        }
    }

    /// Wait at most `timeout` for the named lock.
    ///
    /// # Errors
    /// Returns [`LockError::Timeout`] when the lock is still held elsewhere
    /// after `timeout`, or any error [`ScopedMutex::try_acquire`] returns.
    pub fn acquire_timeout(
        lock_dir: &Path,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let started = Instant::now();
        loop {
            if let Some(guard) = Self::try_acquire(lock_dir, name)? {
                return Ok(guard);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited,
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn held(name: &str, path: PathBuf, mut file: File) -> Result<Self, LockError> {
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|error| LockError::io("failed to write lock owner", &path, error))?;
        debug!("Acquired lock {name}");
        Ok(Self {
            name: name.to_string(),
            path,
            file,
        })
    }
}

impl Drop for ScopedMutex {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {error}", self.path.display());
        } else {
            debug!("Released lock {}", self.name);
        }
    }
}

fn open_lock_file(lock_dir: &Path, name: &str) -> Result<(PathBuf, File), LockError> {
    validate_name(name)?;
    std::fs::create_dir_all(lock_dir)
        .map_err(|error| LockError::io("failed to create lock directory", lock_dir, error))?;
    let path = lock_dir.join(format!("{name}.lock"));
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|error| LockError::io("failed to open lock file", &path, error))?;
    Ok((path, file))
}

fn validate_name(name: &str) -> Result<(), LockError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(LockError::InvalidName(name.to_string()))
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
