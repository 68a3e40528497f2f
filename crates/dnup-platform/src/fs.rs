use std::io::Write;
use std::path::{MAIN_SEPARATOR, Path};

/// Name of the shared launcher executable at the top of every install root.
#[must_use]
pub const fn muxer_file_name() -> &'static str {
    if cfg!(windows) { "dotnet.exe" } else { "dotnet" }
}

/// Operating system label used in archive names (`linux`, `osx`, `win`).
#[must_use]
pub const fn archive_os_name() -> &'static str {
    if cfg!(windows) {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

/// Architecture of the running process, using the distribution's names.
#[must_use]
pub fn default_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "x86",
        "aarch64" => "arm64",
        "arm" => "arm",
        "s390x" => "s390x",
        "powerpc64" => "ppc64le",
        "riscv64" => "riscv64",
        other => other,
    }
}

/// Whether the platform's default file system compares names without
/// regard to case.
#[must_use]
pub const fn is_case_insensitive_fs() -> bool {
    cfg!(any(windows, target_os = "macos"))
}

/// Key under which two paths naming the same install root compare equal.
///
/// Trailing separators are dropped everywhere; case is folded only on
/// case-insensitive platforms.
#[must_use]
pub fn path_key(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut key = if cfg!(windows) {
        raw.replace('/', "\\")
    } else {
        raw.into_owned()
    };
    while key.len() > 1 && (key.ends_with(MAIN_SEPARATOR) || key.ends_with('/')) {
        if cfg!(windows) && key.len() == 3 && key.as_bytes()[1] == b':' {
            break;
        }
        key.pop();
    }
    if is_case_insensitive_fs() {
        key = key.to_lowercase();
    }
    key
}

/// Write `data` to `path` through a sibling temp file and an atomic rename.
///
/// # Errors
/// Returns an error if the temp file cannot be written or moved into place.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("state");
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let pid = std::process::id();

    let mut tmp_path = None;
    for attempt in 0..16_u8 {
        let candidate = parent.join(format!(".{file_name}.{pid}.{timestamp}.{attempt}.tmp"));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                let written = file.write_all(data).and_then(|()| file.sync_all());
                if let Err(error) = written {
                    drop(file);
                    let _ = std::fs::remove_file(&candidate);
                    return Err(error);
                }
                tmp_path = Some(candidate);
                break;
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(error),
        }
    }

    let Some(tmp_path) = tmp_path else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "failed to create unique temp file",
        ));
    };

    if let Err(error) = replace_file(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error);
    }

    Ok(())
}

/// Move `src` over `dst`, replacing `dst` if it exists.
///
/// # Errors
/// Returns the operating system error when the move fails, for example when
/// `dst` is in use by a running process on Windows.
pub fn replace_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
        };

        let src_utf16: Vec<u16> = src
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let dst_utf16: Vec<u16> = dst
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: both paths are NUL-terminated UTF-16 buffers that live for
        // the duration of the FFI call.
        let moved = unsafe {
            MoveFileExW(
                src_utf16.as_ptr(),
                dst_utf16.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };
        if moved != 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::fs::rename(src, dst)
    }
}
