//! Archive unpacking and checksum verification.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use dnup_backend::{ArchiveDigest, ArchiveFormat, DownloadStage, InstallError};
use flate2::read::GzDecoder;
use log::{debug, warn};
use sha2::{Digest, Sha256, Sha512};

/// Where the root-level muxer entry is written instead of its real path.
pub(crate) type MuxerTarget<'a> = &'a mut dyn FnMut() -> Result<PathBuf, InstallError>;

/// Unpack `archive_path` into `dest`, sending the root muxer entry to the
/// path `muxer_target` hands out. Returns the number of files written.
///
/// Entries whose paths would leave `dest` are skipped.
pub(crate) fn unpack(
    archive_path: &Path,
    format: ArchiveFormat,
    dest: &Path,
    muxer_target: MuxerTarget<'_>,
) -> Result<usize, InstallError> {
    let file = File::open(archive_path).map_err(|error| {
        InstallError::io_with_path("failed to open archive", archive_path, &error)
    })?;
    let written = match format {
        ArchiveFormat::Zip => unpack_zip(file, dest, muxer_target)?,
        ArchiveFormat::TarGz => unpack_tar_gz(file, dest, muxer_target)?,
    };
    debug!("Extracted {written} files to {}", dest.display());
    Ok(written)
}

fn unpack_zip(file: File, dest: &Path, muxer_target: MuxerTarget<'_>) -> Result<usize, InstallError> {
    let mut archive = zip::ZipArchive::new(file).map_err(corrupted)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(corrupted)?;
        let Some(relative) = entry.enclosed_name().and_then(|name| sanitize(&name)) else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };

        if entry.is_dir() {
            create_dir(&dest.join(&relative))?;
            continue;
        }

        let out_path = output_path(dest, &relative, muxer_target)?;
        write_entry(&mut entry, &out_path)?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            set_mode(&out_path, mode);
        }
        written += 1;
    }

    Ok(written)
}

fn unpack_tar_gz(
    file: File,
    dest: &Path,
    muxer_target: MuxerTarget<'_>,
) -> Result<usize, InstallError> {
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut written = 0;

    for entry in archive.entries().map_err(corrupted)? {
        let mut entry = entry.map_err(corrupted)?;
        let path = entry.path().map_err(corrupted)?.into_owned();
        let Some(relative) = sanitize(&path) else {
            warn!("Skipping tar entry with unsafe path: {}", path.display());
            continue;
        };

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            create_dir(&dest.join(&relative))?;
            continue;
        }
        if !kind.is_file() {
            warn!("Skipping unsupported tar entry {}: {kind:?}", path.display());
            continue;
        }

        let out_path = output_path(dest, &relative, muxer_target)?;
        write_entry(&mut entry, &out_path)?;
        #[cfg(unix)]
        if let Ok(mode) = entry.header().mode() {
            set_mode(&out_path, mode);
        }
        written += 1;
    }

    Ok(written)
}

/// Drop `.` components and reject anything that could escape the
/// destination. An entry naming only the root yields `None`.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn output_path(
    dest: &Path,
    relative: &Path,
    muxer_target: MuxerTarget<'_>,
) -> Result<PathBuf, InstallError> {
    if relative == Path::new(dnup_platform::muxer_file_name()) {
        let staged = muxer_target()?;
        debug!("Staging muxer entry at {}", staged.display());
        return Ok(staged);
    }
    Ok(dest.join(relative))
}

fn create_dir(path: &Path) -> Result<(), InstallError> {
    std::fs::create_dir_all(path).map_err(|error| {
        InstallError::io_with_path("failed to create extraction directory", path, &error)
    })
}

fn write_entry(entry: &mut impl Read, out_path: &Path) -> Result<(), InstallError> {
    if let Some(parent) = out_path.parent() {
        create_dir(parent)?;
    }
    let mut outfile = File::create(out_path).map_err(|error| {
        InstallError::io_with_path("failed to create extracted file", out_path, &error)
    })?;
    std::io::copy(entry, &mut outfile).map_err(|error| match error.kind() {
        std::io::ErrorKind::InvalidData
        | std::io::ErrorKind::InvalidInput
        | std::io::ErrorKind::UnexpectedEof => InstallError::ArchiveCorrupted {
            details: format!("{}: {error}", out_path.display()),
        },
        _ => InstallError::io_with_path("failed to extract archive entry", out_path, &error),
    })?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(error) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777)) {
        debug!("Failed to set mode on {}: {error}", path.display());
    }
}

fn corrupted(error: impl std::fmt::Display) -> InstallError {
    InstallError::ArchiveCorrupted {
        details: error.to_string(),
    }
}

fn feed_file(path: &Path, mut update: impl FnMut(&[u8])) -> Result<(), InstallError> {
    let mut file = File::open(path).map_err(|error| {
        InstallError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            InstallError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            return Ok(());
        }
        update(&buffer[..read]);
    }
}

fn sha256_file(path: &Path) -> Result<String, InstallError> {
    let mut hasher = Sha256::new();
    feed_file(path, |chunk| hasher.update(chunk))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn sha512_file(path: &Path) -> Result<String, InstallError> {
    let mut hasher = Sha512::new();
    feed_file(path, |chunk| hasher.update(chunk))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check `path` against `expected`.
///
/// # Errors
/// Returns a verification-stage [`InstallError::DownloadFailed`] on mismatch.
pub(crate) fn verify_digest(path: &Path, expected: &ArchiveDigest) -> Result<(), InstallError> {
    let (algorithm, actual, expected) = match expected {
        ArchiveDigest::Sha256(digest) => ("sha256", sha256_file(path)?, digest),
        ArchiveDigest::Sha512(digest) => ("sha512", sha512_file(path)?, digest),
    };
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(InstallError::download(
            DownloadStage::Verification,
            format!("{algorithm} mismatch for {}: expected {expected}, got {actual}", path.display()),
        ));
    }
    debug!("Verified {algorithm} of {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write as _;
    use std::path::{Path, PathBuf};

    use dnup_backend::{ArchiveDigest, ArchiveFormat, DownloadStage, InstallError};

    use super::{sha256_file, sha512_file, unpack, verify_digest};

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, options)
                    .expect("directory entry should be written");
            } else {
                writer
                    .start_file(*name, options)
                    .expect("file entry should be started");
                writer
                    .write_all(contents)
                    .expect("file entry should be written");
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    pub(crate) fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).expect("tar file should be created");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Regular);
            // `append_data` refuses `..`, so write the raw name for hostile entries.
            let bytes = name.as_bytes();
            header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
            header.set_cksum();
            builder
                .append(&header, *contents)
                .expect("tar entry should be written");
        }
        builder
            .into_inner()
            .expect("tar archive should be finalized")
            .finish()
            .expect("gzip stream should be finalized");
    }

    fn no_muxer() -> impl FnMut() -> Result<PathBuf, InstallError> {
        || panic!("no muxer entry expected")
    }

    #[test]
    fn zip_entries_land_under_destination() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("runtime.zip");
        write_zip(
            &archive,
            &[
                ("shared/", b""),
                ("shared/Microsoft.NETCore.App/9.0.7/System.dll", b"dll"),
                ("../escape.txt", b"nope"),
            ],
        );

        let dest = temp.path().join("root");
        let written = unpack(&archive, ArchiveFormat::Zip, &dest, &mut no_muxer())
            .expect("zip should extract");

        assert_eq!(written, 1);
        assert_eq!(
            std::fs::read(dest.join("shared/Microsoft.NETCore.App/9.0.7/System.dll"))
                .expect("extracted file"),
            b"dll"
        );
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn tar_gz_routes_muxer_and_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("runtime.tar.gz");
        let muxer = dnup_platform::muxer_file_name();
        let muxer_entry = format!("./{muxer}");
        write_tar_gz(
            &archive,
            &[
                (muxer_entry.as_str(), b"muxer"),
                ("./shared/Microsoft.NETCore.App/9.0.7/libcoreclr.so", b"so"),
                ("../escape.txt", b"nope"),
            ],
        );

        let dest = temp.path().join("root");
        let staged = temp.path().join("staged-muxer");
        let mut calls = 0;
        let mut target = || {
            calls += 1;
            Ok::<_, InstallError>(staged.clone())
        };
        let written =
            unpack(&archive, ArchiveFormat::TarGz, &dest, &mut target).expect("tar should extract");

        assert_eq!(written, 2);
        assert_eq!(calls, 1);
        assert_eq!(std::fs::read(&staged).expect("staged muxer"), b"muxer");
        assert!(!dest.join(muxer).exists());
        assert!(dest.join("shared/Microsoft.NETCore.App/9.0.7/libcoreclr.so").is_file());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn truncated_archive_is_corrupted() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("runtime.tar.gz");
        let mut state: u32 = 0x1234_5678;
        let noise: Vec<u8> = (0..65_536)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect();
        write_tar_gz(&archive, &[("./sdk/9.0.302/dotnet.dll", &noise)]);
        let bytes = std::fs::read(&archive).expect("archive readable");
        std::fs::write(&archive, &bytes[..bytes.len() / 2]).expect("archive truncated");

        let error = unpack(
            &archive,
            ArchiveFormat::TarGz,
            &temp.path().join("root"),
            &mut no_muxer(),
        )
        .expect_err("truncated archive fails");
        assert!(matches!(error, InstallError::ArchiveCorrupted { .. }), "{error:?}");

        let zip = temp.path().join("broken.zip");
        std::fs::write(&zip, b"PK\x03\x04 not really").expect("zip written");
        let error = unpack(&zip, ArchiveFormat::Zip, &temp.path().join("root"), &mut no_muxer())
            .expect_err("broken zip fails");
        assert!(matches!(error, InstallError::ArchiveCorrupted { .. }));
    }

    #[test]
    fn digest_verification() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("payload.bin");
        std::fs::write(&path, b"dotnet payload").expect("payload file should be written");

        let sha256 = "37c0b10e2796768c9ac1cf0bbd4f9aa3042f8b4aad99a6bc06fc46c71d163e7a";
        assert_eq!(sha256_file(&path).expect("hash"), sha256);
        verify_digest(&path, &ArchiveDigest::Sha256(sha256.to_string())).expect("digest matches");

        let sha512 = sha512_file(&path).expect("hash");
        assert_eq!(sha512.len(), 128);
        verify_digest(&path, &ArchiveDigest::Sha512(sha512.to_ascii_uppercase()))
            .expect("uppercase digest matches");

        let error = verify_digest(&path, &ArchiveDigest::Sha256("0".repeat(64)))
            .expect_err("mismatch detected");
        assert!(matches!(
            error,
            InstallError::DownloadFailed {
                stage: DownloadStage::Verification,
                ..
            }
        ));
    }
}
