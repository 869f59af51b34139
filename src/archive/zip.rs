use super::{
    ArchiveEntry, CancellableWriter, decoder_error, extraction_cancelled, normalize_member_name,
};
use crate::error::{ArchiveError, Error, Result};
use std::io::Read;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::warn;

fn open(archive_path: &Path) -> Result<zip::ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(archive_path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;

    zip::ZipArchive::new(file).map_err(|e| decoder_error(archive_path, e))
}

/// List entries from the central directory without decrypting anything
pub(super) fn list(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open(archive_path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|e| decoder_error(archive_path, e))?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            size: file.size(),
            is_dir: file.is_dir(),
        });
    }

    Ok(entries)
}

/// Decompress a single named entry
pub(super) fn read_member(archive_path: &Path, member: &str) -> Result<Vec<u8>> {
    let mut archive = open(archive_path)?;
    let wanted = normalize_member_name(member);

    let mut found = None;
    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| decoder_error(archive_path, e))?;
        if normalize_member_name(file.name()) == wanted {
            found = Some(i);
            break;
        }
    }

    let index = found.ok_or_else(|| ArchiveError::MemberNotFound {
        archive: archive_path.to_path_buf(),
        member: member.to_string(),
    })?;

    let mut file = archive
        .by_index(index)
        .map_err(|e| decoder_error(archive_path, e))?;

    if file.is_dir() {
        return Err(ArchiveError::MemberIsDirectory {
            archive: archive_path.to_path_buf(),
            member: member.to_string(),
        }
        .into());
    }

    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data)
        .map_err(|e| decoder_error(archive_path, e))?;

    Ok(data)
}

/// Write every entry under `dest`, returning the number of files written
///
/// Entries whose names would escape `dest` are skipped.
pub(super) fn extract(
    archive_path: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut archive = open(archive_path)?;
    let mut written = 0;

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(extraction_cancelled(archive_path));
        }
        let mut file = archive
            .by_index(index)
            .map_err(|e| decoder_error(archive_path, e))?;

        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            warn!(?archive_path, name = file.name(), "skipping entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let out = std::fs::File::create(&target)?;
        let copied = std::io::copy(&mut file, &mut CancellableWriter::new(out, cancel));
        if cancel.is_cancelled() {
            let _ = std::fs::remove_file(&target);
            return Err(extraction_cancelled(archive_path));
        }
        copied.map_err(|e| decoder_error(archive_path, e))?;
        written += 1;
    }

    Ok(written)
}
