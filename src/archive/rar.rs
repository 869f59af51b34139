use super::{ArchiveEntry, decoder_error, extraction_cancelled, member_path, normalize_member_name};
use crate::error::{ArchiveError, Error, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Convert an unrar error to our error type, checking for password errors
fn convert_unrar_error(e: unrar::error::UnrarError, archive_path: &Path) -> Error {
    decoder_error(archive_path, e)
}

fn entry_name(header: &unrar::FileHeader) -> String {
    header.filename.to_string_lossy().replace('\\', "/")
}

/// List entries from the volume headers
///
/// unrar follows `.rNN`/`.partNN.rar` continuations on its own; split
/// members are reported once.
pub(super) fn list(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    if !archive_path.exists() {
        return Err(Error::NotFound(archive_path.display().to_string()));
    }

    let listing = unrar::Archive::new(archive_path)
        .open_for_listing()
        .map_err(|e| convert_unrar_error(e, archive_path))?;

    let mut entries = Vec::new();
    for header in listing {
        let header = header.map_err(|e| convert_unrar_error(e, archive_path))?;
        entries.push(ArchiveEntry {
            name: entry_name(&header),
            size: header.unpacked_size,
            is_dir: header.is_directory(),
        });
    }

    Ok(entries)
}

/// Decompress a single named entry into memory
pub(super) fn read_member(archive_path: &Path, member: &str) -> Result<Vec<u8>> {
    if !archive_path.exists() {
        return Err(Error::NotFound(archive_path.display().to_string()));
    }

    let wanted = normalize_member_name(member);

    let processor = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| convert_unrar_error(e, archive_path))?;

    // Walk the headers using the state machine interface
    let mut at_header = processor;
    loop {
        let at_file = match at_header.read_header() {
            Ok(Some(entry_processor)) => entry_processor,
            Ok(None) => break,
            Err(e) => return Err(convert_unrar_error(e, archive_path)),
        };

        let header = at_file.entry();
        if normalize_member_name(&entry_name(header)) != wanted {
            at_header = at_file
                .skip()
                .map_err(|e| convert_unrar_error(e, archive_path))?;
            continue;
        }

        if header.is_directory() {
            return Err(ArchiveError::MemberIsDirectory {
                archive: archive_path.to_path_buf(),
                member: member.to_string(),
            }
            .into());
        }
        if header.is_encrypted() {
            return Err(ArchiveError::Encrypted {
                archive: archive_path.to_path_buf(),
            }
            .into());
        }

        debug!(?archive_path, member, "decoding RAR member");
        let (data, _rest) = at_file
            .read()
            .map_err(|e| convert_unrar_error(e, archive_path))?;
        return Ok(data);
    }

    Err(ArchiveError::MemberNotFound {
        archive: archive_path.to_path_buf(),
        member: member.to_string(),
    }
    .into())
}

/// Extract every file entry of the volume set under `dest`
///
/// unrar writes a member in one call, so `cancel` is honoured between members.
pub(super) fn extract(
    archive_path: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<usize> {
    if !archive_path.exists() {
        return Err(Error::NotFound(archive_path.display().to_string()));
    }

    let mut at_header = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| convert_unrar_error(e, archive_path))?;
    let mut written = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(extraction_cancelled(archive_path));
        }
        let at_file = match at_header.read_header() {
            Ok(Some(entry_processor)) => entry_processor,
            Ok(None) => break,
            Err(e) => return Err(convert_unrar_error(e, archive_path)),
        };

        let header = at_file.entry();
        let relative = member_path(&entry_name(header));
        if relative.as_os_str().is_empty() || header.is_directory() {
            at_header = at_file
                .skip()
                .map_err(|e| convert_unrar_error(e, archive_path))?;
            continue;
        }

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        at_header = at_file
            .extract_to(&target)
            .map_err(|e| convert_unrar_error(e, archive_path))?;
        written += 1;
    }

    Ok(written)
}
