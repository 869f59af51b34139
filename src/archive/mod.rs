//! Archive listing and member access
//!
//! Reads ZIP, RAR (including `.rNN`/`.partNN.rar` sets) and 7z (including
//! `.7z.NNN` splits) without writing anything to disk. Each format has its own
//! backend; [`classify`] picks one from the file name, falling back to the
//! file's magic bytes.
//!
//! All functions here block. Async callers use [`list_archive_async`] and
//! [`read_member_async`], which move the work onto the blocking pool.

pub mod naming;
mod rar;
mod sevenz;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use naming::{SplitScheme, discover_parts, is_first_rar_volume, is_first_split_part};

use crate::error::{ArchiveError, Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// ZIP archive
    Zip,
    /// RAR archive, single or multi-volume
    Rar,
    /// 7z archive, single or split
    #[serde(rename = "7z")]
    SevenZip,
}

impl ArchiveKind {
    /// Short lowercase name used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Rar => "rar",
            ArchiveKind::SevenZip => "7z",
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member of an archive, as listed from its headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArchiveEntry {
    /// Member name inside the archive, `/`-separated
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Whether the member is a directory
    pub is_dir: bool,
}

/// Detect archive kind by file name
///
/// Recognizes `.zip`, `.rar`, `.rNN`, `.partNN.rar`, `.7z` and `.7z.NNN`.
pub fn detect_archive_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_str()?;
    let lower = name.to_ascii_lowercase();

    if naming::split_7z_part_number(&lower).is_some() {
        return Some(ArchiveKind::SevenZip);
    }
    if naming::is_rar_volume(&lower) {
        return Some(ArchiveKind::Rar);
    }

    match lower.rsplit_once('.')?.1 {
        "7z" => Some(ArchiveKind::SevenZip),
        "zip" => Some(ArchiveKind::Zip),
        _ => None,
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const SEVENZ_MAGIC: &[u8] = b"7z\xbc\xaf\x27\x1c";

/// Detect archive kind from the file's leading signature bytes
pub fn sniff_archive_kind(path: &Path) -> std::io::Result<Option<ArchiveKind>> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let header = &header[..filled];

    let kind = if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if header.starts_with(RAR_MAGIC) {
        Some(ArchiveKind::Rar)
    } else if header.starts_with(SEVENZ_MAGIC) {
        Some(ArchiveKind::SevenZip)
    } else {
        None
    };
    Ok(kind)
}

/// Determine the archive kind by name, then by signature
pub fn classify(path: &Path) -> Result<ArchiveKind> {
    if let Some(kind) = detect_archive_kind(path) {
        return Ok(kind);
    }

    match sniff_archive_kind(path) {
        Ok(Some(kind)) => {
            debug!(?path, %kind, "archive kind detected from signature");
            Ok(kind)
        }
        Ok(None) => Err(ArchiveError::UnsupportedFormat {
            path: path.to_path_buf(),
        }
        .into()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(path.display().to_string()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// List the volumes of the archive whose first volume is `path`
pub fn volumes(path: &Path) -> Vec<PathBuf> {
    discover_parts(path, |p| p.is_file())
}

/// List the members of an archive in the archive's own order
pub fn list_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let entries = match classify(path)? {
        ArchiveKind::Zip => zip::list(path)?,
        ArchiveKind::Rar => rar::list(path)?,
        ArchiveKind::SevenZip => sevenz::list(&volumes(path))?,
    };

    debug!(?path, count = entries.len(), "listed archive");
    Ok(entries)
}

/// Decompress one member fully into memory
pub fn read_member(path: &Path, member: &str) -> Result<Vec<u8>> {
    let data = match classify(path)? {
        ArchiveKind::Zip => zip::read_member(path, member)?,
        ArchiveKind::Rar => rar::read_member(path, member)?,
        ArchiveKind::SevenZip => sevenz::read_member(&volumes(path), member)?,
    };

    debug!(?path, member, bytes = data.len(), "decoded archive member");
    Ok(data)
}

/// Extract the whole archive into `dest`, returning the number of files written
///
/// Member names that would land outside `dest` are skipped. Once `cancel`
/// fires, ZIP and 7z stop mid-member and remove the file being written; RAR
/// stops before its next member. A cancelled extraction returns an error.
pub fn extract_archive(path: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize> {
    std::fs::create_dir_all(dest)?;
    let written = match classify(path)? {
        ArchiveKind::Zip => zip::extract(path, dest, cancel)?,
        ArchiveKind::Rar => rar::extract(path, dest, cancel)?,
        ArchiveKind::SevenZip => sevenz::extract(&volumes(path), dest, cancel)?,
    };

    info!(?path, ?dest, written, "extracted archive");
    Ok(written)
}

/// [`list_archive`] on the blocking thread pool
pub async fn list_archive_async(path: PathBuf) -> Result<Vec<ArchiveEntry>> {
    spawn_blocking(move || list_archive(&path))
        .await
        .map_err(|e| Error::Other(format!("archive listing task panicked: {}", e)))?
}

/// [`read_member`] on the blocking thread pool
pub async fn read_member_async(path: PathBuf, member: String) -> Result<Vec<u8>> {
    spawn_blocking(move || read_member(&path, &member))
        .await
        .map_err(|e| Error::Other(format!("archive read task panicked: {}", e)))?
}

/// Find `member` among listed entries, reporting directories and missing names
pub(crate) fn find_member<'a>(
    entries: &'a [ArchiveEntry],
    archive: &Path,
    member: &str,
) -> Result<&'a ArchiveEntry> {
    let wanted = normalize_member_name(member);
    let entry = entries
        .iter()
        .find(|e| normalize_member_name(&e.name) == wanted)
        .ok_or_else(|| ArchiveError::MemberNotFound {
            archive: archive.to_path_buf(),
            member: member.to_string(),
        })?;

    if entry.is_dir {
        return Err(ArchiveError::MemberIsDirectory {
            archive: archive.to_path_buf(),
            member: member.to_string(),
        }
        .into());
    }
    Ok(entry)
}

/// Relative path a member extracts to, keeping only normal components
///
/// Empty when nothing of the name survives.
pub fn member_path(name: &str) -> PathBuf {
    Path::new(&normalize_member_name(name))
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Error returned by an extraction stopped through its token
pub(crate) fn extraction_cancelled(archive: &Path) -> Error {
    Error::Io(std::io::Error::other(format!(
        "extraction of {} cancelled",
        archive.display()
    )))
}

/// Writer that refuses further bytes once its token is cancelled
pub(crate) struct CancellableWriter<'a, W> {
    inner: W,
    cancel: &'a CancellationToken,
}

impl<'a, W: Write> CancellableWriter<'a, W> {
    pub(crate) fn new(inner: W, cancel: &'a CancellationToken) -> Self {
        Self { inner, cancel }
    }
}

impl<W: Write> Write for CancellableWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::other("extraction cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Compare member names independent of separator style and trailing slashes
pub(crate) fn normalize_member_name(name: &str) -> String {
    name.replace('\\', "/").trim_matches('/').to_string()
}

/// Map a decoder message to an archive error, recognizing password failures
pub(crate) fn decoder_error(archive: &Path, reason: impl std::fmt::Display) -> Error {
    let reason = reason.to_string();
    let lower = reason.to_lowercase();
    if lower.contains("password") || lower.contains("encrypted") {
        ArchiveError::Encrypted {
            archive: archive.to_path_buf(),
        }
        .into()
    } else {
        ArchiveError::Unreadable {
            archive: archive.to_path_buf(),
            reason,
        }
        .into()
    }
}
