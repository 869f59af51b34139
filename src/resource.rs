//! Resource references and their resolution under the served root
//!
//! A request names either a plain file (`Movies/film.mkv`) or a member inside
//! an archive (`Movies/film.rar|film.mkv`). References are always relative to
//! the configured root; anything that would escape it is rejected.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Separator between the archive path and the member name in a reference
pub const ARCHIVE_SEPARATOR: char = '|';

/// A parsed, not yet resolved, resource reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// A file under the root
    File(PathBuf),
    /// A member inside an archive under the root
    ArchiveMember {
        /// Archive path relative to the root
        archive: PathBuf,
        /// Member name inside the archive
        member: String,
    },
}

impl ResourceRef {
    /// Parse a request string into a reference
    ///
    /// Leading slashes are ignored. A reference containing
    /// [`ARCHIVE_SEPARATOR`] must split into exactly two non-empty parts.
    pub fn parse(reference: &str) -> Result<Self> {
        if !reference.contains(ARCHIVE_SEPARATOR) {
            return Ok(ResourceRef::File(relative_path(reference)?));
        }

        let mut parts = reference.split(ARCHIVE_SEPARATOR);
        let (Some(archive), Some(member), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidReference(format!(
                "expected exactly one '{ARCHIVE_SEPARATOR}' in {reference:?}"
            )));
        };

        let member = member.trim_start_matches('/');
        if archive.trim_matches('/').is_empty() || member.is_empty() {
            return Err(Error::InvalidReference(format!(
                "archive and member must both be non-empty in {reference:?}"
            )));
        }

        Ok(ResourceRef::ArchiveMember {
            archive: relative_path(archive)?,
            member: member.to_string(),
        })
    }

    /// Build the reference string for `member` inside the archive at `archive_rel`
    pub fn virtual_path(archive_rel: &Path, member: &str) -> String {
        format!(
            "{}{}{}",
            archive_rel.to_string_lossy().replace('\\', "/"),
            ARCHIVE_SEPARATOR,
            member
        )
    }
}

/// A reference resolved to absolute paths that exist on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResource {
    /// A regular file
    File(PathBuf),
    /// A member inside an archive file
    ArchiveMember {
        /// Absolute path of the archive (its first volume)
        archive: PathBuf,
        /// Member name inside the archive
        member: String,
    },
}

impl ResolvedResource {
    /// The on-disk file backing this resource
    pub fn path(&self) -> &Path {
        match self {
            ResolvedResource::File(path) => path,
            ResolvedResource::ArchiveMember { archive, .. } => archive,
        }
    }

    /// Name used to pick a content type (the member name for archive members)
    pub fn display_name(&self) -> String {
        match self {
            ResolvedResource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ResolvedResource::ArchiveMember { member, .. } => member.clone(),
        }
    }
}

/// Resolve `reference` against `root`
///
/// When the exact path does not exist and `search_by_name` is set, the tree
/// is searched for a file with the same name (first match in walk order).
/// This blocks; async callers run it on the blocking pool.
pub fn resolve(root: &Path, reference: &ResourceRef, search_by_name: bool) -> Result<ResolvedResource> {
    match reference {
        ResourceRef::File(rel) => {
            let path = locate(root, rel, search_by_name)?;
            Ok(ResolvedResource::File(path))
        }
        ResourceRef::ArchiveMember { archive, member } => {
            let archive = locate(root, archive, search_by_name)?;
            Ok(ResolvedResource::ArchiveMember {
                archive,
                member: member.clone(),
            })
        }
    }
}

/// Whether `path` lies inside a directory named `dir_name`
pub fn is_under_dir_named(path: &Path, dir_name: &str) -> bool {
    if dir_name.is_empty() {
        return false;
    }
    path.parent().is_some_and(|parent| {
        parent
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == dir_name))
    })
}

fn locate(root: &Path, rel: &Path, search_by_name: bool) -> Result<PathBuf> {
    let path = root.join(rel);

    if path.is_file() {
        return Ok(path);
    }
    if path.is_dir() {
        return Err(Error::InvalidReference(format!(
            "{} is a directory",
            rel.display()
        )));
    }

    if search_by_name
        && let Some(name) = rel.file_name()
        && let Some(found) = find_by_name(root, name)
    {
        debug!(requested = ?rel, found = ?found, "resolved by file name search");
        return Ok(found);
    }

    Err(Error::NotFound(rel.display().to_string()))
}

fn find_by_name(root: &Path, name: &std::ffi::OsStr) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

/// Normalize a request path into a relative path with only normal components
pub(crate) fn relative_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim_start_matches('/');
    let mut path = PathBuf::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidReference(format!(
                    "parent directory components are not allowed: {raw:?}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidReference(format!(
                    "absolute paths are not allowed: {raw:?}"
                )));
            }
        }
    }

    if path.as_os_str().is_empty() {
        return Err(Error::InvalidReference("empty path".to_string()));
    }
    Ok(path)
}
