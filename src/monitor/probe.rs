use crate::archive::{ArchiveKind, detect_archive_kind, naming};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// The filesystem questions the scheduler asks on each scan
///
/// Calls block; the scheduler runs them on the blocking pool.
pub trait FsProbe: Send + Sync + 'static {
    /// Archives under `root` of the given kinds, first volumes only, sorted
    fn find_archives(&self, root: &Path, kinds: &[ArchiveKind]) -> Vec<PathBuf>;

    /// Current size of `path`, or `None` if it is gone
    fn size(&self, path: &Path) -> Option<u64>;

    /// Whether `path` exists
    fn exists(&self, path: &Path) -> bool {
        self.size(path).is_some()
    }
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FsProbe for LocalFs {
    fn find_archives(&self, root: &Path, kinds: &[ArchiveKind]) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry during archive scan");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_primary_archive(entry.path(), kinds))
            .map(walkdir::DirEntry::into_path)
            .collect();

        found.sort();
        found
    }

    fn size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }
}

/// Whether `path` names the first volume of an archive of one of `kinds`
pub fn is_primary_archive(path: &Path, kinds: &[ArchiveKind]) -> bool {
    let Some(kind) = detect_archive_kind(path) else {
        return false;
    };
    if !kinds.contains(&kind) {
        return false;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| !naming::is_continuation_volume(name))
}
