//! Archive listing and extraction status handlers.

use super::{ArchiveListing, ArchiveMemberInfo, ArchiveQuery, FolderArchives, FolderQuery};
use crate::api::AppState;
use crate::archive::{ArchiveKind, classify, detect_archive_kind, list_archive_async};
use crate::error::{Error, Result};
use crate::resource::{ResolvedResource, ResourceRef, relative_path, resolve};
use axum::{
    Json,
    extract::{Query, State},
};
use std::path::Path;
use tracing::debug;

/// GET /api/archives - List the members of an archive
#[utoipa::path(
    get,
    path = "/api/archives",
    tag = "archives",
    params(ArchiveQuery),
    responses(
        (status = 200, description = "Archive members in archive order", body = ArchiveListing),
        (status = 400, description = "Invalid path", body = crate::error::ApiError),
        (status = 404, description = "Archive not found", body = crate::error::ApiError),
        (status = 422, description = "Archive cannot be read", body = crate::error::ApiError)
    )
)]
pub async fn list_archive_members(
    State(state): State<AppState>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<ArchiveListing>> {
    let ResourceRef::File(rel) = ResourceRef::parse(&query.path)? else {
        return Err(Error::InvalidReference(format!(
            "{:?} names an archive member, not an archive",
            query.path
        )));
    };

    let root = state.config.root_dir.clone();
    let reference = ResourceRef::File(rel.clone());
    let search_by_name = state.config.streaming.search_by_name;
    let (path, kind) = tokio::task::spawn_blocking(move || -> Result<_> {
        let ResolvedResource::File(path) = resolve(&root, &reference, search_by_name)? else {
            return Err(Error::Other("file reference resolved to an archive member".into()));
        };
        let kind = classify(&path)?;
        Ok((path, kind))
    })
    .await
    .map_err(|e| Error::Other(format!("archive lookup task panicked: {}", e)))??;

    let archive_rel = path
        .strip_prefix(&state.config.root_dir)
        .map(Path::to_path_buf)
        .unwrap_or(rel);
    let members = list_archive_async(path)
        .await?
        .into_iter()
        .map(|entry| ArchiveMemberInfo {
            reference: (!entry.is_dir)
                .then(|| ResourceRef::virtual_path(&archive_rel, &entry.name)),
            entry,
        })
        .collect();

    Ok(Json(ArchiveListing {
        archive: query.path,
        kind,
        members,
    }))
}

/// GET /api/check-archives - Whether a folder holds archive volumes
///
/// Looks in `<incomplete>/<folder>` first, then `<folder>`, under the served
/// root. Only the folder's own entries are checked.
#[utoipa::path(
    get,
    path = "/api/check-archives",
    tag = "archives",
    params(FolderQuery),
    responses(
        (status = 200, description = "Archive kinds present in the folder", body = FolderArchives),
        (status = 400, description = "Invalid folder name", body = crate::error::ApiError)
    )
)]
pub async fn check_archives(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> Result<Json<FolderArchives>> {
    let rel = relative_path(&query.folder)?;
    let root = state.config.root_dir.clone();
    let incomplete = state.config.streaming.incomplete_dir_name.clone();

    let mut summary = tokio::task::spawn_blocking(move || -> Result<FolderArchives> {
        let candidates = [root.join(&incomplete).join(&rel), root.join(&rel)];
        let Some(dir) = candidates.iter().find(|dir| dir.is_dir()) else {
            debug!(folder = ?rel, "folder not found");
            return Ok(FolderArchives::default());
        };

        let mut summary = FolderArchives {
            found: true,
            ..FolderArchives::default()
        };
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            match detect_archive_kind(&path) {
                Some(ArchiveKind::SevenZip) => summary.has_7z = true,
                Some(ArchiveKind::Rar) => summary.has_rar = true,
                Some(ArchiveKind::Zip) => summary.has_zip = true,
                None => {}
            }
        }
        debug!(?dir, has_7z = summary.has_7z, has_rar = summary.has_rar, "checked folder");
        Ok(summary)
    })
    .await
    .map_err(|e| Error::Other(format!("folder check task panicked: {}", e)))??;

    summary.folder = query.folder;
    Ok(Json(summary))
}

/// GET /api/extractions - Background extraction status
#[utoipa::path(
    get,
    path = "/api/extractions",
    tag = "archives",
    responses(
        (status = 200, description = "Every archive the scheduler has claimed, by path", body = [crate::monitor::LedgerEntry])
    )
)]
pub async fn list_extractions(
    State(state): State<AppState>,
) -> Json<Vec<crate::monitor::LedgerEntry>> {
    Json(state.ledger.snapshot().await)
}
