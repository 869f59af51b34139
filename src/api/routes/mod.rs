//! Route handlers for the REST API
//!
//! - [`system`] - health and the OpenAPI document
//! - [`archives`] - archive listings, folder checks and extraction status
//! - [`stream`] - range streaming of files and archive members

use serde::{Deserialize, Serialize};

mod archives;
mod stream;
mod system;

pub use archives::*;
pub use stream::*;
pub use system::*;

/// Query parameters for GET /api/archives
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct ArchiveQuery {
    /// Archive path relative to the served root (first volume for split sets)
    pub path: String,
}

/// One listed member, with the reference that streams it
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ArchiveMemberInfo {
    /// Name, size and directory flag from the archive headers
    #[serde(flatten)]
    pub entry: crate::archive::ArchiveEntry,
    /// Reference to request under `/` to stream this member (absent for directories)
    pub reference: Option<String>,
}

/// Response for GET /api/archives
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ArchiveListing {
    /// The archive path as requested
    pub archive: String,
    /// Detected container format
    pub kind: crate::archive::ArchiveKind,
    /// Members in archive order
    pub members: Vec<ArchiveMemberInfo>,
}

/// Query parameters for GET /api/check-archives
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct FolderQuery {
    /// Folder name relative to the served root or its incomplete directory
    pub folder: String,
}

/// Response for GET /api/check-archives
#[derive(Debug, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderArchives {
    /// The folder as requested
    pub folder: String,
    /// Whether a matching directory exists
    pub found: bool,
    /// A `.7z` or `.7z.NNN` volume lies directly in the folder
    pub has_7z: bool,
    /// A `.rar`, `.rNN` or `.partNN.rar` volume lies directly in the folder
    pub has_rar: bool,
    /// A `.zip` lies directly in the folder
    pub has_zip: bool,
}
