//! Error types for usenet-file-server
//!
//! This module provides the error taxonomy shared by the streaming path, the
//! archive index and the extraction monitor:
//! - Domain-specific error types (range, archive, resource resolution)
//! - HTTP status code mapping for the HTTP boundary
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for usenet-file-server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-file-server
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "streaming.chunk_size")
        key: Option<String>,
    },

    /// Requested start offset lies at or beyond the end of the resource
    #[error("range not satisfiable: start {start} is beyond total size {total}")]
    RangeNotSatisfiable {
        /// Requested first byte
        start: u64,
        /// Total size of the resource
        total: u64,
    },

    /// The source kept returning no data until the retry budget ran out
    #[error("source unavailable at offset {offset}: sent {sent} of {requested} bytes")]
    SourceUnavailable {
        /// Absolute offset at which reads stopped producing data
        offset: u64,
        /// Bytes delivered before giving up
        sent: u64,
        /// Bytes originally requested
        requested: u64,
    },

    /// Archive could not be listed or read
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Malformed or unsafe resource reference
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Archive-related errors
///
/// These are reported immediately and never retried; an archive that fails
/// to list is simply left out of listings.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Corrupt header, truncated data or a decoder failure
    #[error("cannot read archive {archive}: {reason}")]
    Unreadable {
        /// The archive that failed to open or decode
        archive: PathBuf,
        /// The reason reported by the decoder
        reason: String,
    },

    /// The named member does not exist in the archive
    #[error("member {member:?} not found in {archive}")]
    MemberNotFound {
        /// The archive that was searched
        archive: PathBuf,
        /// The requested member name
        member: String,
    },

    /// The named member is a directory and has no byte content
    #[error("member {member:?} in {archive} is a directory")]
    MemberIsDirectory {
        /// The archive containing the member
        archive: PathBuf,
        /// The directory member name
        member: String,
    },

    /// The file is not a supported container
    #[error("unsupported archive format: {path}")]
    UnsupportedFormat {
        /// Path of the file that could not be classified
        path: PathBuf,
    },

    /// The archive is encrypted and cannot be read without a password
    #[error("archive {archive} is encrypted")]
    Encrypted {
        /// The encrypted archive
        archive: PathBuf,
    },
}

/// API error response format
///
/// Returned by HTTP endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "range_not_satisfiable",
///     "message": "range not satisfiable: start 5000 is beyond total size 1000",
///     "details": { "start": 5000, "total": 1000 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_reference")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidReference(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Archive(ArchiveError::MemberNotFound { .. }) => 404,

            // 416 Range Not Satisfiable
            Error::RangeNotSatisfiable { .. } => 416,

            // 422 Unprocessable Entity - the file exists but cannot be decoded
            Error::Archive(_) => 422,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 503 Service Unavailable - the bytes have not arrived yet
            Error::SourceUnavailable { .. } => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::SourceUnavailable { .. } => "source_unavailable",
            Error::Archive(e) => match e {
                ArchiveError::Unreadable { .. } => "archive_unreadable",
                ArchiveError::MemberNotFound { .. } => "member_not_found",
                ArchiveError::MemberIsDirectory { .. } => "member_is_directory",
                ArchiveError::UnsupportedFormat { .. } => "unsupported_format",
                ArchiveError::Encrypted { .. } => "archive_encrypted",
            },
            Error::InvalidReference(_) => "invalid_reference",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::RangeNotSatisfiable { start, total } => Some(serde_json::json!({
                "start": start,
                "total": total,
            })),
            Error::SourceUnavailable {
                offset,
                sent,
                requested,
            } => Some(serde_json::json!({
                "offset": offset,
                "sent_bytes": sent,
                "requested_bytes": requested,
            })),
            Error::Archive(ArchiveError::MemberNotFound { archive, member })
            | Error::Archive(ArchiveError::MemberIsDirectory { archive, member }) => {
                Some(serde_json::json!({
                    "archive": archive,
                    "member": member,
                }))
            }
            Error::Archive(ArchiveError::Unreadable { archive, .. })
            | Error::Archive(ArchiveError::Encrypted { archive }) => Some(serde_json::json!({
                "archive": archive,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
