//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the file server
///
/// Served as JSON at `/openapi.json`, and behind the Swagger UI at
/// `/swagger-ui` when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "usenet-file-server HTTP API",
        version = "0.1.0",
        description = "Range streaming of files and archive members from a download directory that may still be filling up",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3003", description = "Local server")
    ),
    paths(
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::list_archive_members,
        crate::api::routes::check_archives,
        crate::api::routes::list_extractions,
        crate::api::routes::stream_resource,
    ),
    components(schemas(
        crate::archive::ArchiveKind,
        crate::archive::ArchiveEntry,
        crate::api::routes::ArchiveQuery,
        crate::api::routes::ArchiveListing,
        crate::api::routes::ArchiveMemberInfo,
        crate::api::routes::FolderQuery,
        crate::api::routes::FolderArchives,
        crate::monitor::LedgerEntry,
        crate::monitor::ExtractionState,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "system", description = "Health check and API description"),
        (name = "archives", description = "Archive listings and background extraction status"),
        (name = "stream", description = "Byte-range streaming of files and archive members"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
