//! HTTP server module
//!
//! Serves files and archive members under the configured root with byte-range
//! support, lists archive contents, and reports background extraction status.

use crate::monitor::ExtractionLedger;
use crate::{Config, Result};
use axum::{Router, http::HeaderValue, middleware, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the router with all route definitions
///
/// # Routes
///
/// - `GET /health` - Health check (never requires the API key)
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
/// - `GET /api/archives?path=<rel>` - List the members of an archive
/// - `GET /api/check-archives?folder=<name>` - Archive kinds present in a folder
/// - `GET /api/extractions` - Background extraction status
/// - `GET /*path` - Stream a file, or an archive member as `archive|member`
pub fn create_router(config: Arc<Config>, ledger: ExtractionLedger) -> Router {
    let state = AppState::new(config.clone(), ledger);

    let protected = Router::new()
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/api/archives", get(routes::list_archive_members))
        .route("/api/check-archives", get(routes::check_archives))
        .route("/api/extractions", get(routes::list_extractions))
        .route("/*path", get(routes::stream_resource))
        .with_state(state);

    let protected = if config.server.api.api_key.is_some() {
        protected.layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        protected
    };

    let router = Router::new()
        .route("/health", get(routes::health_check))
        .merge(protected);

    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin. `Range` must be allowed and
/// `Content-Range` exposed for browser players to seek.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    let layer = if allow_any || origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };

    layer
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Start the HTTP server on the configured bind address
///
/// Runs until the listener fails; callers that want a graceful stop race it
/// against a shutdown signal.
///
/// ```no_run
/// use usenet_file_server::{Config, api, monitor::ExtractionLedger};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// api::start_api_server(config, ExtractionLedger::new()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(config: Arc<Config>, ledger: ExtractionLedger) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        root = ?config.root_dir,
        "Starting file server"
    );

    let app = create_router(config, ledger);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "File server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("File server stopped");
    Ok(())
}
