//! # usenet-file-server
//!
//! Range-capable file server for a download directory that is still filling
//! up. Files can be streamed while they are being written, archive members
//! can be streamed without extracting them first, and a background scheduler
//! extracts archives once every volume has stopped growing.
//!
//! ## Components
//!
//! - [`stream`] - serves a byte range of a file or archive member, waiting
//!   for bytes that have not been written yet
//! - [`archive`] - lists and reads ZIP, RAR and 7z archives, including
//!   multi-volume sets
//! - [`monitor`] - tracks archive stability and extracts each stable archive
//!   exactly once
//! - [`api`] - axum HTTP boundary over the above
//!
//! ## Quick Start
//!
//! ```no_run
//! use usenet_file_server::{Config, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::with_root("/srv/downloads");
//!
//!     // Runs the extraction scheduler and HTTP server until SIGINT/SIGTERM
//!     serve(config).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP API module
pub mod api;
/// Archive listing, member reads and extraction
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive stability monitoring and extraction scheduling
pub mod monitor;
/// Byte range resolution
pub mod range;
/// Resource references and resolution
pub mod resource;
/// Retry logic with exponential backoff
pub mod retry;
/// Byte sources for files and archive members
pub mod source;
/// Range streaming over partially available resources
pub mod stream;

// Re-export commonly used types
pub use archive::{ArchiveEntry, ArchiveKind};
pub use config::{ApiConfig, Config, MonitorConfig, RetryConfig, StreamingConfig};
pub use error::{ApiError, ArchiveError, Error, ErrorDetail, Result, ToHttpStatus};
pub use monitor::{ExtractionLedger, ExtractionScheduler};
pub use range::RangeSpec;
pub use resource::{ResolvedResource, ResourceRef};
pub use stream::{PartialReadStreamer, StreamResponse};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the extraction scheduler and HTTP server until a termination signal
///
/// The scheduler only runs when `config.monitor.enabled` is set. On SIGINT or
/// SIGTERM the server stops accepting requests and the scheduler is cancelled;
/// extractions already running are waited for before this returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;
    let config = Arc::new(config);
    let ledger = ExtractionLedger::new();
    let cancel = CancellationToken::new();

    let scheduler = if config.monitor.enabled {
        let scheduler = ExtractionScheduler::new(&config, ledger.clone());
        Some(tokio::spawn(scheduler.run(cancel.clone())))
    } else {
        tracing::info!("archive monitor disabled");
        None
    };

    let result = tokio::select! {
        result = api::start_api_server(config.clone(), ledger) => result,
        _ = wait_for_signal() => Ok(()),
    };

    cancel.cancel();
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "extraction scheduler task failed");
    }

    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
