//! Application state for the API server

use crate::Config;
use crate::monitor::ExtractionLedger;
use std::sync::Arc;

/// Shared state handed to every route handler
///
/// Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,

    /// Extraction ledger shared with the background scheduler
    pub ledger: ExtractionLedger,
}

impl AppState {
    /// Create a new AppState
    pub fn new(config: Arc<Config>, ledger: ExtractionLedger) -> Self {
        Self { config, ledger }
    }
}
