use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;

/// Lifecycle of one archive in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    /// An extraction is running right now
    InProgress,
    /// The last attempt did not finish; eligible again on a later scan
    Retrying,
    /// Extracted successfully; never attempted again
    Done,
}

/// What the ledger knows about one archive
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerEntry {
    /// Canonical path of the archive's first volume
    #[schema(value_type = String)]
    pub archive: PathBuf,
    /// Current state
    pub state: ExtractionState,
    /// Attempts started so far
    pub attempts: u32,
    /// When the state last changed
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
    /// Diagnostic from the last unsuccessful attempt
    pub last_error: Option<String>,
}

/// Shared record of which archives are being or have been extracted
///
/// Claims are check-and-insert under one lock, so an archive can never have
/// two extractions in flight even when several workers race for it. Keys are
/// expected to be canonical paths.
#[derive(Debug, Clone, Default)]
pub struct ExtractionLedger {
    entries: Arc<Mutex<HashMap<PathBuf, LedgerEntry>>>,
}

impl ExtractionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `archive` for extraction
    ///
    /// Returns `false` if it is already in progress or done.
    pub async fn try_claim(&self, archive: &Path) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        match entries.get_mut(archive) {
            Some(entry) if entry.state != ExtractionState::Retrying => false,
            Some(entry) => {
                entry.state = ExtractionState::InProgress;
                entry.attempts += 1;
                entry.updated_at = now;
                true
            }
            None => {
                entries.insert(
                    archive.to_path_buf(),
                    LedgerEntry {
                        archive: archive.to_path_buf(),
                        state: ExtractionState::InProgress,
                        attempts: 1,
                        updated_at: now,
                        last_error: None,
                    },
                );
                true
            }
        }
    }

    /// Mark `archive` as extracted
    pub async fn complete(&self, archive: &Path) {
        self.transition(archive, ExtractionState::Done, None).await;
    }

    /// Give up the claim on `archive` so a later scan can try again
    pub async fn release(&self, archive: &Path, reason: impl Into<String>) {
        self.transition(archive, ExtractionState::Retrying, Some(reason.into()))
            .await;
    }

    /// Whether `archive` was extracted successfully
    pub async fn is_done(&self, archive: &Path) -> bool {
        self.state_of(archive).await == Some(ExtractionState::Done)
    }

    /// Current state of `archive`, if the ledger has seen it
    pub async fn state_of(&self, archive: &Path) -> Option<ExtractionState> {
        self.entries.lock().await.get(archive).map(|e| e.state)
    }

    /// All entries, ordered by archive path
    pub async fn snapshot(&self) -> Vec<LedgerEntry> {
        let mut all: Vec<LedgerEntry> = self.entries.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.archive.cmp(&b.archive));
        all
    }

    async fn transition(&self, archive: &Path, state: ExtractionState, error: Option<String>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(archive) {
            entry.state = state;
            entry.updated_at = Utc::now();
            entry.last_error = error;
        }
    }
}
