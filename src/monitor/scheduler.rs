use super::clock::{Clock, SystemClock};
use super::extractor::{ExtractionOutcome, Extractor, default_extractor};
use super::ledger::{ExtractionLedger, ExtractionState};
use super::probe::{FsProbe, LocalFs};
use super::stability::{Stability, StabilityTracker};
use crate::archive::{ArchiveKind, discover_parts};
use crate::config::{Config, MonitorConfig};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// An archive found by a scan, with the sizes of all of its volumes
#[derive(Debug, Clone)]
struct Candidate {
    /// First volume as found on disk
    primary: PathBuf,
    /// Ledger key for the archive
    key: PathBuf,
    parts: Vec<(PathBuf, u64)>,
}

/// What a finished extraction job hands back to the scheduler
#[derive(Debug)]
struct JobReport {
    key: PathBuf,
    parts: Vec<PathBuf>,
    outcome: ExtractionOutcome,
}

/// Counts from one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Archives found by the scan, excluding ones already extracted or in flight
    pub candidates: usize,
    /// Candidates whose every volume is stable
    pub stable: usize,
    /// Extraction jobs started this tick
    pub started: usize,
    /// Finished jobs whose results were applied this tick
    pub finished: usize,
}

/// Background task that extracts archives once they stop growing
///
/// Each tick applies the results of finished extraction jobs, scans the root
/// for archives, feeds every volume's size through the [`StabilityTracker`]
/// and starts an extraction for every archive whose volumes are all stable
/// and which the [`ExtractionLedger`] lets it claim. Jobs run in a `JoinSet`
/// and at most `max_concurrent_extractions` of them extract at once, so a slow
/// extraction never delays the next scan.
pub struct ExtractionScheduler {
    root: PathBuf,
    scan_interval: Duration,
    kinds: Vec<ArchiveKind>,
    probe: Arc<dyn FsProbe>,
    extractor: Arc<dyn Extractor>,
    clock: Arc<dyn Clock>,
    ledger: ExtractionLedger,
    tracker: StabilityTracker,
    permits: Arc<Semaphore>,
    jobs: JoinSet<JobReport>,
    in_flight: HashMap<Id, PathBuf>,
}

impl ExtractionScheduler {
    /// Create a scheduler over the configured root using the local filesystem
    /// and the real clock
    pub fn new(config: &Config, ledger: ExtractionLedger) -> Self {
        Self::with_parts(
            config.root_dir.clone(),
            &config.monitor,
            Arc::new(LocalFs),
            default_extractor(&config.monitor),
            Arc::new(SystemClock),
            ledger,
        )
    }

    /// Create a scheduler from explicit collaborators
    pub fn with_parts(
        root: PathBuf,
        config: &MonitorConfig,
        probe: Arc<dyn FsProbe>,
        extractor: Arc<dyn Extractor>,
        clock: Arc<dyn Clock>,
        ledger: ExtractionLedger,
    ) -> Self {
        Self {
            root,
            scan_interval: config.scan_interval,
            kinds: config.kinds.clone(),
            probe,
            extractor,
            clock,
            ledger,
            tracker: StabilityTracker::new(config.stable_after),
            permits: Arc::new(Semaphore::new(config.max_concurrent_extractions.max(1))),
            jobs: JoinSet::new(),
            in_flight: HashMap::new(),
        }
    }

    /// The ledger this scheduler records extractions in
    pub fn ledger(&self) -> &ExtractionLedger {
        &self.ledger
    }

    /// Number of paths currently tracked for stability
    pub fn tracked(&self) -> usize {
        self.tracker.len()
    }

    /// Extraction jobs started and not yet applied
    pub fn running(&self) -> usize {
        self.jobs.len()
    }

    /// Run one scan-and-dispatch cycle
    pub async fn tick(&mut self) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        while let Some(joined) = self.jobs.try_join_next_with_id() {
            self.apply(joined).await;
            summary.finished += 1;
        }

        let candidates = self.scan().await?;
        let now = self.clock.now();

        let present: HashSet<PathBuf> = candidates
            .iter()
            .flat_map(|c| c.parts.iter().map(|(path, _)| path.clone()))
            .collect();
        self.tracker.retain(|path| present.contains(path));

        for candidate in candidates {
            match self.ledger.state_of(&candidate.key).await {
                Some(ExtractionState::Done) | Some(ExtractionState::InProgress) => continue,
                Some(ExtractionState::Retrying) | None => {}
            }
            summary.candidates += 1;

            let stability = self.tracker.observe_group(&candidate.parts, now);
            if stability != Stability::Stable {
                debug!(
                    archive = ?candidate.primary,
                    parts = candidate.parts.len(),
                    "archive still growing, waiting for it to settle"
                );
                continue;
            }
            summary.stable += 1;

            if !self.ledger.try_claim(&candidate.key).await {
                continue;
            }

            info!(
                archive = ?candidate.primary,
                parts = candidate.parts.len(),
                extractor = self.extractor.name(),
                "archive is stable, starting extraction"
            );
            self.spawn_job(candidate);
            summary.started += 1;
        }

        Ok(summary)
    }

    /// Tick every `scan_interval` until `cancel` fires
    ///
    /// Extractions still running at shutdown are allowed to finish so they
    /// do not leave half-written files behind.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            root = ?self.root,
            interval_secs = self.scan_interval.as_secs(),
            extractor = self.extractor.name(),
            "extraction scheduler started"
        );

        loop {
            match self.tick().await {
                Ok(summary) if summary.started > 0 || summary.finished > 0 => {
                    debug!(?summary, "scheduler tick");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "archive scan failed, will retry next tick"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.scan_interval) => {}
            }
        }

        if !self.jobs.is_empty() {
            info!(running = self.jobs.len(), "waiting for running extractions before shutdown");
        }
        self.wait_idle().await;
        info!("extraction scheduler stopped");
    }

    /// Wait for every running extraction and apply its result
    pub async fn wait_idle(&mut self) {
        while let Some(joined) = self.jobs.join_next_with_id().await {
            self.apply(joined).await;
        }
    }

    async fn scan(&self) -> Result<Vec<Candidate>> {
        let probe = Arc::clone(&self.probe);
        let root = self.root.clone();
        let kinds = self.kinds.clone();

        tokio::task::spawn_blocking(move || scan_candidates(probe.as_ref(), &root, &kinds))
            .await
            .map_err(|e| Error::Other(format!("archive scan task panicked: {}", e)))
    }

    fn spawn_job(&mut self, candidate: Candidate) {
        let extractor = Arc::clone(&self.extractor);
        let permits = Arc::clone(&self.permits);
        let key = candidate.key.clone();

        let handle = self.jobs.spawn(async move {
            let parts = candidate.parts.into_iter().map(|(path, _)| path).collect();
            let dest = candidate
                .primary
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();

            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => extractor.extract(&candidate.primary, &dest).await,
                Err(_) => ExtractionOutcome::Failed {
                    code: None,
                    detail: "extraction slots closed".to_string(),
                },
            };

            JobReport {
                key: candidate.key,
                parts,
                outcome,
            }
        });
        self.in_flight.insert(handle.id(), key);
    }

    async fn apply(&mut self, joined: std::result::Result<(Id, JobReport), JoinError>) {
        let report = match joined {
            Ok((id, report)) => {
                self.in_flight.remove(&id);
                report
            }
            Err(e) => {
                if let Some(key) = self.in_flight.remove(&e.id()) {
                    error!(archive = ?key, error = %e, "extraction job panicked");
                    self.ledger.release(&key, format!("job panicked: {}", e)).await;
                }
                return;
            }
        };

        match report.outcome {
            ExtractionOutcome::Success => {
                info!(archive = ?report.key, "extraction finished");
                self.ledger.complete(&report.key).await;
                self.tracker.forget_group(&report.parts);
            }
            ExtractionOutcome::Incomplete { detail } => {
                warn!(
                    archive = ?report.key,
                    detail = %detail,
                    "archive incomplete or corrupt, will retry"
                );
                self.ledger.release(&report.key, detail).await;
            }
            ExtractionOutcome::Failed { code, detail } => {
                warn!(
                    archive = ?report.key,
                    code = ?code,
                    detail = %detail,
                    "extraction failed, will retry"
                );
                self.ledger.release(&report.key, detail).await;
            }
        }
    }
}

/// Find archives and measure their volumes
///
/// Volumes are probed by sequential name until the first missing one; a
/// volume that disappears between the listing and the size check drops the
/// whole archive from this scan.
fn scan_candidates(probe: &dyn FsProbe, root: &Path, kinds: &[ArchiveKind]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for primary in probe.find_archives(root, kinds) {
        let volumes = discover_parts(&primary, |p| probe.exists(p));
        let parts: Option<Vec<(PathBuf, u64)>> = volumes
            .into_iter()
            .map(|path| probe.size(&path).map(|size| (path, size)))
            .collect();
        let Some(parts) = parts else {
            debug!(archive = ?primary, "archive volume vanished during scan");
            continue;
        };

        let key = std::fs::canonicalize(&primary).unwrap_or_else(|_| primary.clone());
        candidates.push(Candidate {
            primary,
            key,
            parts,
        });
    }

    candidates
}
