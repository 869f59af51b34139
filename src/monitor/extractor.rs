use crate::archive::{extract_archive, list_archive_async, member_path};
use crate::config::MonitorConfig;
use crate::error::{ArchiveError, Error};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest stderr excerpt kept in an outcome
const DETAIL_LIMIT: usize = 200;

/// Result of one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Everything was written
    Success,
    /// The archive data is not all there yet (or is corrupt); try again later
    Incomplete {
        /// Diagnostic output
        detail: String,
    },
    /// The attempt failed for another reason; also retried later
    Failed {
        /// Process exit code, when there was one
        code: Option<i32>,
        /// Diagnostic output
        detail: String,
    },
}

impl ExtractionOutcome {
    /// Whether the archive can be considered extracted
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success)
    }
}

/// Something that can unpack an archive into a directory
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    /// Extract `archive` (first volume of a set) into `dest`
    async fn extract(&self, archive: &Path, dest: &Path) -> ExtractionOutcome;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Extraction through an external `7z` binary
///
/// Runs `7z x -y -aos -o<dest> <archive>`: existing files are kept, so a
/// retried extraction only fills in what is missing. A run that hits the
/// timeout is killed and waited for, and the member files it created are
/// removed so a later `-aos` run never keeps a half-written one.
#[derive(Debug, Clone)]
pub struct SevenZipCli {
    binary_path: PathBuf,
    timeout: Duration,
}

impl SevenZipCli {
    /// Use the binary at `binary_path`, killing it after `timeout`
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Look for `7z`, then `7za`, on PATH
    pub fn from_path(timeout: Duration) -> Option<Self> {
        ["7z", "7za"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| Self::new(path, timeout))
    }

    /// Path of the binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl Extractor for SevenZipCli {
    async fn extract(&self, archive: &Path, dest: &Path) -> ExtractionOutcome {
        let absent = absent_members(archive, dest).await;

        let mut dest_arg = std::ffi::OsString::from("-o");
        dest_arg.push(dest);

        let spawned = Command::new(&self.binary_path)
            .arg("x")
            .arg("-y")
            .arg("-aos")
            .arg(dest_arg)
            .arg(archive)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ExtractionOutcome::Failed {
                    code: None,
                    detail: format!("failed to execute {}: {}", self.binary_path.display(), e),
                };
            }
        };

        let stderr = child.stderr.take();
        let collect = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                collect.abort();
                return ExtractionOutcome::Failed {
                    code: None,
                    detail: format!("failed to wait for {}: {}", self.binary_path.display(), e),
                };
            }
            Err(_) => {
                collect.abort();
                if let Err(e) = child.kill().await {
                    warn!(?archive, error = %e, "failed to kill timed-out 7z");
                }
                let removed = remove_partial_members(dest, absent).await;
                warn!(
                    ?archive,
                    removed,
                    timeout_secs = self.timeout.as_secs(),
                    "7z timed out, partial output removed"
                );
                return ExtractionOutcome::Failed {
                    code: None,
                    detail: format!("timed out after {}s", self.timeout.as_secs()),
                };
            }
        };

        let stderr = collect.await.unwrap_or_default();
        let detail = excerpt(&stderr);
        match status.code() {
            Some(0) => ExtractionOutcome::Success,
            Some(2) => ExtractionOutcome::Incomplete { detail },
            code => ExtractionOutcome::Failed { code, detail },
        }
    }

    fn name(&self) -> &'static str {
        "7z-cli"
    }
}

/// Member targets under `dest` that do not exist yet
///
/// An archive whose headers cannot be read yields nothing, so nothing is
/// ever removed on its behalf.
async fn absent_members(archive: &Path, dest: &Path) -> Vec<PathBuf> {
    let entries = match list_archive_async(archive.to_path_buf()).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(?archive, error = %e, "cannot list archive before extraction");
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| member_path(&entry.name))
        .filter(|relative| !relative.as_os_str().is_empty())
        .map(|relative| dest.join(relative))
        .filter(|target| !target.exists())
        .collect()
}

/// Delete whichever of `targets` now exist, returning how many were removed
async fn remove_partial_members(dest: &Path, targets: Vec<PathBuf>) -> usize {
    let mut removed = 0;
    for target in targets {
        match tokio::fs::remove_file(&target).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(?dest, ?target, error = %e, "failed to remove partial file"),
        }
    }
    removed
}

/// In-process extraction with the archive backends
///
/// Used when no `7z` binary is available. On timeout the decoder is told to
/// stop and is waited for, so no write outlives the returned outcome.
#[derive(Debug, Clone)]
pub struct NativeExtractor {
    timeout: Duration,
}

impl NativeExtractor {
    /// Create an extractor that gives up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Extractor for NativeExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> ExtractionOutcome {
        let archive_path = archive.to_path_buf();
        let dest_path = dest.to_path_buf();
        let cancel = CancellationToken::new();
        let mut job = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || extract_archive(&archive_path, &dest_path, &cancel)
        });

        let joined = match tokio::time::timeout(self.timeout, &mut job).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                debug!(?archive, "extraction timed out, waiting for the decoder to stop");
                match job.await {
                    // Finished before it saw the cancellation
                    Ok(Ok(written)) => Ok(Ok(written)),
                    _ => {
                        return ExtractionOutcome::Failed {
                            code: None,
                            detail: format!("timed out after {}s", self.timeout.as_secs()),
                        };
                    }
                }
            }
        };

        match joined {
            Ok(Ok(written)) => {
                debug!(?archive, written, "native extraction finished");
                ExtractionOutcome::Success
            }
            Ok(Err(e)) => outcome_for_error(e),
            Err(e) => ExtractionOutcome::Failed {
                code: None,
                detail: format!("extraction task panicked: {}", e),
            },
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Unreadable data usually means later volumes are still arriving
fn outcome_for_error(error: Error) -> ExtractionOutcome {
    match error {
        Error::Archive(ArchiveError::Unreadable { reason, .. }) => {
            ExtractionOutcome::Incomplete { detail: reason }
        }
        other => ExtractionOutcome::Failed {
            code: None,
            detail: other.to_string(),
        },
    }
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(DETAIL_LIMIT) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

/// Pick the extractor for the monitor settings
///
/// An explicit `sevenzip_path` wins; otherwise PATH is searched when allowed,
/// and the in-process extractor is the fallback.
pub fn default_extractor(config: &MonitorConfig) -> Arc<dyn Extractor> {
    let timeout = config.extraction_timeout;

    if let Some(path) = &config.sevenzip_path {
        info!(binary = ?path, "using configured 7z binary for extraction");
        return Arc::new(SevenZipCli::new(path.clone(), timeout));
    }

    if config.search_path
        && let Some(cli) = SevenZipCli::from_path(timeout)
    {
        info!(binary = ?cli.binary_path(), "using 7z from PATH for extraction");
        return Arc::new(cli);
    }

    info!("no 7z binary available, using in-process extraction");
    Arc::new(NativeExtractor::new(timeout))
}
