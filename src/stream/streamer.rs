use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::range::RangeSpec;
use crate::retry::{Backoff, IsRetryable};
use crate::source::ByteSource;
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to keep waiting on a source that returns no data
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Empty reads tolerated in a row in the body of the resource
    pub max_attempts: u32,
    /// Empty reads tolerated in a row past `end_seek_threshold`
    pub end_seek_attempts: u32,
    /// Fraction of the total size beyond which a read counts as an end-seek
    pub end_seek_threshold: f64,
    /// Apply the shorter end-seek budget near the end of the resource
    pub shorten_near_end: bool,
    /// Delay sequence between attempts
    pub backoff: RetryConfig,
}

impl RetryPolicy {
    /// Build a policy from retry settings, with end-seek shortening enabled
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            end_seek_attempts: config.end_seek_attempts,
            end_seek_threshold: config.end_seek_threshold,
            shorten_near_end: true,
            backoff: config.clone(),
        }
    }

    /// Retry budget for an empty read at `cursor` of a `total`-byte resource
    ///
    /// A read near the end is usually a player probing duration or seekability;
    /// a long wait there would stall playback start.
    pub fn budget_at(&self, cursor: u64, total: u64) -> u32 {
        if self.shorten_near_end && total > 0 {
            let position = cursor as f64 / total as f64;
            if position > self.end_seek_threshold {
                return self.end_seek_attempts;
            }
        }
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Counters for one streamed transfer, readable while it runs
#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    bytes_sent: AtomicU64,
    retries: AtomicU32,
    truncated: AtomicBool,
}

impl StreamStats {
    /// Bytes yielded so far
    pub fn bytes_sent(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::Relaxed)
    }

    /// Retry waits taken so far
    pub fn retries(&self) -> u32 {
        self.inner.retries.load(Ordering::Relaxed)
    }

    /// Whether the transfer ended before the full range was produced
    pub fn truncated(&self) -> bool {
        self.inner.truncated.load(Ordering::Relaxed)
    }
}

/// Produces the bytes of a range from a source that may not have them all yet
///
/// The output is a strict, in-order prefix of `[start, end]`: either the whole
/// range, or a shorter prefix followed by an [`Error::SourceUnavailable`] item
/// once the retry budget runs out. Cancelling the token ends the stream within
/// one read or one retry wait.
pub struct PartialReadStreamer {
    source: Box<dyn ByteSource>,
    range: RangeSpec,
    policy: RetryPolicy,
    chunk_size: usize,
    cancel: CancellationToken,
    stats: StreamStats,
}

impl PartialReadStreamer {
    /// Create a streamer over `range` of `source`
    pub fn new(
        source: Box<dyn ByteSource>,
        range: RangeSpec,
        policy: RetryPolicy,
        chunk_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            range,
            policy,
            chunk_size: chunk_size.max(1),
            cancel,
            stats: StreamStats::default(),
        }
    }

    /// Handle to this transfer's counters
    pub fn stats(&self) -> StreamStats {
        self.stats.clone()
    }

    /// Consume the streamer into a lazy chunk sequence
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let state = StreamState {
            cursor: self.range.start,
            remaining: self.range.len(),
            empty_reads: 0,
            backoff: Backoff::new(&self.policy.backoff),
            done: false,
            streamer: self,
        };

        futures::stream::unfold(state, |mut state| async move {
            let item = state.next_chunk().await?;
            Some((item, state))
        })
    }
}

struct StreamState {
    streamer: PartialReadStreamer,
    cursor: u64,
    remaining: u64,
    empty_reads: u32,
    backoff: Backoff,
    done: bool,
}

impl StreamState {
    async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        if self.done {
            return None;
        }
        if self.remaining == 0 {
            self.done = true;
            info!(
                start = self.streamer.range.start,
                end = self.streamer.range.end,
                bytes_sent = self.streamer.stats.bytes_sent(),
                retries = self.streamer.stats.retries(),
                "range stream finished"
            );
            return None;
        }

        loop {
            if self.streamer.cancel.is_cancelled() {
                return self.cancelled();
            }

            let want = self.remaining.min(self.streamer.chunk_size as u64) as usize;
            let read = tokio::select! {
                biased;
                _ = self.streamer.cancel.cancelled() => None,
                read = self.streamer.source.read_at(self.cursor, want) => Some(read),
            };
            let Some(read) = read else {
                return self.cancelled();
            };

            match read {
                Ok(chunk) if !chunk.is_empty() => return Some(Ok(self.advance(chunk))),
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    debug!(offset = self.cursor, error = %e, "transient read error, treating as no data");
                }
                Err(e) => {
                    warn!(offset = self.cursor, error = %e, "read failed, ending stream");
                    return Some(Err(self.give_up_with(e)));
                }
            }

            if !self.streamer.source.may_grow() {
                debug!(offset = self.cursor, "source is fixed, no more data will arrive");
                return Some(Err(self.unavailable()));
            }

            self.empty_reads += 1;
            let total = self.streamer.range.total;
            let budget = self.streamer.policy.budget_at(self.cursor, total);
            if self.empty_reads > budget {
                warn!(
                    offset = self.cursor,
                    total,
                    attempts = budget,
                    bytes_sent = self.streamer.stats.bytes_sent(),
                    "no data after all retry attempts, ending stream early"
                );
                return Some(Err(self.unavailable()));
            }

            let delay = self.backoff.next_delay();
            self.streamer
                .stats
                .inner
                .retries
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                offset = self.cursor,
                attempt = self.empty_reads,
                budget,
                delay_ms = delay.as_millis(),
                "no data yet, waiting"
            );

            let cancelled = tokio::select! {
                biased;
                _ = self.streamer.cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                return self.cancelled();
            }
        }
    }

    fn advance(&mut self, mut chunk: Bytes) -> Bytes {
        // never yield past the end of the range
        if chunk.len() as u64 > self.remaining {
            chunk.truncate(self.remaining as usize);
        }
        let len = chunk.len() as u64;

        self.cursor += len;
        self.remaining -= len;
        self.empty_reads = 0;
        self.backoff.reset();
        self.streamer
            .stats
            .inner
            .bytes_sent
            .fetch_add(len, Ordering::Relaxed);
        chunk
    }

    fn cancelled(&mut self) -> Option<Result<Bytes>> {
        self.done = true;
        self.streamer
            .stats
            .inner
            .truncated
            .store(true, Ordering::Relaxed);
        debug!(
            offset = self.cursor,
            bytes_sent = self.streamer.stats.bytes_sent(),
            "consumer went away, stopping stream"
        );
        None
    }

    fn unavailable(&mut self) -> Error {
        let requested = self.streamer.range.len();
        self.give_up_with(Error::SourceUnavailable {
            offset: self.cursor,
            sent: requested - self.remaining,
            requested,
        })
    }

    fn give_up_with(&mut self, error: Error) -> Error {
        self.done = true;
        self.streamer
            .stats
            .inner
            .truncated
            .store(true, Ordering::Relaxed);
        error
    }
}
