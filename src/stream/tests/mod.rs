use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::range::RangeSpec;
use crate::source::ByteSource;
use crate::stream::*;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// In-memory source where only the first `available` bytes can be read so far
struct MemorySource {
    data: Arc<Vec<u8>>,
    available: Arc<AtomicUsize>,
    growable: bool,
    reads: Arc<AtomicUsize>,
    /// Error kinds returned by the next reads, front first
    errors: Vec<std::io::ErrorKind>,
}

impl MemorySource {
    fn new(data: Vec<u8>, available: usize) -> Self {
        Self {
            data: Arc::new(data),
            available: Arc::new(AtomicUsize::new(available)),
            growable: true,
            reads: Arc::new(AtomicUsize::new(0)),
            errors: Vec::new(),
        }
    }

    fn fully_available(data: Vec<u8>) -> Self {
        let len = data.len();
        Self::new(data, len)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&mut self, offset: u64, max_len: usize) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.errors.is_empty() {
            let kind = self.errors.remove(0);
            return Err(Error::Io(std::io::Error::from(kind)));
        }

        let available = self.available.load(Ordering::SeqCst).min(self.data.len());
        let offset = offset as usize;
        if offset >= available {
            return Ok(Bytes::new());
        }
        let end = (offset + max_len).min(available);
        Ok(Bytes::copy_from_slice(&self.data[offset..end]))
    }

    fn may_grow(&self) -> bool {
        self.growable
    }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fast_policy(max_attempts: u32, end_seek_attempts: u32) -> RetryPolicy {
    RetryPolicy::from_config(&RetryConfig {
        max_attempts,
        end_seek_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        ..RetryConfig::default()
    })
}

fn range(start: u64, end: u64, total: u64) -> RangeSpec {
    RangeSpec::resolve(Some(format!("bytes={start}-{end}").as_str()), total).unwrap()
}

/// Drain a stream into the bytes it produced and the error it ended with, if any
async fn drain(stream: impl Stream<Item = Result<Bytes>>) -> (Vec<u8>, Option<Error>) {
    let mut stream = std::pin::pin!(stream);
    let mut bytes = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => {
                assert!(stream.next().await.is_none(), "nothing may follow an error");
                return (bytes, Some(e));
            }
        }
    }
    (bytes, None)
}

// ===========================================================================
// PartialReadStreamer
// ===========================================================================

#[tokio::test]
async fn fully_available_source_yields_exact_range_for_any_chunk_size() {
    let data = patterned(1000);

    for chunk_size in [1, 7, 64, 999, 1000, 5000] {
        for (start, end) in [(0, 999), (10, 500), (999, 999), (250, 251)] {
            let source = MemorySource::fully_available(data.clone());
            let streamer = PartialReadStreamer::new(
                Box::new(source),
                range(start, end, 1000),
                fast_policy(3, 3),
                chunk_size,
                CancellationToken::new(),
            );
            let stats = streamer.stats();

            let (bytes, error) = drain(streamer.into_stream()).await;
            assert!(error.is_none(), "chunk {chunk_size}, range {start}-{end}");
            assert_eq!(bytes, &data[start as usize..=end as usize]);
            assert_eq!(stats.bytes_sent(), end - start + 1);
            assert!(!stats.truncated());
        }
    }
}

#[tokio::test]
async fn chunks_never_exceed_chunk_size() {
    let source = MemorySource::fully_available(patterned(1000));
    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 999, 1000),
        fast_policy(3, 3),
        300,
        CancellationToken::new(),
    );

    let sizes: Vec<usize> = streamer
        .into_stream()
        .map(|chunk| chunk.unwrap().len())
        .collect()
        .await;
    assert_eq!(sizes, vec![300, 300, 300, 100]);
}

#[tokio::test]
async fn stalled_source_ends_with_strict_prefix_after_budget() {
    let data = patterned(1000);
    let source = MemorySource::new(data.clone(), 600);
    let reads = source.reads.clone();

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 999, 1000),
        fast_policy(5, 3),
        256,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert_eq!(bytes, &data[..600]);
    match error {
        Some(Error::SourceUnavailable {
            offset,
            sent,
            requested,
        }) => {
            assert_eq!(offset, 600);
            assert_eq!(sent, 600);
            assert_eq!(requested, 1000);
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
    assert_eq!(stats.retries(), 5);
    assert!(stats.truncated());
    // 3 data reads (256 + 256 + 88) plus one empty read per attempt and the final one
    assert_eq!(reads.load(Ordering::SeqCst), 3 + 6);
}

#[tokio::test]
async fn end_seek_uses_short_budget() {
    let source = MemorySource::new(patterned(1000), 900);
    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(950, 999, 1000),
        fast_policy(30, 3),
        256,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert!(bytes.is_empty());
    assert!(matches!(error, Some(Error::SourceUnavailable { offset: 950, .. })));
    assert_eq!(stats.retries(), 3);
}

#[tokio::test]
async fn end_seek_shortening_can_be_disabled() {
    let source = MemorySource::new(patterned(1000), 900);
    let mut policy = fast_policy(8, 3);
    policy.shorten_near_end = false;
    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(950, 999, 1000),
        policy,
        256,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    drain(streamer.into_stream()).await;
    assert_eq!(stats.retries(), 8);
}

#[tokio::test]
async fn waits_for_data_that_arrives_later() {
    let data = patterned(1000);
    let source = MemorySource::new(data.clone(), 500);
    let available = source.available.clone();

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 999, 1000),
        fast_policy(10_000, 3),
        128,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        available.store(1000, Ordering::SeqCst);
    });

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert!(error.is_none());
    assert_eq!(bytes, data);
    assert!(stats.retries() > 0, "should have waited for the second half");
}

#[tokio::test]
async fn cancellation_stops_a_waiting_stream_promptly() {
    let source = MemorySource::new(patterned(1000), 0);
    let cancel = CancellationToken::new();
    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 999, 1000),
        RetryPolicy::from_config(&RetryConfig {
            max_attempts: 1_000_000,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            ..RetryConfig::default()
        }),
        256,
        cancel.clone(),
    );
    let stats = streamer.stats();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let (bytes, error) = tokio::time::timeout(Duration::from_secs(2), drain(streamer.into_stream()))
        .await
        .expect("cancelled stream must end well before the 10s retry delay");
    assert!(bytes.is_empty());
    assert!(error.is_none(), "cancellation ends the stream quietly");
    assert!(stats.truncated());
}

#[tokio::test]
async fn already_cancelled_token_yields_nothing() {
    let source = MemorySource::fully_available(patterned(100));
    let reads = source.reads.clone();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 99, 100),
        fast_policy(3, 3),
        10,
        cancel,
    );

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert!(bytes.is_empty());
    assert!(error.is_none());
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fixed_source_does_not_retry() {
    let mut source = MemorySource::new(patterned(100), 40);
    source.growable = false;

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 99, 100),
        fast_policy(30, 3),
        16,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert_eq!(bytes.len(), 40);
    assert!(matches!(error, Some(Error::SourceUnavailable { offset: 40, .. })));
    assert_eq!(stats.retries(), 0);
}

#[tokio::test]
async fn transient_read_errors_are_retried() {
    let data = patterned(100);
    let mut source = MemorySource::fully_available(data.clone());
    source.errors = vec![
        std::io::ErrorKind::Interrupted,
        std::io::ErrorKind::WouldBlock,
    ];

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 99, 100),
        fast_policy(5, 3),
        64,
        CancellationToken::new(),
    );
    let stats = streamer.stats();

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert!(error.is_none());
    assert_eq!(bytes, data);
    assert_eq!(stats.retries(), 2);
}

#[tokio::test]
async fn permanent_read_error_ends_stream_with_that_error() {
    let mut source = MemorySource::fully_available(patterned(100));
    source.errors = vec![std::io::ErrorKind::PermissionDenied];

    let streamer = PartialReadStreamer::new(
        Box::new(source),
        range(0, 99, 100),
        fast_policy(5, 3),
        64,
        CancellationToken::new(),
    );

    let (bytes, error) = drain(streamer.into_stream()).await;
    assert!(bytes.is_empty());
    match error {
        Some(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

#[test]
fn budget_switches_past_threshold() {
    let policy = fast_policy(30, 3);
    assert_eq!(policy.budget_at(0, 1000), 30);
    assert_eq!(policy.budget_at(900, 1000), 30);
    assert_eq!(policy.budget_at(901, 1000), 3);
    assert_eq!(policy.budget_at(999, 1000), 3);
    assert_eq!(policy.budget_at(0, 0), 30);
}

// ===========================================================================
// open()
// ===========================================================================

fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::with_root(root);
    config.streaming.retry.max_attempts = 2;
    config.streaming.retry.end_seek_attempts = 1;
    config.streaming.retry.initial_delay = Duration::from_millis(1);
    config.streaming.retry.max_delay = Duration::from_millis(1);
    config
}

#[tokio::test]
async fn open_serves_requested_range_of_file() {
    let root = TempDir::new().unwrap();
    let data = patterned(1000);
    std::fs::write(root.path().join("film.mkv"), &data).unwrap();
    let config = test_config(root.path());

    let response = open(&config, "film.mkv", Some("bytes=0-999"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((response.range.start, response.range.end), (0, 999));
    assert_eq!(response.content_length, 1000);

    let (bytes, error) = drain(response.stream).await;
    assert!(error.is_none());
    assert_eq!(bytes, data);
}

#[tokio::test]
async fn open_without_range_header_covers_whole_file() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("clip.mp4"), patterned(500)).unwrap();
    let config = test_config(root.path());

    let response = open(&config, "/clip.mp4", None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.range.content_range(), "bytes 0-499/500");
    assert_eq!(response.content_length, 500);
}

#[tokio::test]
async fn open_rejects_start_beyond_end() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("clip.mp4"), patterned(500)).unwrap();
    let config = test_config(root.path());

    let result = open(&config, "clip.mp4", Some("bytes=500-"), CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(Error::RangeNotSatisfiable { start: 500, total: 500 })
    ));
}

#[tokio::test]
async fn open_caps_files_in_incomplete_directory() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("incomplete/show")).unwrap();
    std::fs::write(root.path().join("incomplete/show/ep.mkv"), patterned(5000)).unwrap();
    let mut config = test_config(root.path());
    config.streaming.incomplete_max_response = 1000;

    let response = open(
        &config,
        "incomplete/show/ep.mkv",
        Some("bytes=100-"),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(response.range.content_range(), "bytes 100-1099/5000");
    assert_eq!(response.content_length, 1000);

    let (bytes, error) = drain(response.stream).await;
    assert!(error.is_none());
    assert_eq!(bytes.len(), 1000);
}

#[tokio::test]
async fn open_streams_archive_member() {
    let root = TempDir::new().unwrap();
    let content = patterned(3000);
    {
        let file = std::fs::File::create(root.path().join("pack.zip")).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options = ::zip::write::FileOptions::default()
            .compression_method(::zip::CompressionMethod::Deflated);
        writer.start_file("inner/video.mkv", options).unwrap();
        std::io::Write::write_all(&mut writer, &content).unwrap();
        writer.finish().unwrap();
    }
    let config = test_config(root.path());

    let response = open(
        &config,
        "pack.zip|inner/video.mkv",
        Some("bytes=1000-1999"),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(response.range.total, 3000);

    let (bytes, error) = drain(response.stream).await;
    assert!(error.is_none());
    assert_eq!(bytes, &content[1000..2000]);
}

#[tokio::test]
async fn open_reports_missing_and_invalid_references() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(matches!(
        open(&config, "nope.mkv", None, CancellationToken::new()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        open(&config, "../escape.mkv", None, CancellationToken::new()).await,
        Err(Error::InvalidReference(_))
    ));
    assert!(matches!(
        open(&config, "a.zip|b|c", None, CancellationToken::new()).await,
        Err(Error::InvalidReference(_))
    ));
}
