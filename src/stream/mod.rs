//! Range streaming over partially available resources
//!
//! [`open`] is the entry point used by transports: it resolves a resource
//! reference, opens its byte source, negotiates the range and hands back a
//! lazy chunk stream together with the headers' worth of metadata.

mod streamer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use crate::retry::Backoff;
pub use streamer::{PartialReadStreamer, RetryPolicy, StreamStats};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::range::RangeSpec;
use crate::resource::{ResolvedResource, ResourceRef, is_under_dir_named, resolve};
use crate::source::open_source;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Boxed chunk stream handed to transports
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// A negotiated range transfer, ready to be sent
pub struct StreamResponse {
    /// The range actually being served
    pub range: RangeSpec,
    /// Bytes the stream produces when fully successful (`range.len()`)
    pub content_length: u64,
    /// The resource the reference resolved to
    pub resource: ResolvedResource,
    /// Live counters for the transfer
    pub stats: StreamStats,
    /// The chunks, in order
    pub stream: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("range", &self.range)
            .field("content_length", &self.content_length)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Open `reference` under the configured root and prepare to stream `range_header`
///
/// Fails with [`Error::RangeNotSatisfiable`] before any byte is read when the
/// requested start lies beyond the resource. Resources inside the incomplete
/// directory are served at most `incomplete_max_response` bytes per request.
pub async fn open(
    config: &Config,
    reference: &str,
    range_header: Option<&str>,
    cancel: CancellationToken,
) -> Result<StreamResponse> {
    let parsed = ResourceRef::parse(reference)?;

    let root = config.root_dir.clone();
    let search_by_name = config.streaming.search_by_name;
    let resource = tokio::task::spawn_blocking(move || resolve(&root, &parsed, search_by_name))
        .await
        .map_err(|e| Error::Other(format!("resource resolution task panicked: {}", e)))??;

    let source = open_source(&resource).await?;
    let mut range = RangeSpec::resolve(range_header, source.size())?;

    let streaming = &config.streaming;
    if is_under_dir_named(resource.path(), &streaming.incomplete_dir_name) {
        let limited = range.limit(streaming.incomplete_max_response);
        if limited != range {
            debug!(
                path = ?resource.path(),
                requested = range.len(),
                served = limited.len(),
                "capping response for file still being downloaded"
            );
        }
        range = limited;
    }

    info!(
        path = ?resource.path(),
        start = range.start,
        end = range.end,
        total = range.total,
        "starting range stream"
    );

    let streamer = PartialReadStreamer::new(
        source,
        range,
        RetryPolicy::from_config(&streaming.retry),
        streaming.chunk_size,
        cancel,
    );
    let stats = streamer.stats();

    Ok(StreamResponse {
        range,
        content_length: range.len(),
        resource,
        stats,
        stream: Box::pin(streamer.into_stream()),
    })
}
