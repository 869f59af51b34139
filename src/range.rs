//! Byte range resolution for range requests
//!
//! Turns an optional `Range` header into an inclusive `[start, end]` interval
//! against a known total size.

use crate::error::{Error, Result};
use serde::Serialize;

/// Inclusive byte interval of a resource, resolved against its total size
///
/// Invariant: `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeSpec {
    /// First byte (inclusive)
    pub start: u64,
    /// Last byte (inclusive)
    pub end: u64,
    /// Total size of the resource
    pub total: u64,
}

impl RangeSpec {
    /// Resolve an optional raw `Range` header against `total` bytes
    ///
    /// - absent or malformed header: the whole resource
    /// - `bytes=N-`: from `N` to the last byte
    /// - `end` past the last byte is clamped
    /// - `start >= total` is [`Error::RangeNotSatisfiable`], checked before clamping
    ///
    /// Only the first range of a multi-range header is honored. A suffix
    /// range (`bytes=-N`) has no numeric start and counts as malformed.
    pub fn resolve(header: Option<&str>, total: u64) -> Result<Self> {
        let requested = header.and_then(parse_range_header);

        let Some((start, end)) = requested else {
            return Self::full(total);
        };

        if start >= total {
            return Err(Error::RangeNotSatisfiable { start, total });
        }

        let last = total - 1;
        let end = end.map_or(last, |end| end.min(last));

        Ok(Self { start, end, total })
    }

    /// The whole resource, `[0, total - 1]`
    ///
    /// An empty resource has no satisfiable range.
    pub fn full(total: u64) -> Result<Self> {
        if total == 0 {
            return Err(Error::RangeNotSatisfiable { start: 0, total });
        }
        Ok(Self {
            start: 0,
            end: total - 1,
            total,
        })
    }

    /// Number of bytes covered by the interval
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; an interval covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Lower `end` so the interval covers at most `max_len` bytes
    pub fn limit(self, max_len: u64) -> Self {
        if max_len == 0 || self.len() <= max_len {
            return self;
        }
        Self {
            end: self.start + max_len - 1,
            ..self
        }
    }

    /// Value for the `Content-Range` header: `bytes start-end/total`
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Parse `bytes=<start>-<end>?` into `(start, Some(end) | None)`
///
/// Returns `None` when the header has no numeric start or an end before the start.
fn parse_range_header(header: &str) -> Option<(u64, Option<u64>)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let first = spec.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;

    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    if end.is_empty() {
        return Some((start, None));
    }

    let end: u64 = end.parse().ok()?;
    if end < start {
        return None;
    }
    Some((start, Some(end)))
}
