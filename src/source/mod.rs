//! Byte sources the streamer reads from
//!
//! A [`ByteSource`] is exclusively owned by the request that opened it and is
//! never shared or cached across requests.

mod archive_member;
mod file;

pub use archive_member::ArchiveMemberSource;
pub use file::FileSource;

use crate::error::Result;
use crate::resource::ResolvedResource;
use async_trait::async_trait;
use bytes::Bytes;

/// A place bytes can be read from starting at an offset
#[async_trait]
pub trait ByteSource: Send {
    /// Total size of the resource in bytes, as known when it was opened
    fn size(&self) -> u64;

    /// Read up to `max_len` bytes starting at `offset`
    ///
    /// An empty result before `size()` means the bytes are not there yet,
    /// not that the resource ended.
    async fn read_at(&mut self, offset: u64, max_len: usize) -> Result<Bytes>;

    /// Whether an empty read can still turn into data later
    ///
    /// Sources whose content is fixed once opened end the stream on the
    /// first empty read instead of waiting.
    fn may_grow(&self) -> bool {
        false
    }
}

/// Open the source backing a resolved resource
pub async fn open_source(resource: &ResolvedResource) -> Result<Box<dyn ByteSource>> {
    match resource {
        ResolvedResource::File(path) => Ok(Box::new(FileSource::open(path).await?)),
        ResolvedResource::ArchiveMember { archive, member } => {
            Ok(Box::new(ArchiveMemberSource::open(archive, member).await?))
        }
    }
}
