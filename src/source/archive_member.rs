use super::ByteSource;
use crate::archive::{find_member, list_archive_async, read_member_async};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::debug;

/// A member inside an archive, decoded into memory on first read
///
/// The decoded buffer lives as long as this source, so all chunks of one
/// transfer share a single decompression.
pub struct ArchiveMemberSource {
    archive: PathBuf,
    member: String,
    size: u64,
    data: OnceCell<Bytes>,
}

impl ArchiveMemberSource {
    /// Look the member up in the archive listing and record its size
    pub async fn open(archive: &Path, member: &str) -> Result<Self> {
        let entries = list_archive_async(archive.to_path_buf()).await?;
        let entry = find_member(&entries, archive, member)?;

        Ok(Self {
            archive: archive.to_path_buf(),
            member: entry.name.clone(),
            size: entry.size,
            data: OnceCell::new(),
        })
    }

    async fn decoded(&self) -> Result<&Bytes> {
        self.data
            .get_or_try_init(|| async {
                debug!(archive = ?self.archive, member = %self.member, "decoding member for range reads");
                let data = read_member_async(self.archive.clone(), self.member.clone()).await?;
                Ok::<_, Error>(Bytes::from(data))
            })
            .await
    }
}

#[async_trait]
impl ByteSource for ArchiveMemberSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&mut self, offset: u64, max_len: usize) -> Result<Bytes> {
        let data = self.decoded().await?;

        let len = data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(max_len).min(data.len());
        Ok(data.slice(start..end))
    }
}
