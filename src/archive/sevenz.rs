use super::{
    ArchiveEntry, CancellableWriter, decoder_error, extraction_cancelled, find_member, member_path,
    normalize_member_name,
};
use crate::error::{Error, Result};
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Read + Seek over split volumes laid end to end
///
/// A single-file archive is simply a one-volume set.
pub(super) struct VolumeReader {
    volumes: Vec<File>,
    /// Absolute offset at which each volume starts
    starts: Vec<u64>,
    total: u64,
    pos: u64,
}

impl VolumeReader {
    pub(super) fn open(parts: &[PathBuf]) -> std::io::Result<Self> {
        let mut volumes = Vec::with_capacity(parts.len());
        let mut starts = Vec::with_capacity(parts.len());
        let mut total = 0u64;

        for part in parts {
            let file = File::open(part)?;
            let len = file.metadata()?.len();
            starts.push(total);
            volumes.push(file);
            total += len;
        }

        Ok(Self {
            volumes,
            starts,
            total,
            pos: 0,
        })
    }

    pub(super) fn len(&self) -> u64 {
        self.total
    }

    /// Index of the volume holding absolute offset `pos`
    fn volume_at(&self, pos: u64) -> Option<usize> {
        if pos >= self.total {
            return None;
        }
        // starts is sorted; the last start <= pos wins
        Some(self.starts.partition_point(|&start| start <= pos) - 1)
    }
}

impl Read for VolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some(index) = self.volume_at(self.pos) else {
            return Ok(0);
        };

        let volume_start = self.starts[index];
        let volume_end = self
            .starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.total);
        let available = usize::try_from(volume_end - self.pos).unwrap_or(usize::MAX);
        let want = buf.len().min(available);

        let file = &mut self.volumes[index];
        file.seek(SeekFrom::Start(self.pos - volume_start))?;
        let n = file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for VolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.total.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of archive",
            )),
        }
    }
}

fn open(parts: &[PathBuf]) -> Result<SevenZReader<BufReader<VolumeReader>>> {
    let archive_path = primary(parts)?;

    let volumes = VolumeReader::open(parts).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(archive_path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    let len = volumes.len();

    SevenZReader::new(BufReader::new(volumes), len, Password::empty())
        .map_err(|e| decoder_error(archive_path, e))
}

fn primary(parts: &[PathBuf]) -> Result<&Path> {
    parts
        .first()
        .map(PathBuf::as_path)
        .ok_or_else(|| Error::Other("7z archive has no volumes".to_string()))
}

/// List entries from the archive header
pub(super) fn list(parts: &[PathBuf]) -> Result<Vec<ArchiveEntry>> {
    let reader = open(parts)?;
    Ok(entries_of(&reader))
}

fn entries_of<R: Read + Seek>(reader: &SevenZReader<R>) -> Vec<ArchiveEntry> {
    reader
        .archive()
        .files
        .iter()
        .map(|entry| ArchiveEntry {
            name: entry.name.clone(),
            size: entry.size,
            is_dir: entry.is_directory,
        })
        .collect()
}

/// Decode entries in order until the named one has been read
///
/// 7z streams are solid, so entries before the wanted one are decoded and discarded.
pub(super) fn read_member(parts: &[PathBuf], member: &str) -> Result<Vec<u8>> {
    let archive_path = primary(parts)?;
    let mut reader = open(parts)?;

    let entries = entries_of(&reader);
    let target = find_member(&entries, archive_path, member)?;
    let wanted = normalize_member_name(&target.name);
    let capacity = usize::try_from(target.size).unwrap_or(0);

    let mut data: Option<Vec<u8>> = None;
    reader
        .for_each_entries(|entry, entry_reader| {
            if normalize_member_name(&entry.name) == wanted {
                let mut buf = Vec::with_capacity(capacity);
                entry_reader.read_to_end(&mut buf)?;
                data = Some(buf);
                return Ok(false);
            }
            std::io::copy(entry_reader, &mut std::io::sink())?;
            Ok(true)
        })
        .map_err(|e| decoder_error(archive_path, e))?;

    // An empty member has no stream and is never visited
    Ok(data.unwrap_or_default())
}

/// Decode every entry under `dest`, returning the number of files written
pub(super) fn extract(
    parts: &[PathBuf],
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<usize> {
    let archive_path = primary(parts)?;
    let mut reader = open(parts)?;
    let mut written = 0;

    reader
        .for_each_entries(|entry, entry_reader| {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let relative = member_path(&entry.name);
            if relative.as_os_str().is_empty() {
                std::io::copy(entry_reader, &mut std::io::sink())?;
                return Ok(true);
            }

            let target = dest.join(relative);
            if entry.is_directory {
                std::fs::create_dir_all(&target)?;
                return Ok(true);
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let out = File::create(&target)?;
            let copied = std::io::copy(entry_reader, &mut CancellableWriter::new(out, cancel));
            if cancel.is_cancelled() {
                let _ = std::fs::remove_file(&target);
                return Ok(false);
            }
            copied?;
            written += 1;
            Ok(true)
        })
        .map_err(|e| decoder_error(archive_path, e))?;

    if cancel.is_cancelled() {
        return Err(extraction_cancelled(archive_path));
    }
    Ok(written)
}
