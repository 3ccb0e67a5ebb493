//! Segment files and their in-memory indexes.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use kvstack_core::{Error, Record, Result, FRAME_OVERHEAD};

/// File name prefix for every segment in a store directory.
pub(crate) const SEGMENT_PREFIX: &str = "current-data";

/// Suffix for a merge output that has not been published yet. Files with
/// this suffix are ignored (and swept) on open.
pub(crate) const PENDING_SUFFIX: &str = ".tmp";

pub(crate) fn segment_file_name(seq: u64) -> String {
    format!("{SEGMENT_PREFIX}{seq}")
}

/// Parse a segment sequence number out of a directory entry name.
pub(crate) fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?.parse().ok()
}

/// A frozen segment: an immutable file plus the index rebuilt from it.
/// The index never changes once the segment is frozen, so readers and the
/// merge task share it without locking.
#[derive(Debug)]
pub(crate) struct Segment {
    seq: u64,
    path: PathBuf,
    index: HashMap<String, u64>,
}

impl Segment {
    pub(crate) fn new(seq: u64, path: PathBuf, index: HashMap<String, u64>) -> Self {
        Self { seq, path, index }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn lookup(&self, key: &str) -> Option<u64> {
        self.index.get(key).copied()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn index(&self) -> &HashMap<String, u64> {
        &self.index
    }
}

/// Rebuild a segment's index by decoding consecutive frames from offset 0.
/// Returns the index and the file length. Anything short of a clean EOF at
/// a frame boundary fails with `Corrupt`.
pub(crate) async fn scan(path: &Path) -> Result<(HashMap<String, u64>, u64)> {
    let data = fs::read(path).await?;
    let mut index = HashMap::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if data.len() - offset < 4 {
            return Err(Error::Corrupt(format!(
                "{}: torn frame header at offset {offset}",
                path.display()
            )));
        }
        let size =
            u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
                as usize;
        if size < FRAME_OVERHEAD || offset + size > data.len() {
            return Err(Error::Corrupt(format!(
                "{}: frame of size {size} at offset {offset} overruns file",
                path.display()
            )));
        }
        let record = Record::decode(&data[offset..offset + size])?;
        index.insert(record.key, offset as u64);
        offset += size;
    }

    Ok((index, data.len() as u64))
}

/// Read and decode the single frame starting at `offset`.
pub(crate) async fn read_record_at(file: &mut File, offset: u64) -> Result<Record> {
    file.seek(SeekFrom::Start(offset)).await?;

    let mut size_buf = [0u8; 4];
    file.read_exact(&mut size_buf).await?;
    let size = u32::from_le_bytes(size_buf) as usize;
    if size < FRAME_OVERHEAD {
        return Err(Error::Corrupt(format!(
            "frame size {size} at offset {offset} below minimum"
        )));
    }

    // Read through a limit instead of preallocating `size`, so a garbage
    // size field read from a bad offset cannot trigger a huge allocation.
    let mut frame = size_buf.to_vec();
    let read = (&mut *file)
        .take((size - 4) as u64)
        .read_to_end(&mut frame)
        .await?;
    if read != size - 4 {
        return Err(Error::Corrupt(format!(
            "truncated frame at offset {offset}: expected {size} bytes, file ends after {}",
            4 + read
        )));
    }

    Record::decode(&frame)
}
