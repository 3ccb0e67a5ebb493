//! Store state machine: open/recovery, get, put, rotation, close.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use kvstack_core::{Error, Record, Result};

use crate::merge::{self, MergeJob};
use crate::segment::{self, Segment, PENDING_SUFFIX};

/// The active tail segment. Unlike frozen segments it keeps an append
/// handle open and its index grows with every put.
pub(crate) struct Active {
    pub(crate) seq: u64,
    pub(crate) path: PathBuf,
    /// `None` once `close()` has run.
    pub(crate) file: Option<File>,
    pub(crate) offset: u64,
    pub(crate) index: HashMap<String, u64>,
}

pub(crate) struct State {
    /// Frozen segments, oldest first. The active segment is the logical
    /// tail of this chain.
    pub(crate) frozen: Vec<Arc<Segment>>,
    pub(crate) active: Active,
    /// Names the next segment file; never reused.
    pub(crate) next_seq: u64,
    /// At most one merge runs at a time.
    pub(crate) merging: bool,
}

impl State {
    pub(crate) fn chain_len(&self) -> usize {
        self.frozen.len() + 1
    }
}

/// A log-structured key-value store over a directory of segment files.
///
/// All operations are async; obtain one with [`Store::open`] and share it
/// via the returned `Arc`.
pub struct Store {
    dir: PathBuf,
    segment_size: u64,
    // Shared with the background merge task, which publishes its result
    // under the same write lock every other chain mutation uses.
    state: Arc<RwLock<State>>,
}

impl Store {
    /// Open (or create) a store directory.
    ///
    /// Pre-existing `current-data<N>` files are recovered in ascending
    /// order: every segment's index is rebuilt by scanning its frames, the
    /// highest-numbered file is reopened for append as the active segment
    /// and the rest are frozen. A torn or corrupt frame anywhere fails the
    /// open. Stale merge outputs (`*.tmp`) left by a crash are swept.
    pub async fn open(dir: impl Into<PathBuf>, segment_size: u64) -> Result<Arc<Self>> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut seqs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(PENDING_SUFFIX) && name.starts_with(segment::SEGMENT_PREFIX) {
                debug!(file = name, "removing stale merge output");
                let _ = fs::remove_file(entry.path()).await;
                continue;
            }
            if let Some(seq) = segment::parse_segment_name(name) {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();

        let mut frozen = Vec::new();
        for &seq in seqs.iter().take(seqs.len().saturating_sub(1)) {
            let path = dir.join(segment::segment_file_name(seq));
            let (index, _) = segment::scan(&path).await?;
            frozen.push(Arc::new(Segment::new(seq, path, index)));
        }

        let active_seq = seqs.last().copied().unwrap_or(0);
        let active_path = dir.join(segment::segment_file_name(active_seq));
        let file = OpenOptions::new()
            .append(true)
            .read(true)
            .create(true)
            .open(&active_path)
            .await?;
        let (index, offset) = segment::scan(&active_path).await?;

        info!(
            dir = %dir.display(),
            segments = frozen.len() + 1,
            recovered_keys = index.len(),
            "store opened"
        );

        let state = State {
            frozen,
            active: Active {
                seq: active_seq,
                path: active_path,
                file: Some(file),
                offset,
                index,
            },
            next_seq: active_seq + 1,
            merging: false,
        };

        Ok(Arc::new(Self {
            dir,
            segment_size,
            state: Arc::new(RwLock::new(state)),
        }))
    }

    /// Look up the newest value for `key`, searching the active segment
    /// first and then the frozen chain newest to oldest.
    pub async fn get(&self, key: &str) -> Result<String> {
        // Locate the segment and open its file while holding the shared
        // lock; a concurrent merge can then never unlink the file between
        // the lookup and the open. The read itself runs unlocked.
        let (mut file, offset) = {
            let state = self.state.read().await;

            let found = state
                .active
                .index
                .get(key)
                .map(|&off| (state.active.path.clone(), off))
                .or_else(|| {
                    state
                        .frozen
                        .iter()
                        .rev()
                        .find_map(|seg| seg.lookup(key).map(|off| (seg.path().to_path_buf(), off)))
                });

            match found {
                Some((path, offset)) => (File::open(&path).await?, offset),
                None => return Err(Error::KeyNotFound(key.to_string())),
            }
        };

        let record = segment::read_record_at(&mut file, offset).await?;
        if record.key != key {
            return Err(Error::Corrupt(format!(
                "index for {key:?} points at record for {:?}",
                record.key
            )));
        }
        Ok(record.value)
    }

    /// Append a record, rotating the active segment first if the write
    /// would push it over the configured size.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if value.is_empty() {
            return Err(Error::EmptyValue);
        }

        let frame = Record::new(key, value).encode();

        let mut state = self.state.write().await;
        if state.active.file.is_none() {
            return Err(Error::Closed);
        }

        if state.active.offset + frame.len() as u64 > self.segment_size {
            self.rotate(&mut state).await?;
        }

        let offset = state.active.offset;
        let file = state.active.file.as_mut().ok_or(Error::Closed)?;
        file.write_all(&frame).await?;
        // write_all only hands the bytes to the runtime's write buffer;
        // they must reach the OS file before the index points at them,
        // since readers go through a fresh handle on the same path.
        file.flush().await?;

        state.active.index.insert(key.to_string(), offset);
        state.active.offset += frame.len() as u64;
        Ok(())
    }

    /// Freeze the active segment and start a fresh one. Caller holds the
    /// write lock. Schedules a merge when the chain reaches three segments
    /// and none is already running.
    async fn rotate(&self, state: &mut State) -> Result<()> {
        if let Some(mut file) = state.active.file.take() {
            file.flush().await?;
        }
        let sealed = Arc::new(Segment::new(
            state.active.seq,
            state.active.path.clone(),
            std::mem::take(&mut state.active.index),
        ));
        debug!(seq = sealed.seq(), size = state.active.offset, "segment frozen");
        state.frozen.push(sealed);

        // The merge output takes the lower sequence number so that after a
        // restart the recovered order still ranks it older than the new
        // active segment.
        let schedule_merge = state.chain_len() >= 3 && !state.merging;
        let merge_seq = if schedule_merge {
            let seq = state.next_seq;
            state.next_seq += 1;
            Some(seq)
        } else {
            None
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        let path = self.dir.join(segment::segment_file_name(seq));
        let file = OpenOptions::new()
            .append(true)
            .read(true)
            .create(true)
            .open(&path)
            .await?;
        state.active = Active {
            seq,
            path,
            file: Some(file),
            offset: 0,
            index: HashMap::new(),
        };

        if let Some(out_seq) = merge_seq {
            state.merging = true;
            let job = MergeJob {
                participants: state.frozen.clone(),
                out_seq,
            };
            tokio::spawn(merge::run(Arc::clone(&self.state), self.dir.clone(), job));
        }
        Ok(())
    }

    /// Close the active append handle. Reads keep working; further puts
    /// fail with [`Error::Closed`].
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if let Some(mut file) = state.active.file.take() {
            let _ = file.flush().await;
        }
        info!(dir = %self.dir.display(), "store closed");
    }

    /// Number of segments in the chain, the active one included.
    pub async fn segment_count(&self) -> usize {
        self.state.read().await.chain_len()
    }

    /// Bytes appended to the active segment so far.
    pub async fn active_size(&self) -> u64 {
        self.state.read().await.active.offset
    }

    /// True while a background merge is running.
    pub async fn merge_in_flight(&self) -> bool {
        self.state.read().await.merging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_initial_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 333).await.unwrap();

        assert_eq!(store.segment_count().await, 1);
        assert_eq!(store.active_size().await, 0);
        assert!(dir.path().join("current-data0").exists());
    }

    #[tokio::test]
    async fn test_put_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 333).await.unwrap();

        assert!(matches!(store.put("", "v").await, Err(Error::EmptyKey)));
        assert!(matches!(store.put("k", "").await, Err(Error::EmptyValue)));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 333).await.unwrap();

        assert!(matches!(
            store.get("absent").await,
            Err(Error::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 333).await.unwrap();

        store.put("key1", "value1").await.unwrap();
        store.close().await;

        assert!(matches!(
            store.put("key2", "value2").await,
            Err(Error::Closed)
        ));
        // Reads are unaffected by close.
        assert_eq!(store.get("key1").await.unwrap(), "value1");
    }

    #[tokio::test]
    async fn test_open_rejects_torn_active_tail() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), 333).await.unwrap();
            store.put("key1", "value1").await.unwrap();
            store.close().await;
        }

        let mut raw = std::fs::read(dir.path().join("current-data0")).unwrap();
        raw.extend_from_slice(&[0x40, 0x00, 0x00]);
        std::fs::write(dir.path().join("current-data0"), raw).unwrap();

        assert!(matches!(
            Store::open(dir.path(), 333).await,
            Err(Error::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_open_sweeps_stale_merge_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("current-data5.tmp"), b"partial").unwrap();

        let store = Store::open(dir.path(), 333).await.unwrap();
        assert_eq!(store.segment_count().await, 1);
        assert!(!dir.path().join("current-data5.tmp").exists());
    }
}
