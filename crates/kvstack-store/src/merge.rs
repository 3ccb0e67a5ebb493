//! Background merge (compaction) of the frozen segment chain.
//!
//! A merge runs off the write path: it owns an immutable snapshot of the
//! frozen segments that existed when it was scheduled, folds them into one
//! new segment keeping only the newest record per key, and publishes the
//! result with a single locked swap. The output is written under a `.tmp`
//! name and renamed into place just before publication, so a crash can
//! never leave a half-written segment that recovery would mistake for data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use kvstack_core::Result;

use crate::segment::{self, Segment, PENDING_SUFFIX};
use crate::store::State;

/// Everything a merge needs, captured under the write lock that scheduled
/// it. `participants` is the frozen chain at that instant, oldest first.
pub(crate) struct MergeJob {
    pub(crate) participants: Vec<Arc<Segment>>,
    pub(crate) out_seq: u64,
}

pub(crate) async fn run(state: Arc<RwLock<State>>, dir: PathBuf, job: MergeJob) {
    let pending = dir.join(format!(
        "{}{}",
        segment::segment_file_name(job.out_seq),
        PENDING_SUFFIX
    ));

    match build(&pending, &job).await {
        Ok(index) => publish(state, &dir, job, pending, index).await,
        Err(err) => {
            error!(error = %err, "merge failed, keeping existing chain");
            let _ = fs::remove_file(&pending).await;
            state.write().await.merging = false;
        }
    }
}

/// Write the consolidated segment to `pending`, returning its index.
///
/// For each participant (oldest to newest), a key is copied only if no
/// newer participant also contains it, so the newest record per key wins
/// without a reverse scan.
async fn build(pending: &Path, job: &MergeJob) -> Result<HashMap<String, u64>> {
    let participants = &job.participants;
    let mut out = OpenOptions::new()
        .append(true)
        .create(true)
        .open(pending)
        .await?;
    let mut index = HashMap::new();
    let mut offset = 0u64;

    for (i, seg) in participants.iter().enumerate() {
        let mut file = File::open(seg.path()).await?;
        for (key, &record_offset) in seg.index() {
            if participants[i + 1..].iter().any(|newer| newer.contains(key)) {
                continue;
            }
            let record = segment::read_record_at(&mut file, record_offset).await?;
            let frame = record.encode();
            out.write_all(&frame).await?;
            index.insert(record.key, offset);
            offset += frame.len() as u64;
        }
    }

    out.flush().await?;
    Ok(index)
}

/// Rename the output into place and swap it in for the merged prefix.
/// Segments frozen while the merge was running stay in the chain behind
/// the new one.
async fn publish(
    state: Arc<RwLock<State>>,
    dir: &Path,
    job: MergeJob,
    pending: PathBuf,
    index: HashMap<String, u64>,
) {
    let path = dir.join(segment::segment_file_name(job.out_seq));
    if let Err(err) = fs::rename(&pending, &path).await {
        error!(error = %err, "could not finalize merge output, keeping existing chain");
        let _ = fs::remove_file(&pending).await;
        state.write().await.merging = false;
        return;
    }

    let keys = index.len();
    let merged = Arc::new(Segment::new(job.out_seq, path, index));
    let replaced = job.participants.len();

    let old_paths: Vec<PathBuf> = {
        let mut state = state.write().await;
        let old: Vec<Arc<Segment>> = state.frozen.drain(..replaced).collect();
        state.frozen.insert(0, merged);
        state.merging = false;
        old.iter().map(|seg| seg.path().to_path_buf()).collect()
    };

    // The swap is published; the replaced files are dead weight. In-flight
    // readers already hold open handles and are unaffected by the unlink.
    for old in &old_paths {
        if let Err(err) = fs::remove_file(old).await {
            warn!(path = %old.display(), error = %err, "could not remove merged segment");
        }
    }

    info!(
        merged_segments = replaced,
        seq = job.out_seq,
        keys,
        "merge complete"
    );
}
