/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Pressacarte, the mailbox compactor for the
 * Tagliacarte email client.
 *
 * Pressacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Pressacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Pressacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Folder compaction: reclaim the dead bytes a backing file accumulates
//! as messages are deleted and expunged, by rewriting the live messages
//! into a scratch file and swapping it over the original. Port from
//! gumdrop.

mod offline;
mod online;
mod scratch;

pub use scratch::{commit_data_swap, commit_folder_swap, ScratchFile};

use crate::store::{
    CompactError, Folder, FolderStorage, IndexStore, MessageStreamService, MetadataIndex,
    ProgressSink, Result, SpaceQuery,
};
use offline::OfflineCompactor;
use online::OnlineCompactor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Free-space estimate for the rebuilt index: 1 KiB per message, bounded
/// by the current index size.
const INDEX_BYTES_PER_MESSAGE: u64 = 1024;

/// Completion callback for one folder's job: reclaimed bytes on success.
pub type JobCompletion = Box<dyn FnOnce(Result<u64>) + Send>;

/// Completion callback for a whole batch.
pub type BatchCompletion = Box<dyn FnOnce(BatchSummary) + Send>;

/// Cooperative cancellation flag, shared between the requester and the
/// running batch; jobs observe it at message boundaries.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Aggregate outcome of one batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Folders whose jobs completed, compacted or skipped as a no-op.
    pub folders_compacted: u32,
    /// Folders whose jobs failed; the batch continued past them.
    pub folders_failed: u32,
    /// The last failure seen, when any job failed.
    pub last_error: Option<CompactError>,
    /// Bytes reclaimed across the successfully compacted folders.
    pub reclaimed_bytes: u64,
}

/// The collaborators every compaction job draws on.
pub struct CompactContext {
    pub stream: Arc<dyn MessageStreamService>,
    pub indexes: Arc<dyn IndexStore>,
    pub space: Arc<dyn SpaceQuery>,
    pub progress: Arc<dyn ProgressSink>,
}

/// Drives compaction over folders, one at a time.
pub struct FolderCompactor {
    ctx: CompactContext,
}

impl FolderCompactor {
    pub fn new(ctx: CompactContext) -> Self {
        Self { ctx }
    }

    /// Compact one folder. The completion callback fires exactly once,
    /// inline, before this returns.
    pub fn compact_folder(&self, folder: &dyn Folder, cancel: &CancelFlag, done: JobCompletion) {
        done(self.compact_one(folder, cancel));
    }

    /// Compact a batch of folders strictly in order. One folder's failure
    /// is recorded and the batch moves on; the aggregate report is
    /// delivered exactly once, inline, before this returns.
    pub fn compact_folders(
        &self,
        folders: &[Arc<dyn Folder>],
        cancel: &CancelFlag,
        done: BatchCompletion,
    ) {
        let mut summary = BatchSummary::default();
        let mut advisory_shown = false;
        for folder in folders {
            if cancel.is_canceled() {
                summary.last_error = Some(CompactError::Canceled);
                break;
            }
            match self.compact_one(folder.as_ref(), cancel) {
                Ok(reclaimed) => {
                    summary.folders_compacted += 1;
                    summary.reclaimed_bytes += reclaimed;
                }
                Err(e) => {
                    if e.is_advisory() && !advisory_shown {
                        self.ctx.progress.report_status(&e.to_string());
                        advisory_shown = true;
                    }
                    warn!(folder = folder.name(), error = %e, "folder compaction failed");
                    summary.folders_failed += 1;
                    summary.last_error = Some(e);
                }
            }
        }
        debug!(
            compacted = summary.folders_compacted,
            failed = summary.folders_failed,
            reclaimed = summary.reclaimed_bytes,
            "compaction batch finished"
        );
        done(summary);
    }

    fn compact_one(&self, folder: &dyn Folder, cancel: &CancelFlag) -> Result<u64> {
        match folder.storage() {
            FolderStorage::Local => OnlineCompactor::new(&self.ctx, cancel).run(folder),
            FolderStorage::Replica => OfflineCompactor::new(&self.ctx, cancel).run(folder),
        }
    }
}

/// What the shared admission stage decided for a folder.
pub(crate) enum Admission {
    /// Nothing to do; the job delivers success without touching anything.
    Skip(&'static str),
    /// Go ahead; the folder's compaction lock is held and `reclaimable`
    /// bytes stand to be recovered.
    Proceed { reclaimable: u64 },
}

/// Shared job preamble: no-op short circuits, then the lock, then the
/// free-space check. On `Proceed` the caller owns the lock; on any error
/// it has already been released.
pub(crate) fn admit(
    ctx: &CompactContext,
    folder: &dyn Folder,
    source: &dyn MetadataIndex,
) -> Result<Admission> {
    if !source.is_valid() {
        return Ok(Admission::Skip("index needs re-derivation first"));
    }
    if !folder.data_path().exists() {
        return Ok(Admission::Skip("no backing file"));
    }
    let reclaimable = folder.reclaimable_bytes()?;
    if reclaimable == 0 {
        return Ok(Admission::Skip("nothing to reclaim"));
    }

    folder.try_acquire_compaction_lock()?;
    match check_space(ctx, folder, source, reclaimable) {
        Ok(()) => Ok(Admission::Proceed { reclaimable }),
        Err(e) => {
            folder.release_compaction_lock();
            Err(e)
        }
    }
}

/// The compacted file needs about the live bytes plus a rebuilt index;
/// refuse to start when the volume cannot hold that next to the originals.
fn check_space(
    ctx: &CompactContext,
    folder: &dyn Folder,
    source: &dyn MetadataIndex,
    reclaimable: u64,
) -> Result<()> {
    // flush pending index state so the sizes below are current
    source.commit()?;
    let expected_index = source
        .size_on_disk()
        .min(INDEX_BYTES_PER_MESSAGE.saturating_mul(source.message_count()));
    let needed = folder
        .size_on_disk()?
        .saturating_sub(reclaimable)
        .saturating_add(expected_index);
    match ctx.space.free_space(folder.data_path()) {
        Ok(free) if free < needed => {
            warn!(
                folder = folder.name(),
                free, needed, "not enough disk space to compact"
            );
            Err(CompactError::DiskSpace {
                folder: folder.name().to_string(),
            })
        }
        Ok(_) => Ok(()),
        Err(CompactError::Unsupported) => {
            debug!("free space query unsupported here, admitting");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
