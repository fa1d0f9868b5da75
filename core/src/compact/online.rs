/*
 * online.rs
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

//! Online compaction: stream the live messages of a canonical local
//! folder into a scratch file, patching status and keyword headers on
//! the way, build a fresh index beside it, then swap both over the
//! originals.

use crate::compact::scratch::{self, ScratchFile};
use crate::compact::{admit, Admission, CancelFlag, CompactContext};
use crate::mbox::{HeaderPatcher, LINEBREAK};
use crate::store::{
    props, CompactError, CopyStreamHandler, Folder, IndexStore, MessageHeader, MessageKey,
    MessageStreamService, MetadataIndex, ProgressSink, Result,
};
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::mem;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// The four paths a dual-file swap touches.
struct SwapPlan {
    data_target: PathBuf,
    index_target: PathBuf,
    scratch_data: PathBuf,
    scratch_index: PathBuf,
}

/// Compacts one canonical-local folder.
pub(crate) struct OnlineCompactor<'a> {
    ctx: &'a CompactContext,
    cancel: &'a CancelFlag,
}

impl<'a> OnlineCompactor<'a> {
    pub(crate) fn new(ctx: &'a CompactContext, cancel: &'a CancelFlag) -> Self {
        Self { ctx, cancel }
    }

    /// Run the job to completion. Returns the bytes reclaimed, 0 when the
    /// folder had nothing to compact.
    pub(crate) fn run(&self, folder: &dyn Folder) -> Result<u64> {
        let source = folder.index()?;
        let reclaimable = match admit(self.ctx, folder, source.as_ref())? {
            Admission::Skip(reason) => {
                debug!(folder = folder.name(), reason, "skipping compaction");
                return Ok(0);
            }
            Admission::Proceed { reclaimable } => reclaimable,
        };
        // the lock is held from here; every exit goes through the release
        let result = self.compact_locked(folder, source.as_ref());
        folder.release_compaction_lock();
        result.map(|()| reclaimable)
    }

    fn compact_locked(&self, folder: &dyn Folder, source: &dyn MetadataIndex) -> Result<()> {
        self.ctx
            .progress
            .report_status(&format!("compacting folder {}", folder.name()));

        let data_target = folder.data_path().to_path_buf();
        let index_target = self.ctx.indexes.index_path_for(&data_target);
        let scratch = ScratchFile::create_beside(&data_target)?;
        let plan = SwapPlan {
            scratch_data: scratch.path().to_path_buf(),
            scratch_index: self.ctx.indexes.index_path_for(scratch.path()),
            data_target,
            index_target,
        };

        let result = self.copy_and_swap(folder, source, scratch, &plan);
        if result.is_err() {
            // leave nothing behind; an unswapped original is still live
            let _ = fs::remove_file(&plan.scratch_data);
            let _ = fs::remove_file(&plan.scratch_index);
        }
        result
    }

    fn copy_and_swap(
        &self,
        folder: &dyn Folder,
        source: &dyn MetadataIndex,
        mut scratch: ScratchFile,
        plan: &SwapPlan,
    ) -> Result<()> {
        let target = self.ctx.indexes.create(&plan.scratch_index)?;
        let keys = source.list_live_keys()?;
        debug!(
            folder = folder.name(),
            messages = keys.len(),
            "copying live messages"
        );

        let mut listener = CopyListener::new(
            scratch.writer(),
            source,
            target.as_ref(),
            self.ctx.progress.as_ref(),
            self.cancel,
            keys.len(),
        );
        if !keys.is_empty() {
            self.ctx.stream.copy_messages(folder, &keys, &mut listener)?;
        }
        let expected = listener.bytes_expected();

        let (_, written) = scratch.close()?;
        if written != expected {
            warn!(
                folder = folder.name(),
                written, expected, "scratch size disagrees with the tracked total"
            );
            return Err(CompactError::SizeMismatch {
                expected,
                actual: written,
            });
        }

        target.commit()?;
        let summary = source.summary()?;

        if let Err(e) = scratch::commit_folder_swap(
            &plan.scratch_data,
            &plan.scratch_index,
            &plan.data_target,
            &plan.index_target,
        ) {
            // when the data landed but the index did not, the restored old
            // index no longer matches the file
            if !plan.scratch_data.exists() {
                if let Ok(stale) = folder.refresh_index() {
                    let _ = stale.set_valid(false);
                    let _ = stale.commit();
                }
            }
            return Err(e);
        }

        let fresh = folder.refresh_index()?;
        fresh.set_valid(true)?;
        fresh.apply_summary(&summary)?;
        fresh.set_reclaimable_bytes(0)?;
        fresh.commit()?;
        info!(folder = folder.name(), "folder compacted");
        Ok(())
    }
}

/// Where the copy stands relative to message boundaries.
enum CopyState {
    Idle,
    InMessage {
        key: MessageKey,
        header: MessageHeader,
        start: u64,
        patcher: HeaderPatcher,
    },
}

/// Pushes each live message into the scratch file through a fresh
/// `HeaderPatcher` and records its new location in the rebuilt index.
struct CopyListener<'a> {
    writer: &'a mut BufWriter<File>,
    source: &'a dyn MetadataIndex,
    target: &'a dyn MetadataIndex,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelFlag,
    state: CopyState,
    total: usize,
    copied: usize,
    expected: u64,
    source_marked: bool,
}

impl<'a> CopyListener<'a> {
    fn new(
        writer: &'a mut BufWriter<File>,
        source: &'a dyn MetadataIndex,
        target: &'a dyn MetadataIndex,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancelFlag,
        total: usize,
    ) -> Self {
        Self {
            writer,
            source,
            target,
            progress,
            cancel,
            state: CopyState::Idle,
            total: total.max(1),
            copied: 0,
            expected: 0,
            source_marked: false,
        }
    }

    /// Bytes all copied records account for, terminators included.
    fn bytes_expected(&self) -> u64 {
        self.expected
    }
}

impl CopyStreamHandler for CopyListener<'_> {
    fn start_message(&mut self, key: MessageKey) -> Result<()> {
        if self.cancel.is_canceled() {
            return Err(CompactError::Canceled);
        }
        if !matches!(self.state, CopyState::Idle) {
            return Err(CompactError::new("message started inside another message"));
        }
        let header = self.source.header(key)?;
        // flush-and-tell: the buffered position becomes the new offset
        let start = self.writer.stream_position()?;
        self.state = CopyState::InMessage {
            key,
            patcher: HeaderPatcher::new(&header),
            header,
            start,
        };
        Ok(())
    }

    fn message_data(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            CopyState::InMessage { patcher, .. } => patcher.write_chunk(data, &mut *self.writer),
            CopyState::Idle => Err(CompactError::new("message bytes outside a message")),
        }
    }

    fn end_message(&mut self, key: MessageKey) -> Result<()> {
        let state = mem::replace(&mut self.state, CopyState::Idle);
        let CopyState::InMessage {
            key: started,
            header,
            start,
            patcher,
        } = state
        else {
            return Err(CompactError::new("message ended without a start"));
        };
        if started != key {
            return Err(CompactError::new(format!(
                "message {} ended while {} was streaming",
                key, started
            )));
        }
        self.writer.write_all(LINEBREAK)?;

        if patcher.index_suspect() && !self.source_marked {
            warn!(%key, "message layout contradicts the index, marking it for re-derivation");
            self.source.set_valid(false)?;
            self.source_marked = true;
        }

        let new_size = (header.size as i64 + patcher.bytes_added()).max(0) as u64;
        let mut copied = header;
        copied.offset = start;
        copied.size = new_size;
        if let Some(offset) = patcher.patched_status_offset() {
            copied.status_offset = offset;
        }
        copied.set_string_property(props::STORE_TOKEN, &start.to_string());
        if patcher.keywords_rewritten() {
            copied.clear_string_property(props::GROW_KEYWORDS);
        }
        self.source.copy_header_into(self.target, &copied)?;

        self.expected += new_size + LINEBREAK.len() as u64;
        self.copied += 1;
        self.progress.report((self.copied * 100 / self.total) as u32);
        Ok(())
    }
}
