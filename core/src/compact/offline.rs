/*
 * offline.rs
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

//! Offline compaction: rewrite a replica file down to the messages still
//! worth caching. Caching is best-effort, so a message that cannot be
//! copied is dropped from the cache rather than failing the job, and the
//! existing index is updated in place — no index file swap.

use crate::compact::scratch::{self, ScratchFile};
use crate::compact::{admit, Admission, CancelFlag, CompactContext};
use crate::mbox::{is_envelope_line, postmark_line, LINEBREAK};
use crate::store::{
    props, CompactError, CopyStreamHandler, Folder, MessageFlags, MessageKey,
    MessageStreamService, MetadataIndex, ProgressSink, Result,
};
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::mem;
use std::path::Path;
use tracing::{debug, info, warn};

/// Compacts one cached-replica folder.
pub(crate) struct OfflineCompactor<'a> {
    ctx: &'a CompactContext,
    cancel: &'a CancelFlag,
}

impl<'a> OfflineCompactor<'a> {
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
        let result = self.compact_locked(folder, source.as_ref());
        folder.release_compaction_lock();
        result.map(|()| reclaimable)
    }

    fn compact_locked(&self, folder: &dyn Folder, source: &dyn MetadataIndex) -> Result<()> {
        self.ctx
            .progress
            .report_status(&format!("compacting offline store {}", folder.name()));

        let data_target = folder.data_path().to_path_buf();
        let scratch = ScratchFile::create_beside(&data_target)?;
        let scratch_path = scratch.path().to_path_buf();

        let result = self.copy_and_swap(folder, source, scratch, &data_target);
        if result.is_err() {
            let _ = fs::remove_file(&scratch_path);
        }
        result
    }

    fn copy_and_swap(
        &self,
        folder: &dyn Folder,
        source: &dyn MetadataIndex,
        mut scratch: ScratchFile,
        data_target: &Path,
    ) -> Result<()> {
        let keys = source.list_cached_keys()?;
        debug!(
            folder = folder.name(),
            cached = keys.len(),
            "copying cached messages"
        );
        let total = keys.len().max(1);

        let mut expected: u64 = 0;
        for (i, &key) in keys.iter().enumerate() {
            if self.cancel.is_canceled() {
                return Err(CompactError::Canceled);
            }
            expected += self.copy_one(folder, source, &mut scratch, key)?;
            self.ctx.progress.report(((i + 1) * 100 / total) as u32);
        }

        let (scratch_path, written) = scratch.close()?;
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

        source.set_reclaimable_bytes(0)?;
        source.commit()?;
        scratch::commit_data_swap(&scratch_path, data_target)?;
        info!(folder = folder.name(), "offline store compacted");
        Ok(())
    }

    /// Copy one cached message, or drop it from the cache when it cannot
    /// be copied. Returns the bytes the scratch file grew by.
    fn copy_one(
        &self,
        folder: &dyn Folder,
        source: &dyn MetadataIndex,
        scratch: &mut ScratchFile,
        key: MessageKey,
    ) -> Result<u64> {
        let header = match source.header(key) {
            Ok(header) => header,
            Err(e) => {
                warn!(%key, error = %e, "cached message has no index record, skipping");
                return Ok(0);
            }
        };
        if header.string_property(props::PENDING_REMOVAL).is_some() {
            // the cached copy is being discarded on purpose
            debug!(%key, "dropping cached copy pending removal");
            source.clear_flags(key, MessageFlags::CACHED)?;
            source.set_string_property(key, props::PENDING_REMOVAL, "")?;
            return Ok(0);
        }

        let mut listener = ReplicaCopyListener::new(scratch.writer());
        let outcome = self.ctx.stream.stream_message(folder, key, &mut listener);
        let abandoned = listener.abandoned_start();
        let completed = listener.completed_message();
        match outcome {
            Ok(()) => {
                let (start, size) = completed
                    .ok_or_else(|| CompactError::new("stream completed without an end event"))?;
                source.set_offset_size(key, start, size, &start.to_string())?;
                Ok(size + LINEBREAK.len() as u64)
            }
            Err(CompactError::Canceled) => Err(CompactError::Canceled),
            Err(e) => {
                // best-effort cache: drop the entry rather than fail the job
                warn!(%key, error = %e, "could not copy cached message, dropping it from the cache");
                if let Some(start) = abandoned {
                    scratch.truncate_to(start)?;
                }
                source.clear_flags(key, MessageFlags::CACHED)?;
                Ok(0)
            }
        }
    }
}

/// Whether the next chunk is the message's first.
enum BodyPhase {
    AwaitingFirst,
    Streaming,
}

/// Where the replica copy stands relative to message boundaries.
enum ReplicaState {
    Idle,
    InMessage {
        key: MessageKey,
        start: u64,
        written: u64,
        body: BodyPhase,
    },
}

/// Streams one cached message byte-for-byte into the scratch file,
/// synthesizing an envelope line when the stored copy has none.
struct ReplicaCopyListener<'a> {
    writer: &'a mut BufWriter<File>,
    state: ReplicaState,
    completed: Option<(u64, u64)>,
}

impl<'a> ReplicaCopyListener<'a> {
    fn new(writer: &'a mut BufWriter<File>) -> Self {
        Self {
            writer,
            state: ReplicaState::Idle,
            completed: None,
        }
    }

    /// New offset and size of the message once it streamed to the end.
    fn completed_message(&self) -> Option<(u64, u64)> {
        self.completed
    }

    /// Scratch offset the message started at, when it never finished;
    /// the caller truncates back to it.
    fn abandoned_start(&self) -> Option<u64> {
        match self.state {
            ReplicaState::InMessage { start, .. } => Some(start),
            ReplicaState::Idle => None,
        }
    }
}

impl CopyStreamHandler for ReplicaCopyListener<'_> {
    fn start_message(&mut self, key: MessageKey) -> Result<()> {
        if !matches!(self.state, ReplicaState::Idle) {
            return Err(CompactError::new("message started inside another message"));
        }
        let start = self.writer.stream_position()?;
        self.state = ReplicaState::InMessage {
            key,
            start,
            written: 0,
            body: BodyPhase::AwaitingFirst,
        };
        Ok(())
    }

    fn message_data(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            ReplicaState::InMessage { written, body, .. } => {
                if matches!(body, BodyPhase::AwaitingFirst) {
                    *body = BodyPhase::Streaming;
                    if !is_envelope_line(data) {
                        let postmark = postmark_line();
                        self.writer.write_all(&postmark)?;
                        *written += postmark.len() as u64;
                    }
                }
                self.writer.write_all(data)?;
                *written += data.len() as u64;
                Ok(())
            }
            ReplicaState::Idle => Err(CompactError::new("message bytes outside a message")),
        }
    }

    fn end_message(&mut self, key: MessageKey) -> Result<()> {
        let state = mem::replace(&mut self.state, ReplicaState::Idle);
        let ReplicaState::InMessage {
            key: started,
            start,
            written,
            ..
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
        self.completed = Some((start, written));
        Ok(())
    }
}
