/*
 * patch.rs
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

//! Per-message metadata-header patching during an online copy.

use crate::mbox::{
    is_envelope_line, keywords_header_block, next_line_start, status2_line, status_line,
    wrapped_keywords_block, KEYWORDS_HEADER, STATUS_HEADER, STATUS2_HEADER,
};
use crate::store::{props, MessageFlags, MessageHeader, Result};
use std::io::Write;
use tracing::warn;

/// Where the patcher is within the current message.
enum PatchState {
    /// The next chunk is the message's first: inspect and patch it.
    FirstChunk,
    /// Patching is decided; remaining chunks stream through untouched.
    Passthrough,
}

/// Rewrites one message's status and keyword headers while its bytes are
/// copied. Created fresh per message; all patching happens in the first
/// chunk, which is expected to cover the header area.
pub struct HeaderPatcher {
    flags: MessageFlags,
    recorded_status_offset: u32,
    keywords: String,
    grow_keywords: bool,
    state: PatchState,
    bytes_added: i64,
    patched_status_offset: Option<u32>,
    index_suspect: bool,
    keywords_rewritten: bool,
}

impl HeaderPatcher {
    pub fn new(header: &MessageHeader) -> Self {
        Self {
            flags: header.flags,
            recorded_status_offset: header.status_offset,
            keywords: header
                .string_property(props::KEYWORDS)
                .unwrap_or("")
                .to_string(),
            grow_keywords: header.u32_property(props::GROW_KEYWORDS).unwrap_or(0) != 0,
            state: PatchState::FirstChunk,
            bytes_added: 0,
            patched_status_offset: None,
            index_suspect: false,
            keywords_rewritten: false,
        }
    }

    /// Bytes the rewrites added (negative when a keyword block shrank).
    pub fn bytes_added(&self) -> i64 {
        self.bytes_added
    }

    /// New status offset when fresh status lines were inserted; `None`
    /// when the source record's offset still holds.
    pub fn patched_status_offset(&self) -> Option<u32> {
        self.patched_status_offset
    }

    /// True when the message contradicted the index (no envelope where one
    /// was required, or the recorded status offset pointed elsewhere); the
    /// source index should be re-derived.
    pub fn index_suspect(&self) -> bool {
        self.index_suspect
    }

    /// True when the keyword block was materialized, so the growth marker
    /// can be dropped from the copied record.
    pub fn keywords_rewritten(&self) -> bool {
        self.keywords_rewritten
    }

    /// Write `chunk` to `out`, applying header rewrites on the first chunk.
    pub fn write_chunk(&mut self, chunk: &[u8], out: &mut dyn Write) -> Result<()> {
        match self.state {
            PatchState::Passthrough => {
                out.write_all(chunk)?;
                return Ok(());
            }
            PatchState::FirstChunk => self.state = PatchState::Passthrough,
        }
        self.patch_first_chunk(chunk, out)
    }

    fn patch_first_chunk(&mut self, chunk: &[u8], out: &mut dyn Write) -> Result<()> {
        let status_off = self.recorded_status_offset as usize;

        if status_off == 0 {
            // Never had a status line: insert both right after the envelope.
            if is_envelope_line(chunk) {
                let env_end = next_line_start(chunk, 0);
                out.write_all(&chunk[..env_end])?;
                let line1 = status_line(self.flags);
                let line2 = status2_line(self.flags);
                out.write_all(&line1)?;
                out.write_all(&line2)?;
                self.bytes_added += (line1.len() + line2.len()) as i64;
                self.patched_status_offset = Some(env_end as u32);
                out.write_all(&chunk[env_end..])?;
            } else {
                // Not an envelope where one must be: copy verbatim and let
                // the folder re-derive its index.
                self.index_suspect = true;
                out.write_all(chunk)?;
            }
            return Ok(());
        }

        if status_off + STATUS_HEADER.len() > chunk.len() {
            // Past the header area we can see; nothing can be verified.
            warn!(status_offset = status_off, "status offset beyond first chunk");
            out.write_all(chunk)?;
            return Ok(());
        }

        if !chunk[status_off..].starts_with(STATUS_HEADER.as_bytes()) {
            // The index points at something that is not a status line.
            self.index_suspect = true;
            out.write_all(chunk)?;
            return Ok(());
        }

        if !has_keywords_header(chunk) {
            // Reserve keyword space now so later edits need not grow the
            // file: insert a block directly after the two status lines.
            let mut cut = status_off;
            cut = next_line_start(chunk, cut);
            cut = next_line_start(chunk, cut);
            out.write_all(&chunk[..cut])?;
            let block = keywords_header_block(&self.keywords);
            out.write_all(&block)?;
            self.bytes_added += block.len() as i64;
            self.keywords_rewritten = true;
            out.write_all(&chunk[cut..])?;
            return Ok(());
        }

        if self.grow_keywords {
            // Rewrite the whole keyword block with the current keyword set.
            let mut cut = status_off;
            if chunk[cut..].starts_with(STATUS_HEADER.as_bytes()) {
                cut = next_line_start(chunk, cut);
            }
            if chunk[cut..].starts_with(STATUS2_HEADER.as_bytes()) {
                cut = next_line_start(chunk, cut);
            }
            let pre_keyword = cut;
            if chunk[cut..].starts_with(KEYWORDS_HEADER.as_bytes()) {
                cut = next_line_start(chunk, cut);
                while chunk.get(cut) == Some(&b' ') {
                    cut = next_line_start(chunk, cut);
                }
            }
            let old_block = (cut - pre_keyword) as i64;
            out.write_all(&chunk[..pre_keyword])?;
            let block = wrapped_keywords_block(&self.keywords);
            out.write_all(&block)?;
            self.bytes_added += block.len() as i64 - old_block;
            self.keywords_rewritten = true;
            out.write_all(&chunk[cut..])?;
            return Ok(());
        }

        out.write_all(chunk)?;
        Ok(())
    }
}

fn has_keywords_header(chunk: &[u8]) -> bool {
    let name = KEYWORDS_HEADER.as_bytes();
    chunk.windows(name.len()).any(|w| w == name)
}
