/*
 * index.rs
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

//! Metadata index trait: the per-folder record store compaction reads
//! and rewrites.

use crate::store::error::Result;
use crate::store::flags::MessageFlags;
use crate::store::header::MessageHeader;
use crate::store::key::MessageKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Folder-level attributes carried from an old index to its rebuilt
/// replacement: sort order, view settings, character set and the like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub properties: Vec<(String, String)>,
}

/// A folder's metadata index: one record per message plus folder counters.
///
/// Implementations guard their own interior state; the engine holds
/// `Arc<dyn MetadataIndex>` handles and drives them from one thread.
pub trait MetadataIndex: Send + Sync {
    /// Keys of all live (not expunged) messages, in backing-file order.
    fn list_live_keys(&self) -> Result<Vec<MessageKey>>;

    /// Keys of all messages whose bodies are cached locally, in
    /// backing-file order.
    fn list_cached_keys(&self) -> Result<Vec<MessageKey>>;

    /// Record for one message.
    fn header(&self, key: MessageKey) -> Result<MessageHeader>;

    /// Insert a fully formed record (used when rebuilding an index).
    fn adopt_header(&self, header: &MessageHeader) -> Result<()>;

    /// Copy `header` into `target`, preserving flags and properties.
    fn copy_header_into(&self, target: &dyn MetadataIndex, header: &MessageHeader) -> Result<()> {
        target.adopt_header(header)
    }

    /// Rewrite one record's location after its bytes moved.
    /// `token` is the new store token (decimal offset for mbox).
    fn set_offset_size(&self, key: MessageKey, offset: u64, size: u64, token: &str) -> Result<()>;

    /// Clear flag bits on one record.
    fn clear_flags(&self, key: MessageKey, flags: MessageFlags) -> Result<()>;

    /// Set or remove (empty value) a string property on one record.
    fn set_string_property(&self, key: MessageKey, name: &str, value: &str) -> Result<()>;

    /// Folder counter of dead bytes in the backing file.
    fn reclaimable_bytes(&self) -> u64;

    fn set_reclaimable_bytes(&self, bytes: u64) -> Result<()>;

    /// Folder-level attributes to carry across a rebuild.
    fn summary(&self) -> Result<FolderSummary>;

    fn apply_summary(&self, summary: &FolderSummary) -> Result<()>;

    /// False when the index is out of step with the backing file and must
    /// be re-derived before it is trusted again.
    fn is_valid(&self) -> bool;

    fn set_valid(&self, valid: bool) -> Result<()>;

    /// Bytes the index occupies on disk.
    fn size_on_disk(&self) -> u64;

    /// Number of live records.
    fn message_count(&self) -> u64;

    /// Flush all pending changes to disk.
    fn commit(&self) -> Result<()>;
}

/// Opens and creates metadata indexes on disk.
pub trait IndexStore: Send + Sync {
    /// The index path that belongs beside `data_path`.
    fn index_path_for(&self, data_path: &Path) -> PathBuf;

    /// Open the existing index at `path`.
    fn open(&self, path: &Path) -> Result<Arc<dyn MetadataIndex>>;

    /// Create a fresh, empty index at `path`, replacing any stale file.
    fn create(&self, path: &Path) -> Result<Arc<dyn MetadataIndex>>;
}
