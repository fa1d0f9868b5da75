/*
 * folder.rs
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

//! Folder trait: the compaction engine's view of one mail folder.
//!
//! Methods answer inline before they return, the convention for file-based
//! backends throughout Tagliacarte.

use crate::store::error::Result;
use crate::store::index::MetadataIndex;
use std::path::Path;
use std::sync::Arc;

/// Where a folder's canonical message bytes live.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum FolderStorage {
    /// The local backing file is the canonical store.
    Local,
    /// The backing file only caches copies of server-side messages.
    Replica,
}

/// One compactable folder: a backing data file plus its metadata index.
pub trait Folder: Send + Sync {
    /// Display name, used in status and log messages.
    fn name(&self) -> &str;

    /// The backing data file holding all message bytes.
    fn data_path(&self) -> &Path;

    /// Base URI messages in this folder are addressed under.
    fn base_message_uri(&self) -> &str;

    fn storage(&self) -> FolderStorage;

    /// Bytes the backing data file occupies.
    fn size_on_disk(&self) -> Result<u64>;

    /// Dead bytes a compaction would reclaim.
    fn reclaimable_bytes(&self) -> Result<u64>;

    /// This folder's metadata index.
    fn index(&self) -> Result<Arc<dyn MetadataIndex>>;

    /// Drop any cached index handle and reopen from disk (after a swap
    /// replaced the index file).
    fn refresh_index(&self) -> Result<Arc<dyn MetadataIndex>>;

    /// Take the folder's exclusive compaction lock.
    /// Fails with `FolderLocked` when another operation holds it.
    fn try_acquire_compaction_lock(&self) -> Result<()>;

    /// Release the compaction lock. Idempotent: safe when not held.
    fn release_compaction_lock(&self);
}
