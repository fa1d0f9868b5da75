/*
 * error.rs
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

//! Compaction and store errors.

use crate::store::key::MessageKey;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CompactError>;

/// Errors from compaction jobs and the store collaborators they drive.
#[derive(Debug, Error)]
pub enum CompactError {
    /// Generic error message from a collaborator.
    #[error("{0}")]
    Message(String),
    /// Not enough free disk space to compact the folder safely.
    #[error("not enough free disk space to compact '{folder}'")]
    DiskSpace { folder: String },
    /// Another operation holds the folder's compaction lock.
    #[error("folder '{folder}' is locked by another operation")]
    FolderLocked { folder: String },
    /// The metadata index has no record for the key.
    #[error("no index record for message key {0}")]
    UnknownKey(MessageKey),
    /// The message has no locally cached copy to stream.
    #[error("message {key} has no local copy")]
    NotCached { key: MessageKey },
    /// The scratch file's size disagrees with the byte total written to it.
    #[error("scratch file holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    /// A rename step of the final swap failed; originals restored where possible.
    #[error("swap failed at {}: {}", .path.display(), .source)]
    SwapFailed { path: PathBuf, source: io::Error },
    /// The job observed a cancellation request at a message boundary.
    #[error("compaction canceled")]
    Canceled,
    /// The platform cannot answer the query.
    #[error("not supported on this platform")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CompactError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Refusals the batch driver surfaces as a once-per-batch advisory.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::DiskSpace { .. } | Self::FolderLocked { .. })
    }
}
