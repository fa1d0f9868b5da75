/*
 * stream.rs
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

//! Message streaming: push-model copy events.

use crate::store::error::Result;
use crate::store::folder::Folder;
use crate::store::key::MessageKey;

/// Receives a folder's raw message bytes as ordered push events.
///
/// An error from any method stops the stream and propagates out of the
/// driving call.
pub trait CopyStreamHandler {
    /// A message is about to stream.
    fn start_message(&mut self, key: MessageKey) -> Result<()>;

    /// The next chunk of the current message's bytes.
    fn message_data(&mut self, data: &[u8]) -> Result<()>;

    /// The current message finished streaming.
    fn end_message(&mut self, key: MessageKey) -> Result<()>;
}

/// Streams raw message bytes out of a folder's store.
pub trait MessageStreamService: Send + Sync {
    /// Stream every message in `keys`, in the given order, into `handler`.
    /// Stops at the first error, whether from the store or the handler.
    fn copy_messages(
        &self,
        folder: &dyn Folder,
        keys: &[MessageKey],
        handler: &mut dyn CopyStreamHandler,
    ) -> Result<()>;

    /// Stream a single message into `handler`.
    /// Fails with `NotCached` when the folder holds no local copy of it.
    fn stream_message(
        &self,
        folder: &dyn Folder,
        key: MessageKey,
        handler: &mut dyn CopyStreamHandler,
    ) -> Result<()>;
}
