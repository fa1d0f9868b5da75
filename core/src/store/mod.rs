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

//! Store abstraction: the collaborator traits and types compaction
//! runs against.

mod error;
mod flags;
mod folder;
mod header;
mod index;
mod key;
mod progress;
mod space;
mod stream;

pub use error::{CompactError, Result};
pub use flags::MessageFlags;
pub use folder::{Folder, FolderStorage};
pub use header::{props, MessageHeader};
pub use index::{FolderSummary, IndexStore, MetadataIndex};
pub use key::MessageKey;
pub use progress::{NullProgress, ProgressSink};
pub use space::{SpaceQuery, SystemSpace};
pub use stream::{CopyStreamHandler, MessageStreamService};
