/*
 * header.rs
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

//! Per-message metadata records.

use crate::store::flags::MessageFlags;
use crate::store::key::MessageKey;
use std::collections::HashMap;

/// Well-known string property names.
pub mod props {
    /// Locates the message inside the backing file; decimal byte offset for mbox.
    pub const STORE_TOKEN: &str = "storeToken";
    /// Non-empty while a cached copy awaits discard by the next compaction.
    pub const PENDING_REMOVAL: &str = "pendingRemoval";
    /// Non-zero when the keyword block must be rewritten on the next compaction.
    pub const GROW_KEYWORDS: &str = "growKeywords";
    /// Space-separated keyword list persisted in the keyword block.
    pub const KEYWORDS: &str = "keywords";
}

/// One message's record in a folder's metadata index.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    pub key: MessageKey,
    /// Byte offset of the message (its envelope line) in the backing file.
    pub offset: u64,
    /// Byte size of the message in the backing file.
    pub size: u64,
    /// Offset of the first status line relative to the message start;
    /// 0 when no status line has ever been written.
    pub status_offset: u32,
    pub flags: MessageFlags,
    props: HashMap<String, String>,
}

impl MessageHeader {
    pub fn new(key: MessageKey) -> Self {
        Self {
            key,
            offset: 0,
            size: 0,
            status_offset: 0,
            flags: MessageFlags::empty(),
            props: HashMap::new(),
        }
    }

    /// Free-form string property; `None` when unset or empty.
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.props
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set_string_property(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.props.remove(name);
        } else {
            self.props.insert(name.to_string(), value.to_string());
        }
    }

    /// Remove a property. Absent and empty read back the same.
    pub fn clear_string_property(&mut self, name: &str) {
        self.props.remove(name);
    }

    /// Numeric property stored as its decimal string.
    pub fn u32_property(&self, name: &str) -> Option<u32> {
        self.string_property(name).and_then(|v| v.parse().ok())
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
