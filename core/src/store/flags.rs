/*
 * flags.rs
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

//! Message status flags.

use bitflags::bitflags;

bitflags! {
    /// Per-message status bits.
    ///
    /// The low 16 bits are persisted in a message's first status line, bits
    /// 16..32 in the second. Bits outside the 32-bit word would not survive
    /// the status lines and are not defined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u32 {
        /// Message has been read.
        const SEEN       = 0x0001;
        /// Message has been replied to.
        const ANSWERED   = 0x0002;
        /// Message is starred.
        const FLAGGED    = 0x0004;
        /// Message is deleted but its bytes still occupy the backing file.
        const EXPUNGED   = 0x0008;
        /// Message body is cached in the local replica of a server folder.
        const CACHED     = 0x0080;
        /// Message has been forwarded.
        const FORWARDED  = 0x1000;
        /// Message arrived since the folder was last opened.
        const NEW        = 0x0001_0000;
        /// Thread is ignored.
        const IGNORED    = 0x0004_0000;
        /// Message has attachments.
        const ATTACHMENT = 0x1000_0000;
    }
}

impl MessageFlags {
    /// Low word, as persisted in the first status line.
    pub fn status_word(self) -> u16 {
        (self.bits() & 0xffff) as u16
    }

    /// High half of the flag word, as persisted in the second status line
    /// (low word zeroed).
    pub fn status2_word(self) -> u32 {
        self.bits() & 0xffff_0000
    }
}
