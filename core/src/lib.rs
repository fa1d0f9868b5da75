/*
 * lib.rs
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

//! Pressacarte core: mailbox compaction for the Tagliacarte email client.
//!
//! Compaction rewrites a folder's backing mbox file with only its live
//! messages, patches per-message status and keyword headers in transit,
//! then swaps the rebuilt files into place. Originals stay untouched
//! until the final renames. Port from gumdrop.

pub mod compact;
pub mod localstorage;
pub mod mbox;
pub mod store;
pub mod uri;
