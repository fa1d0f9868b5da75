/*
 * uri.rs
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

//! Folder and message URI scheme. Folder URLs use three slashes
//! (mbox:///absolute/path) with percent-encoded path segments; a message
//! URI is its folder URI plus `#<key>`.

use crate::store::MessageKey;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::Path;

/// Path segment safe set: encode everything except unreserved and sub-delims used in paths.
/// So we encode / ? # [ ] @ and space, %, etc.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'%')
    .add(b' ');

/// Percent-encode one path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Decode a percent-encoded path segment.
pub fn decode_segment(encoded: &str) -> String {
    percent_encoding::percent_decode_str(encoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Folder URL for an mbox data file: mbox:///path (three slashes),
/// each path segment percent-encoded.
pub fn mbox_folder_uri(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(encode_segment(&s.to_string_lossy())),
            _ => None,
        })
        .collect();
    format!("mbox:///{}", segments.join("/"))
}

/// Message URI: folder URI + "#" + decimal key.
pub fn message_uri(folder_uri: &str, key: MessageKey) -> String {
    format!("{}#{}", folder_uri, key)
}

/// Split a message URI back into its folder URI and key.
/// `None` when there is no fragment or the fragment is not a decimal key.
pub fn split_message_uri(uri: &str) -> Option<(&str, MessageKey)> {
    let (folder, fragment) = uri.rsplit_once('#')?;
    let raw: u64 = fragment.parse().ok()?;
    Some((folder, MessageKey(raw)))
}
