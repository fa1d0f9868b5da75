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

//! mbox container helpers: From_ boundaries, status and keyword headers.
//! Port from gumdrop.

mod patch;

pub use patch::HeaderPatcher;

use crate::store::{MessageFlags, Result};
use chrono::Local;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Record separator written after each message.
#[cfg(windows)]
pub const LINEBREAK: &[u8] = b"\r\n";
#[cfg(not(windows))]
pub const LINEBREAK: &[u8] = b"\n";

#[cfg(windows)]
const LINEBREAK_STR: &str = "\r\n";
#[cfg(not(windows))]
const LINEBREAK_STR: &str = "\n";

/// First status header: low 16 flag bits as four hex digits.
pub const STATUS_HEADER: &str = "X-Gumdrop-Status:";
/// Second status header: bits 16..32 as eight hex digits (low word zero).
pub const STATUS2_HEADER: &str = "X-Gumdrop-Status2:";
/// Keyword header name.
pub const KEYWORDS_HEADER: &str = "X-Gumdrop-Keys";

/// Blank space reserved after `X-Gumdrop-Keys: ` so keywords can be
/// edited in place without rewriting the whole file.
pub(crate) const KEYWORD_PADDING: usize = 80;
/// Longest run of keyword text per line when a grown block is rewritten.
pub(crate) const KEYWORD_WRAP: usize = 90;

/// True when `data` starts with an mbox envelope ("From ") line.
pub fn is_envelope_line(data: &[u8]) -> bool {
    data.starts_with(b"From ")
}

/// Envelope line for a message that never had one, postmarked with the
/// current local time in asctime layout.
pub fn postmark_line() -> Vec<u8> {
    let date = Local::now().format("%a %b %e %H:%M:%S %Y");
    let mut line = format!("From - {}", date).into_bytes();
    line.extend_from_slice(LINEBREAK);
    line
}

/// Index just past the line ending that terminates the line containing
/// `from`. Returns `buf.len()` when no terminator follows.
pub fn next_line_start(buf: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < buf.len() {
        match buf[i] {
            b'\n' => return i + 1,
            b'\r' => {
                return if buf.get(i + 1) == Some(&b'\n') {
                    i + 2
                } else {
                    i + 1
                };
            }
            _ => i += 1,
        }
    }
    buf.len()
}

/// First status line for `flags`, with trailing linebreak.
pub fn status_line(flags: MessageFlags) -> Vec<u8> {
    let mut line = format!("{} {:04x}", STATUS_HEADER, flags.status_word()).into_bytes();
    line.extend_from_slice(LINEBREAK);
    line
}

/// Second status line for `flags`, with trailing linebreak.
pub fn status2_line(flags: MessageFlags) -> Vec<u8> {
    let mut line = format!("{} {:08x}", STATUS2_HEADER, flags.status2_word()).into_bytes();
    line.extend_from_slice(LINEBREAK);
    line
}

/// Keyword header with its full blank padding and no keywords.
pub fn blank_keywords_header() -> Vec<u8> {
    let mut line = format!("{}: ", KEYWORDS_HEADER).into_bytes();
    line.resize(line.len() + KEYWORD_PADDING, b' ');
    line.extend_from_slice(LINEBREAK);
    line
}

/// Blank continuation line reserved beneath a rewritten keyword block
/// (leading fold space plus the padding width).
pub(crate) fn blank_continuation() -> Vec<u8> {
    let mut line = vec![b' '; 1 + KEYWORD_PADDING];
    line.extend_from_slice(LINEBREAK);
    line
}

/// Keyword header block for a message that has none yet: the blank padded
/// form, the padding-embedded form when `keywords` fit, or one full line
/// plus a blank continuation when they do not.
pub fn keywords_header_block(keywords: &str) -> Vec<u8> {
    if keywords.is_empty() {
        return blank_keywords_header();
    }
    if keywords.len() <= KEYWORD_PADDING {
        let mut line = format!("{}: {}", KEYWORDS_HEADER, keywords).into_bytes();
        line.resize(line.len() + (KEYWORD_PADDING - keywords.len()), b' ');
        line.extend_from_slice(LINEBREAK);
        line
    } else {
        let mut block = format!("{}: {}", KEYWORDS_HEADER, keywords).into_bytes();
        block.extend_from_slice(LINEBREAK);
        block.extend_from_slice(&blank_continuation());
        block
    }
}

/// Rewritten keyword block for a grown keyword set: keyword text wrapped
/// across folded lines, then one blank continuation of padding.
pub fn wrapped_keywords_block(keywords: &str) -> Vec<u8> {
    let mut block = Vec::new();
    let mut line = format!("{}: ", KEYWORDS_HEADER);
    let mut text_len = 0;
    for word in keywords.split_whitespace() {
        let added = if text_len == 0 { word.len() } else { word.len() + 1 };
        if text_len > 0 && text_len + added > KEYWORD_WRAP {
            line.push_str(LINEBREAK_STR);
            block.extend_from_slice(line.as_bytes());
            line = String::from(" ");
            text_len = 0;
        }
        if text_len > 0 {
            line.push(' ');
            text_len += 1;
        }
        line.push_str(word);
        text_len += word.len();
    }
    line.push_str(LINEBREAK_STR);
    block.extend_from_slice(line.as_bytes());
    block.extend_from_slice(&blank_continuation());
    block
}

/// Offsets of each message in an mbox file: (envelope-line start, end),
/// end exclusive.
pub fn scan_messages(path: &Path) -> Result<Vec<(u64, u64)>> {
    let f = File::open(path)?;
    let mut r = BufReader::new(f);
    let mut offsets = Vec::new();
    let mut line = Vec::new();
    let mut current_start: Option<u64> = None;
    let mut pos: u64 = 0;

    loop {
        line.clear();
        let n = r.read_until(b'\n', &mut line)?;
        if n == 0 {
            if let Some(start) = current_start {
                offsets.push((start, pos));
            }
            break;
        }
        if line.starts_with(b"From ") {
            if let Some(start) = current_start {
                offsets.push((start, pos));
            }
            current_start = Some(pos);
        }
        pos += n as u64;
    }

    Ok(offsets)
}
