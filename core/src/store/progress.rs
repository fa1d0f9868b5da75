/*
 * progress.rs
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

//! Progress reporting.

/// Receives coarse progress and advisory status text from running jobs.
/// Both methods default to doing nothing.
pub trait ProgressSink: Send + Sync {
    /// Percent complete for the current folder, 0..=100.
    fn report(&self, _percent: u32) {}

    /// Human-readable advisory (per-folder status, admission refusals).
    fn report_status(&self, _message: &str) {}
}

/// Sink that drops everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {}
