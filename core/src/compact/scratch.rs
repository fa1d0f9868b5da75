/*
 * scratch.rs
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

//! Scratch files and the final swap.

use crate::store::{CompactError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Base name for scratch files created beside the target.
const SCRATCH_BASE: &str = "comptmp";

/// A uniquely named scratch file in the target's directory, open for
/// buffered writing. Mode 0600 on unix.
pub struct ScratchFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ScratchFile {
    /// Create `comptmp` (or `comptmp-1`, ...) beside `target`.
    pub fn create_beside(target: &Path) -> Result<Self> {
        let dir = target
            .parent()
            .ok_or_else(|| CompactError::new("target has no parent directory"))?;
        let (path, file) = create_unique(dir, SCRATCH_BASE)?;
        debug!(scratch = %path.display(), "created scratch file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    /// Flush, sync and close, returning the path and the on-disk size.
    pub fn close(mut self) -> Result<(PathBuf, u64)> {
        use std::io::Write;
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        let len = file.metadata()?.len();
        Ok((self.path, len))
    }

    /// Drop everything written past `offset`, leaving the write position
    /// there (after a partial message copy).
    pub fn truncate_to(&mut self, offset: u64) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.writer.flush()?;
        self.writer.get_ref().set_len(offset)?;
        self.writer.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Remove the scratch file without committing anything.
    pub fn discard(self) {
        let path = self.path.clone();
        drop(self.writer);
        let _ = fs::remove_file(&path);
    }
}

/// Create a new file under `dir` named `base` or `base-N`, taking the
/// first name not already in use. `create_new` loses a name race rather
/// than truncating whatever won it.
fn create_unique(dir: &Path, base: &str) -> Result<(PathBuf, File)> {
    for attempt in 0..1000 {
        let name = if attempt == 0 {
            base.to_string()
        } else {
            format!("{}-{}", base, attempt)
        };
        let path = dir.join(name);
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(CompactError::new(format!(
        "no free scratch name under {}",
        dir.display()
    )))
}

/// Reserve a fresh sibling name for moving a live file aside.
fn reserve_sibling(path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| CompactError::new("path has no parent directory"))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CompactError::new("path has no usable file name"))?;
    let (aside, file) = create_unique(dir, &format!("{}.old", name))?;
    drop(file);
    Ok(aside)
}

/// Swap a compacted data file and its freshly built index over the
/// originals.
///
/// The old index is moved aside first so data and index stay in step: if
/// the data rename fails the old index is restored and nothing changed; if
/// the index rename fails after the data already swapped, the old index is
/// restored beside the new data file and the caller must mark it invalid
/// so the folder re-derives it.
pub fn commit_folder_swap(
    scratch_data: &Path,
    scratch_index: &Path,
    data_target: &Path,
    index_target: &Path,
) -> Result<()> {
    let aside = reserve_sibling(index_target)?;
    if let Err(e) = fs::rename(index_target, &aside) {
        let _ = fs::remove_file(&aside);
        return Err(CompactError::SwapFailed {
            path: index_target.to_path_buf(),
            source: e,
        });
    }

    if let Err(e) = fs::rename(scratch_data, data_target) {
        warn!(target = %data_target.display(), "data rename failed, restoring index");
        if fs::rename(&aside, index_target).is_err() {
            warn!(index = %index_target.display(), "could not restore the folder index");
            let _ = fs::remove_file(&aside);
        }
        return Err(CompactError::SwapFailed {
            path: data_target.to_path_buf(),
            source: e,
        });
    }

    if let Err(e) = fs::rename(scratch_index, index_target) {
        warn!(target = %index_target.display(), "index rename failed, restoring old index");
        if fs::rename(&aside, index_target).is_err() {
            warn!(index = %index_target.display(), "could not restore the folder index");
            let _ = fs::remove_file(&aside);
        }
        return Err(CompactError::SwapFailed {
            path: index_target.to_path_buf(),
            source: e,
        });
    }

    let _ = fs::remove_file(&aside);
    debug!(data = %data_target.display(), "swapped compacted folder into place");
    Ok(())
}

/// Replace `target` with the compacted `scratch`: remove the original,
/// then rename the scratch into its place. No index file is involved.
pub fn commit_data_swap(scratch: &Path, target: &Path) -> Result<()> {
    if let Err(e) = fs::remove_file(target) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(CompactError::SwapFailed {
                path: target.to_path_buf(),
                source: e,
            });
        }
    }
    fs::rename(scratch, target).map_err(|e| CompactError::SwapFailed {
        path: target.to_path_buf(),
        source: e,
    })?;
    debug!(data = %target.display(), "swapped compacted replica into place");
    Ok(())
}
