/*
 * space.rs
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

//! Free-disk-space queries.

use crate::store::error::Result;
use std::path::Path;

#[cfg(not(unix))]
use crate::store::error::CompactError;

/// Answers how much free space a path's filesystem has.
pub trait SpaceQuery: Send + Sync {
    /// Free bytes available to unprivileged writes at `path`.
    /// Fails with `Unsupported` when the platform cannot answer.
    fn free_space(&self, path: &Path) -> Result<u64>;
}

/// Platform query via statvfs.
pub struct SystemSpace;

impl SpaceQuery for SystemSpace {
    #[cfg(unix)]
    fn free_space(&self, path: &Path) -> Result<u64> {
        use crate::store::error::CompactError;
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| CompactError::new("path contains a NUL byte"))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    #[cfg(not(unix))]
    fn free_space(&self, _path: &Path) -> Result<u64> {
        Err(CompactError::Unsupported)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_space_for_tmp() {
        let free = SystemSpace.free_space(Path::new("/tmp"));
        assert!(free.is_ok());
    }
}
