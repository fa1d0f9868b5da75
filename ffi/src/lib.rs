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

//! C FFI for pressacarte core. Folders are identified by URI: registering
//! one returns a newly allocated URI string (free with
//! pressacarte_free_string), and later calls pass the URI back as the
//! handle. Compaction runs on a worker thread. All string parameters are
//! UTF-8 NUL-terminated.

use libc::{c_char, c_int, c_uint, c_void, size_t};
use pressacarte_core::compact::{BatchSummary, CancelFlag, CompactContext, FolderCompactor};
use pressacarte_core::localstorage::{FileIndexStore, LocalFolder, LocalStreamService};
use pressacarte_core::store::{
    CompactError, Folder, FolderStorage, MessageKey, ProgressSink, SystemSpace,
};
use pressacarte_core::uri::message_uri;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

/// Wrapper so *mut c_void can be moved into Send closures (e.g. thread::spawn). C callbacks are invoked from worker threads.
struct SendableUserData(*mut c_void);
unsafe impl Send for SendableUserData {}
unsafe impl Sync for SendableUserData {}

/// Callbacks for one compaction batch. They run on the batch's worker
/// thread; UI must marshal to main thread.
/// on_progress: percent (0..=100) through the folder currently copying.
/// on_status: one-line user-facing text; pointer valid only for the call.
/// on_done: completion code, total bytes reclaimed, last error message
/// (NULL on full success; pointer valid only for the call).
type OnCompactProgress = extern "C" fn(c_uint, *mut c_void);
type OnCompactStatus = extern "C" fn(*const c_char, *mut c_void);
type OnCompactDone = extern "C" fn(c_int, u64, *const c_char, *mut c_void);

/// Bridges core progress reports onto the C callbacks.
struct CallbackProgress {
    on_progress: Option<OnCompactProgress>,
    on_status: Option<OnCompactStatus>,
    user: Arc<SendableUserData>,
}

impl ProgressSink for CallbackProgress {
    fn report(&self, percent: u32) {
        if let Some(cb) = self.on_progress {
            (cb)(percent, self.user.0);
        }
    }

    fn report_status(&self, message: &str) {
        if let Some(cb) = self.on_status {
            let text = CString::new(message).unwrap_or_else(|_| CString::new("").unwrap());
            (cb)(text.as_ptr(), self.user.0);
        }
    }
}

/// Batch completed without error.
pub const PRESSACARTE_OK: c_int = 0;
/// Unclassified failure; the done callback's message has the detail.
pub const PRESSACARTE_ERR: c_int = -1;
/// Not enough free disk space to compact a folder safely.
pub const PRESSACARTE_ERR_DISK_SPACE: c_int = -2;
/// A folder's compaction lock was held by another operation.
pub const PRESSACARTE_ERR_FOLDER_LOCKED: c_int = -3;
/// The batch was canceled.
pub const PRESSACARTE_ERR_CANCELED: c_int = -4;

fn completion_code(err: &CompactError) -> c_int {
    match err {
        CompactError::DiskSpace { .. } => PRESSACARTE_ERR_DISK_SPACE,
        CompactError::FolderLocked { .. } => PRESSACARTE_ERR_FOLDER_LOCKED,
        CompactError::Canceled => PRESSACARTE_ERR_CANCELED,
        _ => PRESSACARTE_ERR,
    }
}

/// Storage kind for pressacarte_folder_open: the mbox file is the
/// canonical message store.
pub const PRESSACARTE_STORAGE_LOCAL: c_int = 0;
/// Storage kind for pressacarte_folder_open: the mbox file caches copies
/// of server-side messages.
pub const PRESSACARTE_STORAGE_REPLICA: c_int = 1;

/// Registry of folders keyed by folder URI, and running batch jobs keyed
/// by job id (for cancellation).
struct Registry {
    folders: RwLock<HashMap<String, Arc<LocalFolder>>>,
    jobs: RwLock<HashMap<u64, CancelFlag>>,
    job_counter: AtomicU64,
}

fn registry() -> &'static Registry {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    REGISTRY.get_or_init(|| Registry {
        folders: RwLock::new(HashMap::new()),
        jobs: RwLock::new(HashMap::new()),
        job_counter: AtomicU64::new(0),
    })
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

fn lookup_folder(uri: &str) -> Option<Arc<LocalFolder>> {
    registry().folders.read().ok().and_then(|g| g.get(uri).cloned())
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = std::cell::RefCell::new(None);
}

fn set_last_error(err: &CompactError) {
    let msg = CString::new(err.to_string()).unwrap_or_else(|_| CString::new("(error)").unwrap());
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn pressacarte_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message from a failed call on this thread. Valid until the
/// next FFI call. Do not free. Asynchronous batch failures are reported
/// through the done callback instead.
#[no_mangle]
pub extern "C" fn pressacarte_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string returned by pressacarte_folder_open or
/// pressacarte_message_uri. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn pressacarte_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

// ---------- Folders ----------

/// Register the mbox folder whose data file lives at path (the file may
/// not exist yet). kind: PRESSACARTE_STORAGE_*. Returns the folder URI
/// (caller frees with pressacarte_free_string), or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pressacarte_folder_open(path: *const c_char, kind: c_int) -> *mut c_char {
    let path = match ptr_to_str(path) {
        Some(s) => s,
        None => {
            set_last_error(&CompactError::new("path is null or not valid UTF-8"));
            return ptr::null_mut();
        }
    };
    let storage = match kind {
        PRESSACARTE_STORAGE_LOCAL => FolderStorage::Local,
        PRESSACARTE_STORAGE_REPLICA => FolderStorage::Replica,
        _ => {
            set_last_error(&CompactError::new("unknown storage kind"));
            return ptr::null_mut();
        }
    };
    let folder = Arc::new(LocalFolder::open(Path::new(&path), storage));
    let uri = folder.base_message_uri().to_string();
    if let Ok(mut guard) = registry().folders.write() {
        guard.insert(uri.clone(), folder);
    }
    clear_last_error();
    CString::new(uri)
        .unwrap_or_else(|_| CString::new("").unwrap())
        .into_raw()
}

/// Drop a registered folder. A batch already running on it is unaffected.
/// No-op when the URI is unknown.
#[no_mangle]
pub unsafe extern "C" fn pressacarte_folder_close(folder_uri: *const c_char) {
    if let Some(uri) = ptr_to_str(folder_uri) {
        if let Ok(mut guard) = registry().folders.write() {
            guard.remove(&uri);
        }
    }
}

/// Bytes a compaction of the folder would reclaim right now, or -1 on
/// error (unknown folder, unreadable index).
#[no_mangle]
pub unsafe extern "C" fn pressacarte_folder_reclaimable(folder_uri: *const c_char) -> i64 {
    let uri = match ptr_to_str(folder_uri) {
        Some(s) => s,
        None => {
            set_last_error(&CompactError::new("folder_uri is null or not valid UTF-8"));
            return -1;
        }
    };
    let folder = match lookup_folder(&uri) {
        Some(f) => f,
        None => {
            set_last_error(&CompactError::new("folder not found"));
            return -1;
        }
    };
    match folder.reclaimable_bytes() {
        Ok(bytes) => {
            clear_last_error();
            bytes.min(i64::MAX as u64) as i64
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Message URI for a key inside a folder: folder URI + "#" + decimal key.
/// Keys are stable across compaction, so these addresses survive it.
/// Returns a new string (caller frees with pressacarte_free_string), or
/// NULL if folder_uri is NULL or not UTF-8.
#[no_mangle]
pub unsafe extern "C" fn pressacarte_message_uri(
    folder_uri: *const c_char,
    key: u64,
) -> *mut c_char {
    match ptr_to_str(folder_uri) {
        Some(uri) => CString::new(message_uri(&uri, MessageKey(key)))
            .unwrap_or_else(|_| CString::new("").unwrap())
            .into_raw(),
        None => ptr::null_mut(),
    }
}

// ---------- Compaction ----------

/// Compact a batch of registered folders, in order, on a worker thread.
/// folder_uris: array of n URI strings from pressacarte_folder_open.
/// on_progress and on_status may be NULL. on_done fires exactly once,
/// also after cancellation. Returns a job id for
/// pressacarte_compact_cancel, or 0 on error (no callbacks fire).
#[no_mangle]
pub unsafe extern "C" fn pressacarte_compact(
    folder_uris: *const *const c_char,
    n: size_t,
    on_progress: Option<OnCompactProgress>,
    on_status: Option<OnCompactStatus>,
    on_done: OnCompactDone,
    user_data: *mut c_void,
) -> u64 {
    let mut folders: Vec<Arc<dyn Folder>> = Vec::with_capacity(n);
    if n > 0 {
        if folder_uris.is_null() {
            set_last_error(&CompactError::new("folder_uris is null"));
            return 0;
        }
        for &raw in std::slice::from_raw_parts(folder_uris, n) {
            let uri = match ptr_to_str(raw) {
                Some(s) => s,
                None => {
                    set_last_error(&CompactError::new("folder URI is null or not valid UTF-8"));
                    return 0;
                }
            };
            match lookup_folder(&uri) {
                Some(f) => folders.push(f),
                None => {
                    set_last_error(&CompactError::new("folder not found"));
                    return 0;
                }
            }
        }
    }
    let user = Arc::new(SendableUserData(user_data));
    let cancel = CancelFlag::new();
    let job = registry().job_counter.fetch_add(1, Ordering::Relaxed) + 1;
    if let Ok(mut guard) = registry().jobs.write() {
        guard.insert(job, cancel.clone());
    }
    thread::spawn(move || {
        let ctx = CompactContext {
            stream: Arc::new(LocalStreamService),
            indexes: Arc::new(FileIndexStore),
            space: Arc::new(SystemSpace),
            progress: Arc::new(CallbackProgress {
                on_progress,
                on_status,
                user: user.clone(),
            }),
        };
        let done_user = user.clone();
        FolderCompactor::new(ctx).compact_folders(
            &folders,
            &cancel,
            Box::new(move |summary: BatchSummary| {
                let code = match &summary.last_error {
                    None => PRESSACARTE_OK,
                    Some(e) => completion_code(e),
                };
                let message = summary.last_error.as_ref().map(|e| {
                    CString::new(e.to_string())
                        .unwrap_or_else(|_| CString::new("(error)").unwrap())
                });
                let message_ptr = message
                    .as_ref()
                    .map(|m| m.as_ptr())
                    .unwrap_or(ptr::null());
                (on_done)(code, summary.reclaimed_bytes, message_ptr, done_user.0);
            }),
        );
        if let Ok(mut guard) = registry().jobs.write() {
            guard.remove(&job);
        }
    });
    clear_last_error();
    job
}

/// Request cancellation of a running batch. The job stops at the next
/// message boundary and its done callback still fires. No-op for unknown
/// or finished jobs.
#[no_mangle]
pub extern "C" fn pressacarte_compact_cancel(job: u64) {
    if let Some(cancel) = registry().jobs.read().ok().and_then(|g| g.get(&job).cloned()) {
        cancel.cancel();
    }
}
