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

//! Local mbox folders: one data file per folder, with a line-based
//! metadata index kept beside it. Port from gumdrop.

mod index;

pub use index::{FileIndex, FileIndexStore};

use crate::store::{
    CompactError, CopyStreamHandler, Folder, FolderStorage, IndexStore, MessageFlags, MessageKey,
    MessageStreamService, MetadataIndex, Result,
};
use crate::uri;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Read granularity when streaming message bytes out of a data file.
const CHUNK: usize = 16 * 1024;

/// One folder backed by an mbox file on local disk.
///
/// The metadata index is opened lazily from the sibling `.idx` file and
/// cached until `refresh_index` replaces it.
pub struct LocalFolder {
    name: String,
    path: PathBuf,
    base_uri: String,
    storage: FolderStorage,
    index: Mutex<Option<Arc<dyn MetadataIndex>>>,
    lock: AtomicBool,
}

impl LocalFolder {
    /// A folder whose backing mbox file lives at `path`.
    /// The file itself may not exist yet.
    pub fn open(path: &Path, storage: FolderStorage) -> LocalFolder {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "(folder)".to_string());
        let base_uri = uri::mbox_folder_uri(path);
        LocalFolder {
            name,
            path: path.to_path_buf(),
            base_uri,
            storage,
            index: Mutex::new(None),
            lock: AtomicBool::new(false),
        }
    }

    fn open_index(&self) -> Result<Arc<dyn MetadataIndex>> {
        let store = FileIndexStore;
        store.open(&store.index_path_for(&self.path))
    }
}

impl Folder for LocalFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_path(&self) -> &Path {
        &self.path
    }

    fn base_message_uri(&self) -> &str {
        &self.base_uri
    }

    fn storage(&self) -> FolderStorage {
        self.storage
    }

    fn size_on_disk(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn reclaimable_bytes(&self) -> Result<u64> {
        Ok(self.index()?.reclaimable_bytes())
    }

    fn index(&self) -> Result<Arc<dyn MetadataIndex>> {
        let mut cached = self
            .index
            .lock()
            .map_err(|e| CompactError::new(e.to_string()))?;
        if let Some(index) = cached.as_ref() {
            return Ok(index.clone());
        }
        let index = self.open_index()?;
        *cached = Some(index.clone());
        Ok(index)
    }

    fn refresh_index(&self) -> Result<Arc<dyn MetadataIndex>> {
        let mut cached = self
            .index
            .lock()
            .map_err(|e| CompactError::new(e.to_string()))?;
        let index = self.open_index()?;
        *cached = Some(index.clone());
        Ok(index)
    }

    fn try_acquire_compaction_lock(&self) -> Result<()> {
        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(())
        } else {
            Err(CompactError::FolderLocked {
                folder: self.name.clone(),
            })
        }
    }

    fn release_compaction_lock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

/// Streams message ranges straight out of local mbox files.
pub struct LocalStreamService;

impl LocalStreamService {
    fn stream_range(
        file: &mut File,
        offset: u64,
        size: u64,
        handler: &mut dyn CopyStreamHandler,
    ) -> Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; CHUNK];
        let mut left = size;
        while left > 0 {
            let take = left.min(CHUNK as u64) as usize;
            file.read_exact(&mut buf[..take])?;
            handler.message_data(&buf[..take])?;
            left -= take as u64;
        }
        Ok(())
    }
}

impl MessageStreamService for LocalStreamService {
    fn copy_messages(
        &self,
        folder: &dyn Folder,
        keys: &[MessageKey],
        handler: &mut dyn CopyStreamHandler,
    ) -> Result<()> {
        let index = folder.index()?;
        let mut file = File::open(folder.data_path())?;
        for &key in keys {
            let header = index.header(key)?;
            handler.start_message(key)?;
            Self::stream_range(&mut file, header.offset, header.size, handler)?;
            handler.end_message(key)?;
        }
        Ok(())
    }

    fn stream_message(
        &self,
        folder: &dyn Folder,
        key: MessageKey,
        handler: &mut dyn CopyStreamHandler,
    ) -> Result<()> {
        let index = folder.index()?;
        let header = index.header(key)?;
        if !header.flags.contains(MessageFlags::CACHED) {
            return Err(CompactError::NotCached { key });
        }
        let mut file = File::open(folder.data_path())?;
        handler.start_message(key)?;
        Self::stream_range(&mut file, header.offset, header.size, handler)?;
        handler.end_message(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageHeader;
    use std::io::Write;

    #[derive(Default)]
    struct Collector {
        events: Vec<String>,
        data: Vec<u8>,
    }

    impl CopyStreamHandler for Collector {
        fn start_message(&mut self, key: MessageKey) -> Result<()> {
            self.events.push(format!("start {}", key));
            Ok(())
        }

        fn message_data(&mut self, data: &[u8]) -> Result<()> {
            self.data.extend_from_slice(data);
            Ok(())
        }

        fn end_message(&mut self, key: MessageKey) -> Result<()> {
            self.events.push(format!("end {}", key));
            Ok(())
        }
    }

    fn folder_with_messages(
        dir: &Path,
        messages: &[(u64, &[u8], MessageFlags)],
    ) -> Result<LocalFolder> {
        let data_path = dir.join("inbox");
        let mut file = File::create(&data_path)?;
        let store = FileIndexStore;
        let index = store.create(&store.index_path_for(&data_path))?;
        for &(raw, body, flags) in messages {
            let mut header = MessageHeader::new(MessageKey(raw));
            header.offset = file.stream_position()?;
            header.size = body.len() as u64;
            header.flags = flags;
            index.adopt_header(&header)?;
            file.write_all(body)?;
            file.write_all(crate::mbox::LINEBREAK)?;
        }
        index.commit()?;
        Ok(LocalFolder::open(&data_path, FolderStorage::Local))
    }

    #[test]
    fn streams_listed_keys_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder_with_messages(
            dir.path(),
            &[
                (1, b"From a\r\nSubject: one\r\n\r\nbody one", MessageFlags::empty()),
                (2, b"From b\r\nSubject: two\r\n\r\nbody two", MessageFlags::empty()),
            ],
        )
        .unwrap();

        let mut out = Collector::default();
        let keys = [MessageKey(2), MessageKey(1)];
        LocalStreamService
            .copy_messages(&folder, &keys, &mut out)
            .unwrap();
        assert_eq!(out.events, ["start 2", "end 2", "start 1", "end 1"]);
        assert!(out.data.starts_with(b"From b"));
        assert!(out.data.ends_with(b"body one"));
    }

    #[test]
    fn stream_message_requires_a_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder_with_messages(
            dir.path(),
            &[
                (1, b"From a\r\n\r\nhere", MessageFlags::CACHED),
                (2, b"From b\r\n\r\ngone", MessageFlags::empty()),
            ],
        )
        .unwrap();

        let mut out = Collector::default();
        LocalStreamService
            .stream_message(&folder, MessageKey(1), &mut out)
            .unwrap();
        assert_eq!(out.data, b"From a\r\n\r\nhere");

        let err = LocalStreamService
            .stream_message(&folder, MessageKey(2), &mut Collector::default())
            .unwrap_err();
        assert!(matches!(err, CompactError::NotCached { key } if key == MessageKey(2)));
    }

    #[test]
    fn missing_data_file_has_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::open(&dir.path().join("absent"), FolderStorage::Local);
        assert_eq!(folder.size_on_disk().unwrap(), 0);
    }

    #[test]
    fn compaction_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::open(&dir.path().join("inbox"), FolderStorage::Local);
        folder.try_acquire_compaction_lock().unwrap();
        assert!(matches!(
            folder.try_acquire_compaction_lock(),
            Err(CompactError::FolderLocked { .. })
        ));
        folder.release_compaction_lock();
        folder.try_acquire_compaction_lock().unwrap();
    }

    #[test]
    fn refresh_index_drops_the_cached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder_with_messages(
            dir.path(),
            &[(7, b"From a\r\n\r\nx", MessageFlags::empty())],
        )
        .unwrap();

        let before = folder.index().unwrap();
        assert_eq!(before.message_count(), 1);

        // Rewrite the index file behind the cached handle's back.
        let store = FileIndexStore;
        let fresh = store
            .create(&store.index_path_for(folder.data_path()))
            .unwrap();
        fresh.commit().unwrap();

        assert_eq!(folder.index().unwrap().message_count(), 1);
        assert_eq!(folder.refresh_index().unwrap().message_count(), 0);
        assert_eq!(folder.index().unwrap().message_count(), 0);
    }
}
