/*
 * index.rs
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

//! Line-based metadata index file (.idx) for local folders.

use crate::store::{
    CompactError, FolderSummary, IndexStore, MessageFlags, MessageHeader, MessageKey,
    MetadataIndex, Result,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const HEADER: &str = "# pressacarte-index v1";

/// Property values are percent-encoded so one line stays one record.
const VALUE_ENCODE: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, VALUE_ENCODE).to_string()
}

fn decode_value(encoded: &str) -> String {
    percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<MessageKey, MessageHeader>,
    summary: FolderSummary,
    valid: bool,
    reclaimable: u64,
    dirty: bool,
}

/// Metadata index persisted as one record per line, loaded whole and
/// written back atomically (temp file, then rename).
#[derive(Debug)]
pub struct FileIndex {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileIndex {
    /// Open the index at `path`. A missing or unrecognized file reads as
    /// empty and invalid: the folder must derive a fresh index first.
    pub fn open(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::with_inner(path, Inner::default()));
            }
            Err(e) => return Err(e.into()),
        };
        let inner = parse(BufReader::new(file))?;
        Ok(Self::with_inner(path, inner))
    }

    /// A fresh, empty, valid index that will be written at `path` on the
    /// first commit.
    pub fn create(path: &Path) -> Self {
        Self::with_inner(
            path,
            Inner {
                valid: true,
                dirty: true,
                ..Inner::default()
            },
        )
    }

    fn with_inner(path: &Path, inner: Inner) -> Self {
        Self {
            path: path.to_path_buf(),
            inner: Mutex::new(inner),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| CompactError::new(e.to_string()))
    }

    fn list_keys(&self, want: impl Fn(&MessageHeader) -> bool) -> Result<Vec<MessageKey>> {
        let inner = self.inner()?;
        let mut headers: Vec<_> = inner.records.values().filter(|h| want(h)).collect();
        headers.sort_by_key(|h| (h.offset, h.key));
        Ok(headers.iter().map(|h| h.key).collect())
    }

    fn update<R>(&self, key: MessageKey, apply: impl FnOnce(&mut MessageHeader) -> R) -> Result<R> {
        let mut inner = self.inner()?;
        let record = inner
            .records
            .get_mut(&key)
            .ok_or(CompactError::UnknownKey(key))?;
        let out = apply(record);
        inner.dirty = true;
        Ok(out)
    }

    fn save(&self, inner: &Inner) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut w = BufWriter::new(File::create(&tmp)?);
        writeln!(w, "{}", HEADER)?;
        writeln!(w, "valid {}", if inner.valid { 1 } else { 0 })?;
        writeln!(w, "reclaimable {}", inner.reclaimable)?;
        for (name, value) in &inner.summary.properties {
            writeln!(w, "fprop {} {}", name, encode_value(value))?;
        }
        let mut records: Vec<_> = inner.records.values().collect();
        records.sort_by_key(|h| (h.offset, h.key));
        for header in records {
            writeln!(
                w,
                "msg {} {} {} {} {:08x}",
                header.key,
                header.offset,
                header.size,
                header.status_offset,
                header.flags.bits()
            )?;
            let mut props: Vec<_> = header.properties().collect();
            props.sort();
            for (name, value) in props {
                writeln!(w, "prop {} {} {}", header.key, name, encode_value(value))?;
            }
        }
        w.flush()?;
        drop(w);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn parse(reader: BufReader<File>) -> Result<Inner> {
    let mut inner = Inner::default();
    let mut lines = reader.lines();

    let first = lines.next().transpose()?.unwrap_or_default();
    if first != HEADER {
        // not ours: read as empty and invalid rather than guessing
        return Ok(inner);
    }

    for line in lines {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(' ');
        match fields.next() {
            Some("valid") => {
                inner.valid = fields.next() == Some("1");
            }
            Some("reclaimable") => {
                if let Some(n) = fields.next().and_then(|v| v.parse().ok()) {
                    inner.reclaimable = n;
                }
            }
            Some("fprop") => {
                if let (Some(name), Some(value)) = (fields.next(), fields.next()) {
                    inner
                        .summary
                        .properties
                        .push((name.to_string(), decode_value(value)));
                }
            }
            Some("msg") => {
                if let Some(header) = parse_record(&mut fields) {
                    inner.records.insert(header.key, header);
                }
            }
            Some("prop") => {
                let key = fields.next().and_then(|v| v.parse::<u64>().ok());
                if let (Some(key), Some(name), Some(value)) =
                    (key, fields.next(), fields.next())
                {
                    if let Some(record) = inner.records.get_mut(&MessageKey(key)) {
                        record.set_string_property(name, &decode_value(value));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(inner)
}

fn parse_record<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Option<MessageHeader> {
    let key = fields.next()?.parse::<u64>().ok()?;
    let offset = fields.next()?.parse().ok()?;
    let size = fields.next()?.parse().ok()?;
    let status_offset = fields.next()?.parse().ok()?;
    let bits = u32::from_str_radix(fields.next()?, 16).ok()?;
    let mut header = MessageHeader::new(MessageKey(key));
    header.offset = offset;
    header.size = size;
    header.status_offset = status_offset;
    header.flags = MessageFlags::from_bits_retain(bits);
    Some(header)
}

impl MetadataIndex for FileIndex {
    fn list_live_keys(&self) -> Result<Vec<MessageKey>> {
        self.list_keys(|h| !h.flags.contains(MessageFlags::EXPUNGED))
    }

    fn list_cached_keys(&self) -> Result<Vec<MessageKey>> {
        self.list_keys(|h| h.flags.contains(MessageFlags::CACHED))
    }

    fn header(&self, key: MessageKey) -> Result<MessageHeader> {
        let inner = self.inner()?;
        inner
            .records
            .get(&key)
            .cloned()
            .ok_or(CompactError::UnknownKey(key))
    }

    fn adopt_header(&self, header: &MessageHeader) -> Result<()> {
        let mut inner = self.inner()?;
        inner.records.insert(header.key, header.clone());
        inner.dirty = true;
        Ok(())
    }

    fn set_offset_size(&self, key: MessageKey, offset: u64, size: u64, token: &str) -> Result<()> {
        self.update(key, |record| {
            record.offset = offset;
            record.size = size;
            record.set_string_property(crate::store::props::STORE_TOKEN, token);
        })
    }

    fn clear_flags(&self, key: MessageKey, flags: MessageFlags) -> Result<()> {
        self.update(key, |record| record.flags.remove(flags))
    }

    fn set_string_property(&self, key: MessageKey, name: &str, value: &str) -> Result<()> {
        self.update(key, |record| record.set_string_property(name, value))
    }

    fn reclaimable_bytes(&self) -> u64 {
        self.inner.lock().map(|inner| inner.reclaimable).unwrap_or(0)
    }

    fn set_reclaimable_bytes(&self, bytes: u64) -> Result<()> {
        let mut inner = self.inner()?;
        inner.reclaimable = bytes;
        inner.dirty = true;
        Ok(())
    }

    fn summary(&self) -> Result<FolderSummary> {
        Ok(self.inner()?.summary.clone())
    }

    fn apply_summary(&self, summary: &FolderSummary) -> Result<()> {
        let mut inner = self.inner()?;
        inner.summary = summary.clone();
        inner.dirty = true;
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.inner.lock().map(|inner| inner.valid).unwrap_or(false)
    }

    fn set_valid(&self, valid: bool) -> Result<()> {
        let mut inner = self.inner()?;
        if inner.valid != valid {
            inner.valid = valid;
            inner.dirty = true;
        }
        Ok(())
    }

    fn size_on_disk(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn message_count(&self) -> u64 {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .records
                    .values()
                    .filter(|h| !h.flags.contains(MessageFlags::EXPUNGED))
                    .count() as u64
            })
            .unwrap_or(0)
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.inner()?;
        if !inner.dirty {
            return Ok(());
        }
        self.save(&inner)?;
        inner.dirty = false;
        Ok(())
    }
}

/// Opens `.idx` files beside their data files.
pub struct FileIndexStore;

impl IndexStore for FileIndexStore {
    fn index_path_for(&self, data_path: &Path) -> PathBuf {
        let mut name = data_path.as_os_str().to_os_string();
        name.push(".idx");
        PathBuf::from(name)
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn MetadataIndex>> {
        Ok(Arc::new(FileIndex::open(path)?))
    }

    fn create(&self, path: &Path) -> Result<Arc<dyn MetadataIndex>> {
        Ok(Arc::new(FileIndex::create(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::props;

    fn sample_header(key: u64, offset: u64, size: u64) -> MessageHeader {
        let mut header = MessageHeader::new(MessageKey(key));
        header.offset = offset;
        header.size = size;
        header.status_offset = 25;
        header.flags = MessageFlags::SEEN | MessageFlags::CACHED;
        header.set_string_property(props::KEYWORDS, "urgent to do");
        header.set_string_property(props::STORE_TOKEN, &offset.to_string());
        header
    }

    #[test]
    fn round_trips_records_and_folder_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("INBOX.idx");

        let index = FileIndex::create(&path);
        index.adopt_header(&sample_header(7, 120, 900)).unwrap();
        index.adopt_header(&sample_header(3, 0, 120)).unwrap();
        index.set_reclaimable_bytes(4096).unwrap();
        index
            .apply_summary(&FolderSummary {
                properties: vec![("sortOrder".into(), "by date".into())],
            })
            .unwrap();
        index.commit().unwrap();

        let reloaded = FileIndex::open(&path).unwrap();
        assert!(reloaded.is_valid());
        assert_eq!(reloaded.reclaimable_bytes(), 4096);
        assert_eq!(reloaded.message_count(), 2);
        assert_eq!(
            reloaded.summary().unwrap().properties,
            vec![("sortOrder".to_string(), "by date".to_string())]
        );
        let header = reloaded.header(MessageKey(7)).unwrap();
        assert_eq!(header.offset, 120);
        assert_eq!(header.size, 900);
        assert_eq!(header.status_offset, 25);
        assert_eq!(header.flags, MessageFlags::SEEN | MessageFlags::CACHED);
        assert_eq!(header.string_property(props::KEYWORDS), Some("urgent to do"));
        assert_eq!(header.string_property(props::STORE_TOKEN), Some("120"));
    }

    #[test]
    fn listing_follows_file_order_not_key_order() {
        let path = Path::new("unused.idx");
        let index = FileIndex::create(path);
        index.adopt_header(&sample_header(9, 0, 50)).unwrap();
        index.adopt_header(&sample_header(1, 200, 50)).unwrap();
        index.adopt_header(&sample_header(5, 100, 50)).unwrap();

        let keys = index.list_live_keys().unwrap();
        assert_eq!(keys, vec![MessageKey(9), MessageKey(5), MessageKey(1)]);
    }

    #[test]
    fn expunged_records_are_not_live() {
        let path = Path::new("unused.idx");
        let index = FileIndex::create(path);
        let mut dead = sample_header(2, 60, 40);
        dead.flags |= MessageFlags::EXPUNGED;
        index.adopt_header(&sample_header(1, 0, 60)).unwrap();
        index.adopt_header(&dead).unwrap();

        assert_eq!(index.list_live_keys().unwrap(), vec![MessageKey(1)]);
        // the dead record still has its cached copy listed
        assert_eq!(
            index.list_cached_keys().unwrap(),
            vec![MessageKey(1), MessageKey(2)]
        );
        assert_eq!(index.message_count(), 1);
    }

    #[test]
    fn missing_file_reads_as_empty_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileIndex::open(&dir.path().join("absent.idx")).unwrap();
        assert!(!index.is_valid());
        assert_eq!(index.message_count(), 0);
    }

    #[test]
    fn foreign_file_reads_as_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("INBOX.idx");
        fs::write(&path, "something else entirely\n").unwrap();
        let index = FileIndex::open(&path).unwrap();
        assert!(!index.is_valid());
        assert_eq!(index.message_count(), 0);
    }

    #[test]
    fn unknown_key_is_reported() {
        let index = FileIndex::create(Path::new("unused.idx"));
        let err = index.header(MessageKey(42)).unwrap_err();
        assert!(matches!(err, CompactError::UnknownKey(MessageKey(42))));
    }

    #[test]
    fn index_path_appends_idx_suffix() {
        let store = FileIndexStore;
        assert_eq!(
            store.index_path_for(Path::new("/mail/INBOX")),
            PathBuf::from("/mail/INBOX.idx")
        );
    }
}
