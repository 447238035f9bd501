//! Persistent store: one JSON object file shared by concurrent conversions.
//!
//! Reads go through an in-process cache keyed by the file's modification time
//! and length. Every mutation runs a full write cycle under the advisory
//! lock: acquire, reload, mutate, atomic replace, release.

use super::lock::{AdvisoryLock, LockSettings};
use super::{href, upsert, PutOutcome, XrefEntry, XrefLookup, XrefWriter};
use crate::error::StoreError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;

type Entries = BTreeMap<String, XrefEntry>;

#[derive(Debug)]
struct Snapshot {
    modified: SystemTime,
    len: u64,
    entries: Arc<Entries>,
}

#[derive(Debug)]
pub struct XrefStore {
    path: PathBuf,
    lock_path: PathBuf,
    settings: LockSettings,
    cache: Mutex<Option<Snapshot>>,
}

impl XrefStore {
    /// Open (or prepare) the store at `path`. The file itself is created by
    /// the first write.
    pub fn open(path: impl Into<PathBuf>, settings: LockSettings) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Ok(XrefStore {
            lock_path: PathBuf::from(lock_name),
            path,
            settings,
            cache: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Look up a customer id, decoding encoded hrefs first.
    pub fn get(&self, key: &str) -> Result<Option<XrefEntry>, StoreError> {
        let key = href::element_id(key).unwrap_or(key);
        Ok(self.snapshot()?.get(key).cloned())
    }

    pub fn get_all(&self) -> Result<Entries, StoreError> {
        Ok(self.snapshot()?.as_ref().clone())
    }

    pub fn put(&self, customer_id: &str, entry: XrefEntry) -> Result<PutOutcome, StoreError> {
        self.write_cycle(|entries| {
            let outcome = upsert(entries, customer_id, entry);
            let changed = outcome.updated;
            (outcome, changed)
        })
    }

    /// Apply several upserts in one write cycle, in order.
    pub fn put_many(
        &self,
        batch: Vec<(String, XrefEntry)>,
    ) -> Result<Vec<(String, PutOutcome)>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.write_cycle(|entries| {
            let mut changed = false;
            let outcomes: Vec<_> = batch
                .into_iter()
                .map(|(customer_id, entry)| {
                    let outcome = upsert(entries, &customer_id, entry);
                    changed |= outcome.updated;
                    (customer_id, outcome)
                })
                .collect();
            (outcomes, changed)
        })
    }

    /// Remove one key. Returns whether it existed.
    pub fn delete(&self, customer_id: &str) -> Result<bool, StoreError> {
        self.write_cycle(|entries| {
            let removed = entries.remove(customer_id).is_some();
            (removed, removed)
        })
    }

    /// Remove every entry registered by one document. Returns the number of
    /// removed entries.
    pub fn delete_all_where_external_id(&self, external_id: &str) -> Result<usize, StoreError> {
        self.write_cycle(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| entry.remark != external_id);
            let removed = before - entries.len();
            (removed, removed > 0)
        })
    }

    /// Current entries, from the cache when the file is unchanged.
    fn snapshot(&self) -> Result<Arc<Entries>, StoreError> {
        let Some((modified, len)) = self.stamp()? else {
            *self.cache.lock() = None;
            return Ok(Arc::new(Entries::new()));
        };

        let mut cache = self.cache.lock();
        if let Some(snapshot) = cache.as_ref() {
            if snapshot.modified == modified && snapshot.len == len {
                return Ok(Arc::clone(&snapshot.entries));
            }
        }
        let entries = Arc::new(self.load()?);
        *cache = Some(Snapshot {
            modified,
            len,
            entries: Arc::clone(&entries),
        });
        Ok(entries)
    }

    fn stamp(&self) -> Result<Option<(SystemTime, u64)>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let modified = meta
                    .modified()
                    .map_err(|err| StoreError::io(&self.path, err))?;
                Ok(Some((modified, meta.len())))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(&self.path, err)),
        }
    }

    fn load(&self) -> Result<Entries, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_cycle<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Entries) -> (T, bool),
    {
        let lock = AdvisoryLock::acquire(&self.lock_path, &self.settings)?;
        let mut entries = self.load()?;
        let (result, changed) = mutate(&mut entries);
        if changed {
            self.persist(&entries)?;
            if let Some((modified, len)) = self.stamp()? {
                *self.cache.lock() = Some(Snapshot {
                    modified,
                    len,
                    entries: Arc::new(entries),
                });
            }
        }
        lock.release()?;
        Ok(result)
    }

    /// Write to a temporary sibling and rename it over the store file.
    fn persist(&self, entries: &Entries) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| StoreError::io(dir, err))?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), entries).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        tmp.as_file_mut()
            .write_all(b"\n")
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|err| StoreError::io(tmp.path(), err))?;
        tmp.persist(&self.path)
            .map_err(|err| StoreError::io(&self.path, err.error))?;
        Ok(())
    }
}

impl XrefLookup for XrefStore {
    fn lookup(&self, key: &str) -> Result<Option<XrefEntry>, StoreError> {
        self.get(key)
    }
}

impl XrefWriter for XrefStore {
    fn put(&mut self, customer_id: &str, entry: XrefEntry) -> Result<(), StoreError> {
        XrefStore::put(self, customer_id, entry).map(|_| ())
    }

    fn flush(&mut self) -> Result<Vec<(String, PutOutcome)>, StoreError> {
        Ok(Vec::new())
    }
}

/// Buffers builder puts and applies them in one write cycle per flush.
#[derive(Debug)]
pub struct StoreBatch<'s> {
    store: &'s XrefStore,
    pending: Vec<(String, XrefEntry)>,
}

impl<'s> StoreBatch<'s> {
    pub fn new(store: &'s XrefStore) -> Self {
        StoreBatch {
            store,
            pending: Vec::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl XrefWriter for StoreBatch<'_> {
    fn put(&mut self, customer_id: &str, entry: XrefEntry) -> Result<(), StoreError> {
        self.pending.push((customer_id.to_string(), entry));
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<(String, PutOutcome)>, StoreError> {
        let batch = std::mem::take(&mut self.pending);
        self.store.put_many(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path) -> XrefStore {
        XrefStore::open(dir.join("xrefs.json"), LockSettings::default()).unwrap()
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(store.get("s1").unwrap(), None);
    }

    #[test]
    fn put_persists_and_releases_lock() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let outcome = store
            .put("s1", XrefEntry::new("sec_1", "body", "DOC"))
            .unwrap();
        assert!(outcome.updated);
        assert!(!store.lock_path().exists());

        let reopened = open(dir.path());
        let entry = reopened.get("s1").unwrap().unwrap();
        assert_eq!(entry.anchor_id, "sec_1");

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"anchorId\": \"sec_1\""));
    }

    #[test]
    fn cache_follows_foreign_writes() {
        let dir = tempdir().unwrap();
        let reader = open(dir.path());
        let writer = open(dir.path());
        writer.put("a", XrefEntry::new("sec_1", "", "D")).unwrap();
        assert!(reader.get("a").unwrap().is_some());
        writer.put("bb", XrefEntry::new("sec_2", "", "D")).unwrap();
        assert!(reader.get("bb").unwrap().is_some());
    }

    #[test]
    fn deletes_by_external_id() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.put("a", XrefEntry::new("sec_1", "", "DOC-A")).unwrap();
        store.put("b", XrefEntry::new("sec_1", "", "DOC-B")).unwrap();
        store.put("c", XrefEntry::new("sec_2", "", "DOC-A")).unwrap();
        assert_eq!(store.delete_all_where_external_id("DOC-A").unwrap(), 2);
        let all = store.get_all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());
    }

    #[test]
    fn batch_flush_reports_conflicts() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut batch = StoreBatch::new(&store);
        XrefWriter::put(&mut batch, "s1", XrefEntry::new("sec_1", "body", "D")).unwrap();
        XrefWriter::put(&mut batch, "s1", XrefEntry::new("sec_2", "body", "D")).unwrap();
        assert_eq!(batch.pending(), 2);
        let outcomes = batch.flush().unwrap();
        assert_eq!(outcomes[1].1.conflict.as_deref(), Some("sec_1"));
        assert_eq!(store.get("s1").unwrap().unwrap().anchor_id, "sec_1");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        fs::write(store.path(), "[1, 2]").unwrap();
        assert!(matches!(store.get("x"), Err(StoreError::Corrupt { .. })));
    }
}
