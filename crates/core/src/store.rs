use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::domain::PhotoRecord;
use crate::error::{Error, Result};

/// JSON-file-backed collection of photo records, keyed by filename and kept in
/// insertion order. Every mutation and every persist goes through one lock.
pub struct PhotoStore {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<PhotoRecord>,
    index: HashMap<String, usize>,
}

impl Inner {
    fn from_records(records: Vec<PhotoRecord>) -> Self {
        let mut inner = Inner::default();
        for record in records {
            // A hand-edited file may repeat a filename; first entry wins.
            if !inner.index.contains_key(&record.filename) {
                inner.index.insert(record.filename.clone(), inner.records.len());
                inner.records.push(record);
            }
        }
        inner
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, record) in self.records.iter().enumerate().skip(start) {
            self.index.insert(record.filename.clone(), i);
        }
    }
}

impl PhotoStore {
    /// Open the store backed by `path`, creating an empty `[]` file (and parent
    /// directories) when none exists yet, then load its contents.
    pub fn open(path: &Path) -> Result<Self> {
        touch(path)?;
        let store = Self {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(Inner::default()),
        };
        store.load()?;
        Ok(store)
    }

    /// A store with no backing file (for testing); `persist` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the in-memory collection with the persisted form.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut inner = self.lock();
        let content = fs::read_to_string(path)?;
        let records: Vec<PhotoRecord> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };
        *inner = Inner::from_records(records);
        debug!(path = %path.display(), records = inner.records.len(), "loaded photo store");
        Ok(())
    }

    /// Rewrite the whole backing file from the in-memory collection.
    pub fn persist(&self) -> Result<()> {
        let inner = self.lock();
        self.write_locked(&inner)
    }

    fn write_locked(&self, inner: &Inner) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(&inner.records)?;
        let failed = |source| Error::PersistFailed {
            path: path.clone(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        // The temp file is removed on drop if any step below fails
        let mut tmp = tempfile::Builder::new()
            .prefix(".photos-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(failed)?;
        tmp.write_all(&bytes).map_err(failed)?;
        tmp.persist(path).map_err(|e| failed(e.error))?;
        debug!(path = %path.display(), records = inner.records.len(), "persisted photo store");
        Ok(())
    }

    /// Drop every record and rewrite the backing file as an empty collection.
    pub fn erase(&self) -> Result<()> {
        let mut inner = self.lock();
        *inner = Inner::default();
        self.write_locked(&inner)?;
        info!("photo store erased");
        Ok(())
    }

    pub fn get(&self, filename: &str) -> Result<PhotoRecord> {
        let inner = self.lock();
        inner
            .index
            .get(filename)
            .map(|&i| inner.records[i].clone())
            .ok_or_else(|| Error::RecordNotFound(filename.to_string()))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.lock().index.contains_key(filename)
    }

    /// Append a record. A filename that is already present is rejected with
    /// `DuplicateRecord`, never overwritten.
    pub fn add(&self, record: PhotoRecord) -> Result<()> {
        let mut inner = self.lock();
        if inner.index.contains_key(&record.filename) {
            return Err(Error::DuplicateRecord(record.filename));
        }
        let position = inner.records.len();
        inner.index.insert(record.filename.clone(), position);
        inner.records.push(record);
        Ok(())
    }

    /// Like `add`, then rewrite the backing file while still holding the lock.
    pub fn add_and_persist(&self, record: PhotoRecord) -> Result<()> {
        let mut inner = self.lock();
        if inner.index.contains_key(&record.filename) {
            return Err(Error::DuplicateRecord(record.filename));
        }
        let position = inner.records.len();
        inner.index.insert(record.filename.clone(), position);
        inner.records.push(record);
        self.write_locked(&inner)
    }

    /// Remove the record equal to `record`. A record with the same filename but
    /// different fields is not removed.
    pub fn remove(&self, record: &PhotoRecord) -> Result<()> {
        let mut inner = self.lock();
        let position = match inner.index.get(&record.filename) {
            Some(&i) if inner.records[i] == *record => i,
            _ => return Err(Error::RecordNotFound(record.filename.clone())),
        };
        inner.records.remove(position);
        inner.index.remove(&record.filename);
        inner.reindex_from(position);
        Ok(())
    }

    /// Snapshot of every record in insertion order.
    pub fn all(&self) -> Vec<PhotoRecord> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create the backing file with an empty collection if it is missing.
fn touch(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config("photo store path is empty".to_string()));
    }
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, b"[]")?;
    Ok(())
}
