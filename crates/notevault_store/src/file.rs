//! Single-file JSON backend with an exclusive advisory lock.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// File-backed storage backend.
///
/// The whole key/value map lives in one JSON file. Writes go to a
/// sibling temp file first and are renamed into place, so a crash
/// mid-write leaves the previous state intact. A `.lock` sibling file
/// holds an exclusive advisory lock for the lifetime of the backend.
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    // Held for the process lifetime; dropping releases the lock.
    _lock_file: File,
}

impl FileBackend {
    /// Opens (or creates) the backing file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BackendLocked`] if another process holds
    /// the lock, or an I/O / parse error if the file is unreadable.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path_for(&path);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::BackendLocked)?;

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            _lock_file: lock_file,
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> StoreResult<()> {
        let raw = serde_json::to_string(entries)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, raw)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        next.insert(key.into(), value.into());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut entries = self.entries.write();
        self.persist(&HashMap::new())?;
        entries.clear();
        Ok(())
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
