//! Storage backend trait and the in-memory implementation.

use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A flat string key/value backend.
///
/// Backends know nothing about encryption; the [`EncryptedStore`]
/// layers entry envelopes and key namespacing on top.
///
/// [`EncryptedStore`]: crate::store::EncryptedStore
pub trait StorageBackend: Send + Sync {
    /// Reads a value, `None` if absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value, overwriting any existing one.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists all keys.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Removes everything.
    fn clear(&self) -> StoreResult<()>;
}

/// In-memory backend for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the backend holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries.write().insert(key.into(), value.into());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}
