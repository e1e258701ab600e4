//! Backend-backed persistence for the master key record.

use crate::backend::StorageBackend;
use notevault_crypto::{CryptoError, CryptoResult, KeyRecord, KeyRecordStore};
use std::sync::Arc;

/// Reserved backend key holding the key record.
pub const KEY_RECORD_KEY: &str = "__notevault_key_record";

/// Persists the [`KeyRecord`] in a [`StorageBackend`] under a reserved
/// key. Only verification material goes through here, never the
/// derived key itself.
pub struct BackendKeyRecordStore {
    backend: Arc<dyn StorageBackend>,
}

impl BackendKeyRecordStore {
    /// Creates a record store over `backend`.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }
}

impl KeyRecordStore for BackendKeyRecordStore {
    fn load(&self) -> CryptoResult<Option<KeyRecord>> {
        let raw = self
            .backend
            .get(KEY_RECORD_KEY)
            .map_err(|err| CryptoError::record_storage(err.to_string()))?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| CryptoError::record_storage(format!("corrupt key record: {err}"))),
            None => Ok(None),
        }
    }

    fn save(&self, record: &KeyRecord) -> CryptoResult<()> {
        let raw = serde_json::to_string(record)
            .map_err(|err| CryptoError::record_storage(err.to_string()))?;
        self.backend
            .set(KEY_RECORD_KEY, &raw)
            .map_err(|err| CryptoError::record_storage(err.to_string()))
    }
}

impl std::fmt::Debug for BackendKeyRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKeyRecordStore").finish()
    }
}
