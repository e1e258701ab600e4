//! Encrypted key/value store with plaintext migration.
//!
//! ## Key namespacing
//!
//! Backend keys are namespaced so migration can enumerate without
//! ambiguity:
//!
//! - `encrypted_<name>`: entry envelope holding an [`EncryptedBlob`]
//! - `plain_<name>`: entry envelope holding a plaintext JSON value
//! - anything else: legacy bare value from before the engine existed
//!
//! A handful of `__notevault_` keys are reserved for engine metadata and
//! never treated as user entries.
//!
//! [`EncryptedBlob`]: notevault_crypto::EncryptedBlob

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use notevault_crypto::{Clock, CryptoError, EncryptedBlob, EncryptionEngine, MasterKeyManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Backend key prefix for encrypted entries.
pub const PREFIX_ENCRYPTED: &str = "encrypted_";
/// Backend key prefix for plaintext entries.
pub const PREFIX_PLAIN: &str = "plain_";
/// Prefix for reserved engine metadata keys.
pub const PREFIX_RESERVED: &str = "__notevault_";

/// Context label for the storage encryption domain.
pub const STORAGE_CONTEXT: &str = "storage";

/// A named slot as persisted in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Whether the entry payload is encrypted.
    pub encrypted: bool,
    /// When the entry was written (unix millis).
    pub stored_at: u64,
    /// Present when `encrypted` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<EncryptedBlob>,
    /// Present when `encrypted` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Counters for the audited plaintext-downgrade path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DowngradeStats {
    /// How many writes were downgraded to plaintext.
    pub count: u64,
    /// When the most recent downgrade happened (unix millis).
    pub last_at: Option<u64>,
}

/// Result of a completed migration pass.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Number of entries converted to encrypted form.
    pub migrated: usize,
}

/// Key/value persistence with transparent encryption.
///
/// Writes encrypt under the `"storage"` context key when the master key
/// is unlocked; reads transparently decrypt. Plaintext and legacy
/// entries remain readable and can be migrated in bulk.
pub struct EncryptedStore {
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) master: Arc<MasterKeyManager>,
    pub(crate) engine: EncryptionEngine,
    pub(crate) clock: Arc<dyn Clock>,
    plaintext_fallback: bool,
    downgrade_count: AtomicU64,
    last_downgrade_at: AtomicU64,
}

impl EncryptedStore {
    /// Creates a store over `backend` using `master` for keys.
    ///
    /// The plaintext fallback policy defaults to off: writes that
    /// request encryption fail when the master key is locked.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        master: Arc<MasterKeyManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            master,
            engine: EncryptionEngine::new(),
            clock,
            plaintext_fallback: false,
            downgrade_count: AtomicU64::new(0),
            last_downgrade_at: AtomicU64::new(0),
        }
    }

    /// Enables storing plaintext when encryption is requested but the
    /// master key is locked. Every downgrade is logged and counted.
    #[must_use]
    pub fn with_plaintext_fallback(mut self, enabled: bool) -> Self {
        self.plaintext_fallback = enabled;
        self
    }

    /// Stats for the audited downgrade path.
    pub fn downgrade_stats(&self) -> DowngradeStats {
        let count = self.downgrade_count.load(Ordering::SeqCst);
        let last = self.last_downgrade_at.load(Ordering::SeqCst);
        DowngradeStats {
            count,
            last_at: (last > 0).then_some(last),
        }
    }

    /// Writes `value` under `key`, encrypted by default.
    pub fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.set_with_options(key, value, true)
    }

    /// Writes `value` under `key`, optionally in plaintext.
    ///
    /// # Errors
    ///
    /// Encryption failures and a locked master key (without the fallback
    /// policy) propagate; nothing is silently written in plaintext.
    pub fn set_with_options(&self, key: &str, value: &Value, encrypt: bool) -> StoreResult<()> {
        if encrypt {
            match self.master.context_key(STORAGE_CONTEXT) {
                Ok(context_key) => {
                    let plaintext = serde_json::to_vec(value)?;
                    let blob = self.engine.encrypt(&plaintext, &context_key)?;
                    let entry = StorageEntry {
                        encrypted: true,
                        stored_at: self.clock.now_millis(),
                        blob: Some(blob),
                        value: None,
                    };
                    self.backend
                        .set(&encrypted_key(key), &serde_json::to_string(&entry)?)?;
                    // The encrypted copy is now durable; drop stale variants.
                    self.backend.remove(&plain_key(key))?;
                    self.backend.remove(key)?;
                    return Ok(());
                }
                Err(CryptoError::Locked) if self.plaintext_fallback => {
                    let now = self.clock.now_millis();
                    self.downgrade_count.fetch_add(1, Ordering::SeqCst);
                    self.last_downgrade_at.store(now, Ordering::SeqCst);
                    tracing::warn!(
                        key,
                        "encryption unavailable (master key locked); storing plaintext per fallback policy"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let entry = StorageEntry {
            encrypted: false,
            stored_at: self.clock.now_millis(),
            blob: None,
            value: Some(value.clone()),
        };
        self.backend
            .set(&plain_key(key), &serde_json::to_string(&entry)?)?;
        self.backend.remove(&encrypted_key(key))?;
        self.backend.remove(key)?;
        Ok(())
    }

    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent. A failed integrity
    /// check propagates as an error; corrupted data is never returned.
    pub fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        if let Some(raw) = self.backend.get(&encrypted_key(key))? {
            let entry: StorageEntry = serde_json::from_str(&raw)?;
            let blob = entry
                .blob
                .ok_or_else(|| StoreError::backend("encrypted entry without blob"))?;
            let context_key = self.master.context_key(STORAGE_CONTEXT)?;
            let plaintext = self.engine.decrypt(&blob, &context_key)?;
            return Ok(Some(serde_json::from_slice(&plaintext)?));
        }

        if let Some(raw) = self.backend.get(&plain_key(key))? {
            let entry: StorageEntry = serde_json::from_str(&raw)?;
            return Ok(entry.value);
        }

        if is_user_key(key) {
            if let Some(raw) = self.backend.get(key)? {
                return Ok(Some(parse_legacy(&raw)));
            }
        }

        Ok(None)
    }

    /// Removes `key` in all its forms (encrypted, plaintext, legacy).
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.backend.remove(&encrypted_key(key))?;
        self.backend.remove(&plain_key(key))?;
        if is_user_key(key) {
            self.backend.remove(key)?;
        }
        Ok(())
    }

    /// Removes every user entry, leaving reserved metadata intact.
    pub fn clear(&self) -> StoreResult<()> {
        for backend_key in self.backend.keys()? {
            if !backend_key.starts_with(PREFIX_RESERVED) {
                self.backend.remove(&backend_key)?;
            }
        }
        Ok(())
    }

    /// Lists logical keys currently stored, in no particular order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        for backend_key in self.backend.keys()? {
            if let Some(name) = backend_key.strip_prefix(PREFIX_ENCRYPTED) {
                out.push(name.to_string());
            } else if let Some(name) = backend_key.strip_prefix(PREFIX_PLAIN) {
                out.push(name.to_string());
            } else if is_user_key(&backend_key) {
                out.push(backend_key);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Logical keys whose current form is plaintext or legacy.
    pub fn plaintext_keys(&self) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        for backend_key in self.backend.keys()? {
            if let Some(name) = backend_key.strip_prefix(PREFIX_PLAIN) {
                out.push(name.to_string());
            } else if is_user_key(&backend_key) && !backend_key.starts_with(PREFIX_ENCRYPTED) {
                out.push(backend_key);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Converts every plaintext and legacy entry to encrypted form.
    ///
    /// Each entry is re-written through the encrypted path; the
    /// plaintext copy is removed only after the encrypted write lands.
    /// Entries that fail are left in their original plaintext form and
    /// reported via [`StoreError::MigrationPartial`].
    pub fn migrate_to_encrypted(&self) -> StoreResult<MigrationReport> {
        let candidates = self.plaintext_keys()?;
        let mut migrated = 0usize;
        let mut failed = Vec::new();

        for key in candidates {
            let value = match self.get(&key) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(key, error = %err, "migration: failed to read plaintext entry");
                    failed.push(key);
                    continue;
                }
            };

            match self.set_with_options(&key, &value, true) {
                Ok(()) => migrated += 1,
                Err(err) => {
                    tracing::warn!(key, error = %err, "migration: failed to encrypt entry");
                    failed.push(key);
                }
            }
        }

        if failed.is_empty() {
            tracing::info!(migrated, "plaintext migration complete");
            Ok(MigrationReport { migrated })
        } else {
            Err(StoreError::MigrationPartial { migrated, failed })
        }
    }

    /// Snapshot of every user entry as `(key, value, was_encrypted)`.
    ///
    /// Encrypted entries are decrypted, so this requires an unlocked
    /// master key when any exist. Used by backup and password change.
    pub(crate) fn snapshot(&self) -> StoreResult<Vec<(String, Value, bool)>> {
        let mut out = Vec::new();
        for key in self.keys()? {
            let encrypted = self.backend.get(&encrypted_key(&key))?.is_some();
            if let Some(value) = self.get(&key)? {
                out.push((key, value, encrypted));
            }
        }
        Ok(out)
    }

    /// Raw backend rows for the given logical key, used for rollback.
    pub(crate) fn raw_rows(&self, key: &str) -> StoreResult<Vec<(String, Option<String>)>> {
        let mut rows = vec![
            (encrypted_key(key), self.backend.get(&encrypted_key(key))?),
            (plain_key(key), self.backend.get(&plain_key(key))?),
        ];
        if is_user_key(key) {
            rows.push((key.to_string(), self.backend.get(key)?));
        }
        Ok(rows)
    }

    /// Restores raw backend rows captured by [`raw_rows`](Self::raw_rows).
    pub(crate) fn restore_raw_rows(&self, rows: &[(String, Option<String>)]) -> StoreResult<()> {
        for (backend_key, value) in rows {
            match value {
                Some(raw) => self.backend.set(backend_key, raw)?,
                None => self.backend.remove(backend_key)?,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("plaintext_fallback", &self.plaintext_fallback)
            .finish()
    }
}

fn encrypted_key(key: &str) -> String {
    format!("{PREFIX_ENCRYPTED}{key}")
}

fn plain_key(key: &str) -> String {
    format!("{PREFIX_PLAIN}{key}")
}

fn is_user_key(key: &str) -> bool {
    !key.starts_with(PREFIX_RESERVED)
        && !key.starts_with(PREFIX_ENCRYPTED)
        && !key.starts_with(PREFIX_PLAIN)
}

/// Legacy entries predate the envelope format: the raw string is either
/// a bare JSON value or an unwrapped string.
fn parse_legacy(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use notevault_crypto::{ManualClock, MemoryKeyRecordStore};
    use serde_json::json;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        master: Arc<MasterKeyManager>,
        store: EncryptedStore,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let backend = Arc::new(MemoryBackend::new());
        let master = Arc::new(MasterKeyManager::new(
            Arc::new(MemoryKeyRecordStore::new()),
            clock.clone(),
        ));
        master.initialize("correct-horse").unwrap();
        let store = EncryptedStore::new(backend.clone(), master.clone(), clock);
        Fixture {
            backend,
            master,
            store,
        }
    }

    #[test]
    fn set_get_roundtrip_encrypted() {
        let f = fixture();
        let notes = json!([{"id": "n1", "content": "hello"}]);

        f.store.set("notes", &notes).unwrap();
        assert_eq!(f.store.get("notes").unwrap(), Some(notes));

        // Stored form is the encrypted namespace, and the ciphertext
        // does not contain the plaintext.
        let raw = f.backend.get("encrypted_notes").unwrap().unwrap();
        assert!(!raw.contains("hello"));
        assert_eq!(f.backend.get("plain_notes").unwrap(), None);
    }

    #[test]
    fn plaintext_write_when_requested() {
        let f = fixture();
        f.store
            .set_with_options("prefs", &json!({"theme": "dark"}), false)
            .unwrap();

        assert!(f.backend.get("plain_prefs").unwrap().is_some());
        assert_eq!(
            f.store.get("prefs").unwrap(),
            Some(json!({"theme": "dark"}))
        );
    }

    #[test]
    fn locked_write_fails_without_fallback() {
        let f = fixture();
        f.master.lock();

        let err = f.store.set("notes", &json!("data")).unwrap_err();
        assert!(matches!(err, StoreError::Crypto(CryptoError::Locked)));
        assert_eq!(f.store.downgrade_stats().count, 0);
    }

    #[test]
    fn locked_write_downgrades_with_fallback() {
        let f = fixture();
        let store = EncryptedStore::new(
            f.backend.clone(),
            f.master.clone(),
            Arc::new(ManualClock::new(2_000)),
        )
        .with_plaintext_fallback(true);
        f.master.lock();

        store.set("notes", &json!("data")).unwrap();

        // Downgrade is observable, not silent.
        let stats = store.downgrade_stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.last_at, Some(2_000));
        assert!(f.backend.get("plain_notes").unwrap().is_some());
    }

    #[test]
    fn get_absent_is_none_not_error() {
        let f = fixture();
        assert_eq!(f.store.get("missing").unwrap(), None);
    }

    #[test]
    fn get_encrypted_while_locked_fails() {
        let f = fixture();
        f.store.set("notes", &json!("secret")).unwrap();
        f.master.lock();

        assert!(matches!(
            f.store.get("notes"),
            Err(StoreError::Crypto(CryptoError::Locked))
        ));
    }

    #[test]
    fn tampered_entry_fails_closed() {
        let f = fixture();
        f.store.set("notes", &json!("secret")).unwrap();

        let raw = f.backend.get("encrypted_notes").unwrap().unwrap();
        let mut entry: StorageEntry = serde_json::from_str(&raw).unwrap();
        if let Some(blob) = entry.blob.as_mut() {
            blob.ciphertext[0] ^= 0xFF;
        }
        f.backend
            .set("encrypted_notes", &serde_json::to_string(&entry).unwrap())
            .unwrap();

        assert!(matches!(
            f.store.get("notes"),
            Err(StoreError::Crypto(CryptoError::Integrity))
        ));
    }

    #[test]
    fn legacy_entries_are_readable() {
        let f = fixture();
        f.backend.set("old_setting", "{\"sidebar\":true}").unwrap();
        f.backend.set("old_note", "just text").unwrap();

        assert_eq!(
            f.store.get("old_setting").unwrap(),
            Some(json!({"sidebar": true}))
        );
        assert_eq!(f.store.get("old_note").unwrap(), Some(json!("just text")));
    }

    #[test]
    fn remove_drops_all_forms() {
        let f = fixture();
        f.backend.set("notes", "legacy").unwrap();
        f.store.set("notes", &json!("new")).unwrap();

        f.store.remove("notes").unwrap();
        assert_eq!(f.store.get("notes").unwrap(), None);
        assert_eq!(f.backend.get("notes").unwrap(), None);
    }

    #[test]
    fn migration_converts_everything() {
        let f = fixture();
        f.backend.set("legacy", "\"old\"").unwrap();
        f.store
            .set_with_options("plain", &json!({"a": 1}), false)
            .unwrap();
        f.store.set("already", &json!("enc")).unwrap();

        let report = f.store.migrate_to_encrypted().unwrap();
        assert_eq!(report.migrated, 2);

        // Everything reads back with identical values, now encrypted.
        assert_eq!(f.store.get("legacy").unwrap(), Some(json!("old")));
        assert_eq!(f.store.get("plain").unwrap(), Some(json!({"a": 1})));
        assert!(f.backend.get("encrypted_legacy").unwrap().is_some());
        assert!(f.backend.get("encrypted_plain").unwrap().is_some());
        assert_eq!(f.backend.get("legacy").unwrap(), None);
        assert_eq!(f.backend.get("plain_plain").unwrap(), None);
    }

    #[test]
    fn migration_while_locked_preserves_plaintext() {
        let f = fixture();
        f.backend.set("legacy", "\"old\"").unwrap();
        f.master.lock();

        let err = f.store.migrate_to_encrypted().unwrap_err();
        match err {
            StoreError::MigrationPartial { migrated, failed } => {
                assert_eq!(migrated, 0);
                assert_eq!(failed, vec!["legacy".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Original plaintext untouched.
        assert_eq!(f.backend.get("legacy").unwrap().as_deref(), Some("\"old\""));
    }

    #[test]
    fn keys_lists_logical_names_once() {
        let f = fixture();
        f.backend.set("legacy", "\"x\"").unwrap();
        f.store.set("enc", &json!(1)).unwrap();
        f.store.set_with_options("plain", &json!(2), false).unwrap();

        assert_eq!(
            f.store.keys().unwrap(),
            vec!["enc".to_string(), "legacy".to_string(), "plain".to_string()]
        );
    }

    #[test]
    fn clear_keeps_reserved_keys() {
        let f = fixture();
        f.backend.set("__notevault_key_record", "{}").unwrap();
        f.store.set("notes", &json!("x")).unwrap();

        f.store.clear().unwrap();
        assert_eq!(f.store.get("notes").unwrap(), None);
        assert!(f.backend.get("__notevault_key_record").unwrap().is_some());
    }
}
