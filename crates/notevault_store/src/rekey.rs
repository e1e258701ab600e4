//! Password change with all-or-nothing re-encryption.

use crate::error::StoreResult;
use crate::store::EncryptedStore;

impl EncryptedStore {
    /// Changes the master password and re-encrypts every encrypted entry
    /// under the new key.
    ///
    /// Returns `Ok(false)` when `current` does not match; the vault is
    /// untouched. On any failure after the key swap, both the key record
    /// and every touched row are rolled back to their previous bytes, so
    /// the store never ends up half re-encrypted.
    pub fn change_password(&self, current: &str, new: &str) -> StoreResult<bool> {
        // Held across the whole sequence: lock and unlock queue behind it
        // instead of interleaving with the re-encryption.
        let _op = self.master.operation_guard();
        if !self.master.verify_password(current)? {
            return Ok(false);
        }

        // Decrypt everything while the old key is still active.
        let entries = self.snapshot()?;
        let mut previous_rows = Vec::new();
        for (key, _, _) in &entries {
            previous_rows.extend(self.raw_rows(key)?);
        }

        let rollback = self.master.rekey_snapshot()?;
        let candidate = self.master.begin_rekey(new)?;
        self.master.commit_rekey(candidate)?;

        for (key, value, encrypted) in &entries {
            if let Err(err) = self.set_with_options(key, value, *encrypted) {
                tracing::error!(error = %err, "password change failed, rolling back");
                self.restore_raw_rows(&previous_rows)?;
                self.master.commit_rekey(rollback)?;
                return Err(err);
            }
        }
        tracing::info!(entries = entries.len(), "password changed, store re-encrypted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::record_store::BackendKeyRecordStore;
    use notevault_crypto::{ManualClock, MasterKeyManager};
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> (EncryptedStore, Arc<MasterKeyManager>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let backend = Arc::new(MemoryBackend::new());
        let master = Arc::new(MasterKeyManager::new(
            Arc::new(BackendKeyRecordStore::new(backend.clone())),
            clock.clone(),
        ));
        master.initialize("old-pw").unwrap();
        (
            EncryptedStore::new(backend, master.clone(), clock),
            master,
        )
    }

    #[test]
    fn change_password_reencrypts_entries() {
        let (store, master) = store();
        store.set("note_1", &json!({"content": "secret"})).unwrap();

        assert!(store.change_password("old-pw", "new-pw").unwrap());

        // Entries survive a lock/unlock cycle with the new password.
        master.lock();
        assert!(!master.unlock("old-pw").unwrap());
        assert!(master.unlock("new-pw").unwrap());
        assert_eq!(
            store.get("note_1").unwrap(),
            Some(json!({"content": "secret"}))
        );
    }

    #[test]
    fn wrong_current_password_is_a_noop() {
        let (store, master) = store();
        store.set("note_1", &json!({"content": "secret"})).unwrap();

        assert!(!store.change_password("wrong", "new-pw").unwrap());

        master.lock();
        assert!(master.unlock("old-pw").unwrap());
        assert_eq!(
            store.get("note_1").unwrap(),
            Some(json!({"content": "secret"}))
        );
    }

    #[test]
    fn change_password_requires_unlocked() {
        let (store, master) = store();
        master.lock();
        assert!(store.change_password("old-pw", "new-pw").is_err());
        // The failure never resurrects an unlocked state.
        assert!(!master.is_unlocked());
    }
}
