//! Encrypted full-store backup and restore.
//!
//! ## Container format
//!
//! The exported container is JSON:
//!
//! ```text
//! { "format_marker": true, "version": "1.0", "encrypted": true, "payload": EncryptedBlob }
//! ```
//!
//! The payload decrypts (under the `"backup"` context key) to a manifest
//! listing every entry with its value and encryption flag. Consumers
//! must check `format_marker` and `version` before attempting to
//! decrypt; restore parses the whole manifest before applying anything,
//! so a bad backup never partially imports.

use crate::error::{StoreError, StoreResult};
use crate::store::EncryptedStore;
use notevault_crypto::EncryptedBlob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current backup container version.
pub const BACKUP_VERSION: &str = "1.0";

/// Context label for the backup encryption domain.
pub const BACKUP_CONTEXT: &str = "backup";

/// The exported backup container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupContainer {
    /// Always true for a NoteVault backup.
    pub format_marker: bool,
    /// Container version, currently [`BACKUP_VERSION`].
    pub version: String,
    /// Always true; the payload is never exported in plaintext.
    pub encrypted: bool,
    /// The encrypted manifest.
    pub payload: EncryptedBlob,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupManifest {
    version: String,
    created_at: u64,
    entries: Vec<BackupEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupEntry {
    key: String,
    value: Value,
    encrypted: bool,
}

impl EncryptedStore {
    /// Serializes the full key/value set into one encrypted container.
    ///
    /// Requires an unlocked master key. Entry values are captured in
    /// plaintext inside the manifest and the manifest as a whole is
    /// encrypted under the `"backup"` context key.
    pub fn create_backup(&self) -> StoreResult<BackupContainer> {
        let entries = self
            .snapshot()?
            .into_iter()
            .map(|(key, value, encrypted)| BackupEntry {
                key,
                value,
                encrypted,
            })
            .collect::<Vec<_>>();

        let manifest = BackupManifest {
            version: BACKUP_VERSION.to_string(),
            created_at: self.clock.now_millis(),
            entries,
        };

        let backup_key = self.master.context_key(BACKUP_CONTEXT)?;
        let payload = self
            .engine
            .encrypt(&serde_json::to_vec(&manifest)?, &backup_key)?;

        tracing::info!(entries = manifest.entries.len(), "backup created");
        Ok(BackupContainer {
            format_marker: true,
            version: BACKUP_VERSION.to_string(),
            encrypted: true,
            payload,
        })
    }

    /// Restores entries from a backup container.
    ///
    /// Validates the marker and version, decrypts, and parses the full
    /// manifest before replaying any entry through `set`, so an invalid
    /// backup aborts with [`StoreError::BackupFormat`] and imports
    /// nothing. Returns the number of entries restored.
    pub fn restore_from_backup(&self, container: &BackupContainer) -> StoreResult<usize> {
        if !container.format_marker {
            return Err(StoreError::backup_format("missing format marker"));
        }
        if container.version != BACKUP_VERSION {
            return Err(StoreError::backup_format(format!(
                "unsupported backup version: {}",
                container.version
            )));
        }
        if !container.encrypted {
            return Err(StoreError::backup_format(
                "refusing to restore an unencrypted container",
            ));
        }

        let backup_key = self.master.context_key(BACKUP_CONTEXT)?;
        let plaintext = self.engine.decrypt(&container.payload, &backup_key)?;
        let manifest: BackupManifest = serde_json::from_slice(&plaintext)
            .map_err(|err| StoreError::backup_format(format!("unparseable manifest: {err}")))?;
        if manifest.version != BACKUP_VERSION {
            return Err(StoreError::backup_format(format!(
                "unsupported manifest version: {}",
                manifest.version
            )));
        }

        for entry in &manifest.entries {
            self.set_with_options(&entry.key, &entry.value, entry.encrypted)?;
        }

        tracing::info!(entries = manifest.entries.len(), "backup restored");
        Ok(manifest.entries.len())
    }
}
