//! Sync payload types: the plaintext pre-transit form and the encrypted
//! wire form.

use notevault_crypto::{EncryptedBlob, ALGORITHM_AES_256_GCM, BLOB_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current sync payload schema version.
pub const SYNC_SCHEMA_VERSION: u32 = 1;

/// The kind of record a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// A note record.
    Notes,
    /// The notebook set.
    Notebooks,
    /// Application settings.
    Settings,
    /// Tag color assignments.
    TagColors,
}

/// What the sender did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Record was created.
    Create,
    /// Record was updated.
    Update,
    /// Record was deleted.
    Delete,
    /// Full-state sync of the record.
    Sync,
}

/// A domain record ready for sync, before encryption.
///
/// Payloads for the same entity id must be applied in `timestamp` order
/// by the caller; payloads for different ids carry no ordering
/// dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Entity id this payload describes.
    pub id: String,
    /// Kind of record.
    pub entity_type: EntityType,
    /// What happened to the record.
    pub action: SyncAction,
    /// The record content.
    pub data: Value,
    /// When the change happened (unix millis).
    pub timestamp: u64,
    /// Payload schema version.
    pub schema_version: u32,
    /// Originating client.
    pub client_id: String,
}

/// The wire form of a payload. Never carries plaintext `data`; this is
/// the only structure transport code may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSyncPayload {
    /// Entity id (metadata, needed for routing and ordering).
    pub id: String,
    /// Encrypted serialized [`SyncPayload`].
    pub encrypted_data: Vec<u8>,
    /// IV used for this payload.
    pub iv: Vec<u8>,
    /// Subkey salt used for this payload.
    pub salt: Vec<u8>,
    /// Change timestamp (unix millis), mirrored from the payload.
    pub timestamp: u64,
    /// Payload schema version.
    pub schema_version: u32,
    /// Originating client.
    pub client_id: String,
    /// Integrity tag over `encrypted_data || iv`.
    pub integrity_tag: Vec<u8>,
}

impl EncryptedSyncPayload {
    /// Assembles the wire form from payload metadata and a blob.
    #[must_use]
    pub fn from_blob(payload: &SyncPayload, blob: EncryptedBlob) -> Self {
        Self {
            id: payload.id.clone(),
            encrypted_data: blob.ciphertext,
            iv: blob.iv,
            salt: blob.salt,
            timestamp: payload.timestamp,
            schema_version: payload.schema_version,
            client_id: payload.client_id.clone(),
            integrity_tag: blob.integrity_tag,
        }
    }

    /// Reassembles the blob for decryption.
    #[must_use]
    pub fn to_blob(&self) -> EncryptedBlob {
        EncryptedBlob {
            ciphertext: self.encrypted_data.clone(),
            iv: self.iv.clone(),
            salt: self.salt.clone(),
            algorithm_id: ALGORITHM_AES_256_GCM.to_string(),
            schema_version: BLOB_SCHEMA_VERSION,
            integrity_tag: self.integrity_tag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EntityType::TagColors).unwrap(),
            "\"tagColors\""
        );
        assert_eq!(
            serde_json::to_string(&EntityType::Notes).unwrap(),
            "\"notes\""
        );
        assert_eq!(
            serde_json::from_str::<SyncAction>("\"delete\"").unwrap(),
            SyncAction::Delete
        );
    }

    #[test]
    fn payload_serde_roundtrip() {
        let payload = SyncPayload {
            id: "n1".into(),
            entity_type: EntityType::Notes,
            action: SyncAction::Update,
            data: json!({"content": "hello"}),
            timestamp: 1_700_000_000_000,
            schema_version: SYNC_SCHEMA_VERSION,
            client_id: "client-a".into(),
        };

        let raw = serde_json::to_string(&payload).unwrap();
        assert!(raw.contains("\"entityType\":\"notes\""));
        let parsed: SyncPayload = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, payload);
    }
}
