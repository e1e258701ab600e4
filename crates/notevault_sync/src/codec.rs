//! Encrypting and decrypting sync payloads under a session's sync key.

use crate::error::{SyncError, SyncResult};
use crate::payload::{EncryptedSyncPayload, SyncPayload};
use crate::session::SyncSessionManager;
use notevault_crypto::EncryptionEngine;
use std::sync::Arc;

/// Turns [`SyncPayload`]s into wire-ready [`EncryptedSyncPayload`]s and
/// back, pinned to a live sync session.
///
/// Decryption verifies the integrity tag before touching the cipher; a
/// tampered payload fails without counting as processed activity.
pub struct SyncCodec {
    sessions: Arc<SyncSessionManager>,
    engine: EncryptionEngine,
}

impl SyncCodec {
    /// Creates a codec over `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SyncSessionManager>) -> Self {
        Self {
            sessions,
            engine: EncryptionEngine::new(),
        }
    }

    /// Serializes and encrypts `payload` under the session's sync key.
    pub fn encrypt_for_sync(
        &self,
        payload: &SyncPayload,
        session_id: &str,
    ) -> SyncResult<EncryptedSyncPayload> {
        let key = self.sessions.session_key(session_id)?;
        let plaintext = serde_json::to_vec(payload)?;
        let blob = self.engine.encrypt(&plaintext, &key)?;
        self.sessions.note_payload_processed(session_id)?;
        Ok(EncryptedSyncPayload::from_blob(payload, blob))
    }

    /// Verifies, decrypts and parses an incoming payload.
    pub fn decrypt_from_sync(
        &self,
        encrypted: &EncryptedSyncPayload,
        session_id: &str,
    ) -> SyncResult<SyncPayload> {
        let key = self.sessions.session_key(session_id)?;
        let blob = encrypted.to_blob();
        let plaintext = self.engine.decrypt(&blob, &key)?;
        let payload: SyncPayload = serde_json::from_slice(&plaintext)?;
        if payload.id != encrypted.id {
            return Err(SyncError::invalid_payload(format!(
                "payload id {} does not match envelope id {}",
                payload.id, encrypted.id
            )));
        }
        self.sessions.note_payload_processed(session_id)?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EntityType, SyncAction, SYNC_SCHEMA_VERSION};
    use crate::session::SESSION_TIMEOUT_MS;
    use notevault_crypto::{ManualClock, MasterKeyManager, MemoryKeyRecordStore};
    use serde_json::json;

    fn codec() -> (SyncCodec, Arc<SyncSessionManager>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let master = Arc::new(
            MasterKeyManager::new(Arc::new(MemoryKeyRecordStore::new()), clock.clone())
                .with_auto_lock_timeout(u64::MAX),
        );
        master.initialize("correct-horse").unwrap();
        let sessions = Arc::new(SyncSessionManager::new(master, clock.clone()));
        (SyncCodec::new(sessions.clone()), sessions, clock)
    }

    fn payload() -> SyncPayload {
        SyncPayload {
            id: "note-1".into(),
            entity_type: EntityType::Notes,
            action: SyncAction::Update,
            data: json!({"id": "note-1", "content": "ciphertext only on the wire"}),
            timestamp: 1_000,
            schema_version: SYNC_SCHEMA_VERSION,
            client_id: "client-a".into(),
        }
    }

    #[test]
    fn roundtrip_through_a_session() {
        let (codec, sessions, _clock) = codec();
        let session = sessions.create_session("client-a").unwrap();

        let wire = codec.encrypt_for_sync(&payload(), &session.session_id).unwrap();
        assert_eq!(wire.id, "note-1");
        assert!(!wire.encrypted_data.is_empty());

        let back = codec.decrypt_from_sync(&wire, &session.session_id).unwrap();
        assert_eq!(back, payload());
        assert_eq!(
            sessions.session(&session.session_id).unwrap().items_processed,
            2
        );
    }

    #[test]
    fn plaintext_never_appears_on_the_wire() {
        let (codec, sessions, _clock) = codec();
        let session = sessions.create_session("client-a").unwrap();

        let wire = codec.encrypt_for_sync(&payload(), &session.session_id).unwrap();
        let serialized = serde_json::to_string(&wire).unwrap();
        assert!(!serialized.contains("ciphertext only on the wire"));
    }

    #[test]
    fn tampered_payload_fails_without_counting_as_processed() {
        let (codec, sessions, _clock) = codec();
        let session = sessions.create_session("client-a").unwrap();

        let mut wire = codec.encrypt_for_sync(&payload(), &session.session_id).unwrap();
        wire.encrypted_data[0] ^= 0x01;

        assert!(matches!(
            codec.decrypt_from_sync(&wire, &session.session_id),
            Err(SyncError::Crypto(_))
        ));
        // Only the encrypt counted.
        assert_eq!(
            sessions.session(&session.session_id).unwrap().items_processed,
            1
        );
    }

    #[test]
    fn mismatched_envelope_id_is_rejected() {
        let (codec, sessions, _clock) = codec();
        let session = sessions.create_session("client-a").unwrap();

        let mut wire = codec.encrypt_for_sync(&payload(), &session.session_id).unwrap();
        wire.id = "note-2".into();

        assert!(matches!(
            codec.decrypt_from_sync(&wire, &session.session_id),
            Err(SyncError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn expired_session_cannot_encrypt() {
        let (codec, sessions, clock) = codec();
        let session = sessions.create_session("client-a").unwrap();

        clock.advance(SESSION_TIMEOUT_MS);
        assert!(matches!(
            codec.encrypt_for_sync(&payload(), &session.session_id),
            Err(SyncError::SessionExpired { .. })
        ));
    }
}
