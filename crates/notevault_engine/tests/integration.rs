//! End-to-end tests for the vault facade.

use notevault_engine::{
    EntityType, ManualClock, ResolutionStrategy, SyncAction, SyncConflict, SyncPayload,
    VaultConfig, VaultService,
};
use notevault_store::MemoryBackend;
use notevault_sync::{ConflictResolution, SessionStatus, SYNC_SCHEMA_VERSION};
use serde_json::json;
use std::sync::Arc;

fn vault_with_clock(start_millis: u64) -> (VaultService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_millis));
    let vault = VaultService::with_backend(
        Arc::new(MemoryBackend::new()),
        VaultConfig::default(),
        clock.clone(),
    );
    (vault, clock)
}

fn unlocked_vault() -> (VaultService, Arc<ManualClock>) {
    let (vault, clock) = vault_with_clock(1_000);
    vault.initialize("correct-horse").unwrap();
    (vault, clock)
}

fn payload(id: &str, content: &str) -> SyncPayload {
    SyncPayload {
        id: id.to_string(),
        entity_type: EntityType::Notes,
        action: SyncAction::Update,
        data: json!({"id": id, "content": content}),
        timestamp: 1_000,
        schema_version: SYNC_SCHEMA_VERSION,
        client_id: "client-a".to_string(),
    }
}

#[test]
fn lock_unlock_roundtrip() {
    let (vault, _clock) = unlocked_vault();
    vault.set("note_1", &json!({"content": "meet at noon"})).unwrap();

    vault.lock();
    let status = vault.status().unwrap();
    assert!(status.initialized);
    assert!(!status.unlocked);
    assert!(vault.get("note_1").is_err_and(|e| e.is_locked()));

    assert!(vault.unlock("correct-horse").unwrap());
    assert_eq!(
        vault.get("note_1").unwrap(),
        Some(json!({"content": "meet at noon"}))
    );
}

#[test]
fn wrong_password_reveals_nothing() {
    let (vault, _clock) = unlocked_vault();
    vault.set("note_1", &json!({"content": "secret"})).unwrap();
    vault.lock();

    assert!(!vault.unlock("incorrect-horse").unwrap());
    assert!(!vault.status().unwrap().unlocked);
    assert!(vault.get("note_1").is_err_and(|e| e.is_locked()));
    assert!(vault.set("note_2", &json!({"x": 1})).is_err());
}

#[test]
fn change_password_keeps_data_and_retires_old_password() {
    let (vault, _clock) = unlocked_vault();
    vault.set("note_1", &json!({"content": "survives rekey"})).unwrap();

    assert!(!vault.change_password("wrong", "new-pw").unwrap());
    assert!(vault.change_password("correct-horse", "new-pw").unwrap());

    vault.lock();
    assert!(!vault.unlock("correct-horse").unwrap());
    assert!(vault.unlock("new-pw").unwrap());
    assert_eq!(
        vault.get("note_1").unwrap(),
        Some(json!({"content": "survives rekey"}))
    );
}

#[test]
fn auto_lock_fires_through_maintenance() {
    let (vault, clock) = unlocked_vault();
    vault.set("note_1", &json!({"content": "x"})).unwrap();

    clock.advance(VaultConfig::default().auto_lock_timeout_ms + 1);
    let report = vault.run_maintenance();
    assert!(report.auto_locked);
    assert!(!vault.status().unwrap().unlocked);
}

#[test]
fn backup_roundtrip_restores_entries() {
    let (vault, _clock) = unlocked_vault();
    vault.set("note_1", &json!({"content": "alpha"})).unwrap();
    vault.set("note_2", &json!({"content": "beta"})).unwrap();

    let backup = vault.create_backup().unwrap();
    vault.clear().unwrap();
    assert!(vault.get("note_1").unwrap().is_none());

    assert_eq!(vault.restore_from_backup(&backup).unwrap(), 2);
    assert_eq!(vault.get("note_1").unwrap(), Some(json!({"content": "alpha"})));
    assert_eq!(vault.get("note_2").unwrap(), Some(json!({"content": "beta"})));
}

#[test]
fn sync_payload_roundtrip_between_sessions() {
    let (vault, _clock) = unlocked_vault();
    let sender = vault.create_sync_session("client-a").unwrap();
    let receiver = vault.create_sync_session("client-b").unwrap();

    let original = payload("note-1", "shared across devices");
    let wire = vault.encrypt_for_sync(&original, &sender.session_id).unwrap();
    // Both sessions hold the same rotating sync key.
    let received = vault.decrypt_from_sync(&wire, &receiver.session_id).unwrap();
    assert_eq!(received, original);

    let done = vault.complete_sync_session(&sender.session_id).unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.items_processed, 1);
}

#[test]
fn expired_session_is_rejected_and_swept() {
    let (vault, clock) = unlocked_vault();
    let session = vault.create_sync_session("client-a").unwrap();

    clock.advance(VaultConfig::default().session.session_timeout_ms);
    assert!(vault
        .encrypt_for_sync(&payload("n", "late"), &session.session_id)
        .is_err());

    // Master key idled out as well; unlock before sweeping.
    vault.unlock("correct-horse").unwrap();
    clock.advance(VaultConfig::default().session.session_timeout_ms);
    let report = vault.run_maintenance();
    assert!(report.sessions_evicted >= 1);
}

#[test]
fn conflict_merge_later_timestamp_wins() {
    let (vault, _clock) = unlocked_vault();
    let session = vault.create_sync_session("client-a").unwrap();

    let conflict = SyncConflict::new(
        "note-1",
        EntityType::Notes,
        json!({"id": "note-1", "content": "older", "updatedAt": 1_000}),
        json!({"id": "note-1", "content": "newer", "updatedAt": 2_000}),
        2_500,
    );
    vault.record_conflict(&session.session_id, conflict.clone()).unwrap();
    assert_eq!(vault.status().unwrap().sessions.conflicts_recorded, 1);

    match vault.resolve_conflict(&conflict, ResolutionStrategy::Merge) {
        ConflictResolution::Resolved { value, .. } => {
            assert_eq!(value["content"], "newer");
        }
        ConflictResolution::Pending => panic!("expected resolution"),
    }
}

#[test]
fn migration_encrypts_preexisting_plaintext() {
    let clock = Arc::new(ManualClock::new(1_000));
    let vault = VaultService::with_backend(
        Arc::new(MemoryBackend::new()),
        VaultConfig::default().with_plaintext_fallback(true),
        clock,
    );
    vault.initialize("pw").unwrap();
    vault.lock();
    vault.set("note_1", &json!({"content": "written while locked"})).unwrap();

    let status = vault.status().unwrap();
    assert_eq!(status.plaintext_count, 1);
    assert_eq!(status.downgrades.count, 1);

    vault.unlock("pw").unwrap();
    let report = vault.migrate_to_encrypted().unwrap();
    assert_eq!(report.migrated, 1);

    let status = vault.status().unwrap();
    assert_eq!(status.plaintext_count, 0);
    assert_eq!(
        vault.get("note_1").unwrap(),
        Some(json!({"content": "written while locked"}))
    );
}

#[test]
fn file_backed_vault_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.json");

    {
        let vault = VaultService::open(&path, VaultConfig::default()).unwrap();
        vault.initialize("correct-horse").unwrap();
        vault.set("note_1", &json!({"content": "persisted"})).unwrap();
    }

    let vault = VaultService::open(&path, VaultConfig::default()).unwrap();
    let status = vault.status().unwrap();
    assert!(status.initialized);
    assert!(!status.unlocked);

    assert!(vault.unlock("correct-horse").unwrap());
    assert_eq!(
        vault.get("note_1").unwrap(),
        Some(json!({"content": "persisted"}))
    );
}
