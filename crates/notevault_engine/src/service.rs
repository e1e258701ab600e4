//! The vault facade tying key management, storage and sync together.

use crate::config::VaultConfig;
use crate::error::EngineResult;
use notevault_crypto::{Clock, MasterKeyManager, SystemClock};
use notevault_store::{
    BackendKeyRecordStore, BackupContainer, DowngradeStats, EncryptedStore, FileBackend,
    MemoryBackend, MigrationReport, StorageBackend,
};
use notevault_sync::{
    ConflictResolution, ConflictResolver, EncryptedSyncPayload, ResolutionStrategy, SessionStats,
    SyncCodec, SyncConflict, SyncPayload, SyncSession, SyncSessionManager,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Point-in-time view of the vault.
#[derive(Debug, Clone)]
pub struct VaultStatus {
    /// A master password has been set.
    pub initialized: bool,
    /// The master key is resident in memory.
    pub unlocked: bool,
    /// Entries in the store, across encrypted, plaintext and legacy
    /// forms.
    pub entry_count: usize,
    /// Plaintext entries awaiting migration.
    pub plaintext_count: usize,
    /// Audited plaintext-fallback writes.
    pub downgrades: DowngradeStats,
    /// Sync session registry counters.
    pub sessions: SessionStats,
}

/// What one maintenance sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// The sweep auto-locked the master key.
    pub auto_locked: bool,
    /// Sessions evicted from the registry.
    pub sessions_evicted: usize,
    /// Sync keys evicted from the registry.
    pub keys_evicted: usize,
}

/// Single entry point for applications embedding the vault.
///
/// Owns the master key manager, the encrypted store and the sync
/// machinery, wired to one shared clock so every timeout is testable.
pub struct VaultService {
    master: Arc<MasterKeyManager>,
    store: EncryptedStore,
    sessions: Arc<SyncSessionManager>,
    codec: SyncCodec,
    resolver: ConflictResolver,
}

impl VaultService {
    /// Opens a vault persisted in `path`, creating the file on first use.
    pub fn open(path: impl AsRef<Path>, config: VaultConfig) -> EngineResult<Self> {
        let backend = Arc::new(FileBackend::open(path)?);
        Ok(Self::with_backend(backend, config, Arc::new(SystemClock)))
    }

    /// Creates a vault that lives only in memory. Used by tests and
    /// ephemeral embeddings.
    #[must_use]
    pub fn in_memory(config: VaultConfig) -> Self {
        Self::with_backend(
            Arc::new(MemoryBackend::new()),
            config,
            Arc::new(SystemClock),
        )
    }

    /// Creates a vault over an arbitrary backend and clock.
    #[must_use]
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let records = Arc::new(BackendKeyRecordStore::new(backend.clone()));
        let master = Arc::new(
            MasterKeyManager::new(records, clock.clone())
                .with_auto_lock_timeout(config.auto_lock_timeout_ms),
        );
        let store = EncryptedStore::new(backend, master.clone(), clock.clone())
            .with_plaintext_fallback(config.plaintext_fallback);
        let sessions = Arc::new(SyncSessionManager::with_config(
            master.clone(),
            clock,
            config.session,
        ));
        let codec = SyncCodec::new(sessions.clone());
        let resolver = ConflictResolver::with_settings_policy(config.settings_policy);
        Self {
            master,
            store,
            sessions,
            codec,
            resolver,
        }
    }

    // --- Lifecycle ---

    /// Sets the master password on a fresh vault and unlocks it.
    pub fn initialize(&self, password: &str) -> EngineResult<()> {
        self.master.initialize(password)?;
        Ok(())
    }

    /// Unlocks with `password`. Returns false on a wrong password.
    pub fn unlock(&self, password: &str) -> EngineResult<bool> {
        Ok(self.master.unlock(password)?)
    }

    /// Drops the in-memory key. Encrypted data stays readable only after
    /// the next successful unlock.
    pub fn lock(&self) {
        self.master.lock();
    }

    /// Checks `password` without changing lock state.
    pub fn verify_password(&self, password: &str) -> EngineResult<bool> {
        Ok(self.master.verify_password(password)?)
    }

    /// Changes the master password and re-encrypts the store under the
    /// new key. Returns false when `current` is wrong.
    pub fn change_password(&self, current: &str, new: &str) -> EngineResult<bool> {
        Ok(self.store.change_password(current, new)?)
    }

    /// Current state of the vault.
    pub fn status(&self) -> EngineResult<VaultStatus> {
        Ok(VaultStatus {
            initialized: self.master.is_initialized()?,
            unlocked: self.master.is_unlocked(),
            entry_count: self.store.keys()?.len(),
            plaintext_count: self.store.plaintext_keys()?.len(),
            downgrades: self.store.downgrade_stats(),
            sessions: self.sessions.stats(),
        })
    }

    // --- Storage ---

    /// Encrypts and stores `value` under `key`.
    pub fn set(&self, key: &str, value: &Value) -> EngineResult<()> {
        self.store.set(key, value)?;
        Ok(())
    }

    /// Reads the value under `key`, decrypting as needed.
    pub fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        Ok(self.store.get(key)?)
    }

    /// Removes `key` in all of its stored forms.
    pub fn remove(&self, key: &str) -> EngineResult<()> {
        self.store.remove(key)?;
        Ok(())
    }

    /// Removes every user entry; internal records survive.
    pub fn clear(&self) -> EngineResult<()> {
        self.store.clear()?;
        Ok(())
    }

    /// Logical keys of encrypted, plaintext and legacy entries.
    pub fn keys(&self) -> EngineResult<Vec<String>> {
        Ok(self.store.keys()?)
    }

    /// Converts every plaintext and legacy entry to encrypted form.
    pub fn migrate_to_encrypted(&self) -> EngineResult<MigrationReport> {
        Ok(self.store.migrate_to_encrypted()?)
    }

    // --- Backup ---

    /// Exports the whole store as one encrypted container.
    pub fn create_backup(&self) -> EngineResult<BackupContainer> {
        Ok(self.store.create_backup()?)
    }

    /// Imports a backup container, replacing nothing on failure.
    /// Returns the number of restored entries.
    pub fn restore_from_backup(&self, container: &BackupContainer) -> EngineResult<usize> {
        Ok(self.store.restore_from_backup(container)?)
    }

    // --- Sync ---

    /// Opens a sync session for `client_id`.
    pub fn create_sync_session(&self, client_id: &str) -> EngineResult<SyncSession> {
        Ok(self.sessions.create_session(client_id)?)
    }

    /// Marks a sync session completed and returns its final state.
    pub fn complete_sync_session(&self, session_id: &str) -> EngineResult<SyncSession> {
        Ok(self.sessions.complete_session(session_id)?)
    }

    /// Encrypts `payload` under the session's sync key.
    pub fn encrypt_for_sync(
        &self,
        payload: &SyncPayload,
        session_id: &str,
    ) -> EngineResult<EncryptedSyncPayload> {
        Ok(self.codec.encrypt_for_sync(payload, session_id)?)
    }

    /// Verifies, decrypts and parses an incoming sync payload.
    pub fn decrypt_from_sync(
        &self,
        encrypted: &EncryptedSyncPayload,
        session_id: &str,
    ) -> EngineResult<SyncPayload> {
        Ok(self.codec.decrypt_from_sync(encrypted, session_id)?)
    }

    /// Attaches a detected conflict to a session for later resolution.
    pub fn record_conflict(&self, session_id: &str, conflict: SyncConflict) -> EngineResult<()> {
        self.sessions.record_conflict(session_id, conflict)?;
        Ok(())
    }

    /// Resolves `conflict` with `strategy`.
    pub fn resolve_conflict(
        &self,
        conflict: &SyncConflict,
        strategy: ResolutionStrategy,
    ) -> ConflictResolution {
        self.resolver.resolve(conflict, strategy)
    }

    // --- Maintenance ---

    /// Runs one maintenance sweep: auto-lock check, stale session and
    /// expired key eviction. Safe to call from any thread.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let auto_locked = self.master.check_auto_lock();
        let sessions_evicted = self.sessions.sweep_stale_sessions();
        let keys_evicted = self.sessions.sweep_expired_keys();
        if auto_locked || sessions_evicted > 0 || keys_evicted > 0 {
            tracing::debug!(
                auto_locked,
                sessions_evicted,
                keys_evicted,
                "maintenance sweep"
            );
        }
        MaintenanceReport {
            auto_locked,
            sessions_evicted,
            keys_evicted,
        }
    }
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("unlocked", &self.master.is_unlocked())
            .finish()
    }
}
