//! Sync session and sync-key lifecycle.
//!
//! Sessions are short-lived handles a client holds while pushing and
//! pulling payloads. Each session pins a sync key: a random 256-bit key
//! stored only in encrypted form, wrapped under a subkey of the master
//! key. Sync keys rotate on an interval; old keys stay resident until no
//! live session references them, so in-flight sessions keep decrypting.

use crate::conflict::SyncConflict;
use crate::error::{SyncError, SyncResult};
use notevault_crypto::{Clock, EncryptedBlob, EncryptionEngine, EncryptionKey, MasterKeyManager};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Idle sessions older than this are swept.
pub const SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1000;
/// A sync key is replaced by a fresh one after this long.
pub const KEY_ROTATION_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;
/// Completed sessions linger this long before eviction.
pub const COMPLETED_GRACE_MS: u64 = 5 * 60 * 1000;
/// Context label for the subkey that wraps sync key material.
pub const SYNC_KEY_CONTEXT: &str = "sync_key_storage";
/// Current sync key record version.
pub const SYNC_KEY_VERSION: u32 = 1;

/// Lifecycle state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is live and may encrypt or decrypt payloads.
    Active,
    /// Session finished normally.
    Completed,
    /// Session was abandoned or timed out.
    Failed,
}

/// A sync key record. Key material is held only in encrypted form;
/// plaintext exists transiently inside [`SyncSessionManager::session_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncKey {
    /// Identifier sessions pin.
    pub key_id: String,
    /// Key material wrapped under the sync-key-storage subkey.
    pub encrypted_key_material: EncryptedBlob,
    /// Creation time (unix millis).
    pub created_at: u64,
    /// Rotation deadline (unix millis).
    pub expires_at: u64,
    /// Record version.
    pub version: u32,
}

impl SyncKey {
    /// Whether the key is past its rotation deadline at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// A live sync exchange between one client and the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// Unique session id.
    pub session_id: String,
    /// Client that opened the session.
    pub client_id: String,
    /// Sync key this session encrypts and decrypts with.
    pub key_id: String,
    /// When the session was opened (unix millis).
    pub started_at: u64,
    /// Last payload activity (unix millis).
    pub last_activity_at: u64,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Payloads encrypted or decrypted through this session.
    pub items_processed: u64,
    /// Conflicts detected while this session was syncing.
    pub conflicts: Vec<SyncConflict>,
}

impl SyncSession {
    fn is_stale(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_activity_at) >= timeout_ms
    }
}

/// Tunables for session and key lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct SyncSessionConfig {
    /// Idle timeout before an active session is failed.
    pub session_timeout_ms: u64,
    /// How long a sync key serves new sessions.
    pub key_rotation_interval_ms: u64,
    /// How long completed sessions remain queryable.
    pub completed_grace_ms: u64,
}

impl Default for SyncSessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: SESSION_TIMEOUT_MS,
            key_rotation_interval_ms: KEY_ROTATION_INTERVAL_MS,
            completed_grace_ms: COMPLETED_GRACE_MS,
        }
    }
}

/// Counters describing the session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Sessions currently active.
    pub active_sessions: u64,
    /// Completed sessions still within grace.
    pub completed_sessions: u64,
    /// Failed sessions not yet swept.
    pub failed_sessions: u64,
    /// Resident sync keys.
    pub sync_keys: u64,
    /// Total payloads processed across all resident sessions.
    pub items_processed: u64,
    /// Total conflicts recorded across all resident sessions.
    pub conflicts_recorded: u64,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SyncSession>,
    keys: HashMap<String, SyncKey>,
}

/// Creates sessions, mints and rotates sync keys, and tracks activity.
pub struct SyncSessionManager {
    master: Arc<MasterKeyManager>,
    clock: Arc<dyn Clock>,
    engine: EncryptionEngine,
    config: SyncSessionConfig,
    inner: RwLock<Registry>,
}

impl SyncSessionManager {
    /// Creates a manager over `master` with default lifetimes.
    #[must_use]
    pub fn new(master: Arc<MasterKeyManager>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(master, clock, SyncSessionConfig::default())
    }

    /// Creates a manager with explicit lifetimes.
    #[must_use]
    pub fn with_config(
        master: Arc<MasterKeyManager>,
        clock: Arc<dyn Clock>,
        config: SyncSessionConfig,
    ) -> Self {
        Self {
            master,
            clock,
            engine: EncryptionEngine::new(),
            config,
            inner: RwLock::new(Registry::default()),
        }
    }

    /// Opens a session for `client_id`.
    ///
    /// Requires the vault to be unlocked. Reuses the newest unexpired
    /// sync key, or mints a fresh one when none qualifies.
    pub fn create_session(&self, client_id: &str) -> SyncResult<SyncSession> {
        let wrap_key = self.master.context_key(SYNC_KEY_CONTEXT)?;
        let now = self.clock.now_millis();

        let mut inner = self.inner.write();
        let key_id = match self.current_key_id(&inner, now) {
            Some(id) => id,
            None => {
                let key = self.mint_key(&wrap_key, now)?;
                let id = key.key_id.clone();
                tracing::debug!(key_id = %id, "minted sync key");
                inner.keys.insert(id.clone(), key);
                id
            }
        };

        let session = SyncSession {
            session_id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            key_id,
            started_at: now,
            last_activity_at: now,
            status: SessionStatus::Active,
            items_processed: 0,
            conflicts: Vec::new(),
        };
        tracing::debug!(session_id = %session.session_id, client_id, "sync session opened");
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    fn current_key_id(&self, inner: &Registry, now: u64) -> Option<String> {
        inner
            .keys
            .values()
            .filter(|k| !k.is_expired(now))
            .max_by_key(|k| k.created_at)
            .map(|k| k.key_id.clone())
    }

    fn mint_key(&self, wrap_key: &EncryptionKey, now: u64) -> SyncResult<SyncKey> {
        let mut material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut material);
        let encrypted_key_material = self.engine.encrypt(&material, wrap_key)?;
        material.fill(0);
        Ok(SyncKey {
            key_id: Uuid::new_v4().to_string(),
            encrypted_key_material,
            created_at: now,
            expires_at: now + self.config.key_rotation_interval_ms,
            version: SYNC_KEY_VERSION,
        })
    }

    /// Unwraps the sync key for `session_id` and records activity.
    ///
    /// Fails with [`SyncError::SessionExpired`] when the session is
    /// missing, no longer active, or has idled past the timeout.
    pub fn session_key(&self, session_id: &str) -> SyncResult<EncryptionKey> {
        let now = self.clock.now_millis();

        // Validate the session before touching the master key: traffic
        // against a dead session must not extend the auto-lock window.
        let mut inner = self.inner.write();
        let timeout = self.config.session_timeout_ms;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::session_expired(session_id))?;
        if session.status != SessionStatus::Active {
            return Err(SyncError::session_expired(session_id));
        }
        if session.is_stale(now, timeout) {
            session.status = SessionStatus::Failed;
            tracing::debug!(session_id, "sync session timed out");
            return Err(SyncError::session_expired(session_id));
        }
        session.last_activity_at = now;
        let key_id = session.key_id.clone();

        let key = inner
            .keys
            .get(&key_id)
            .ok_or_else(|| SyncError::session_expired(session_id))?;
        let wrap_key = self.master.context_key(SYNC_KEY_CONTEXT)?;
        let material = self
            .engine
            .decrypt(&key.encrypted_key_material, &wrap_key)?;
        Ok(EncryptionKey::from_bytes(&material)?)
    }

    /// Bumps the processed-payload counter and activity time.
    pub fn note_payload_processed(&self, session_id: &str) -> SyncResult<()> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::session_expired(session_id))?;
        session.items_processed += 1;
        session.last_activity_at = now;
        Ok(())
    }

    /// Attaches a detected conflict to the session.
    pub fn record_conflict(&self, session_id: &str, conflict: SyncConflict) -> SyncResult<()> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::session_expired(session_id))?;
        session.conflicts.push(conflict);
        session.last_activity_at = now;
        Ok(())
    }

    /// Marks the session completed. It stays queryable for the grace
    /// period, then [`sweep_stale_sessions`](Self::sweep_stale_sessions)
    /// evicts it.
    pub fn complete_session(&self, session_id: &str) -> SyncResult<SyncSession> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::session_expired(session_id))?;
        session.status = SessionStatus::Completed;
        session.last_activity_at = now;
        tracing::debug!(session_id, items = session.items_processed, "sync session completed");
        Ok(session.clone())
    }

    /// Returns a snapshot of the session, if still resident.
    pub fn session(&self, session_id: &str) -> Option<SyncSession> {
        self.inner.read().sessions.get(session_id).cloned()
    }

    /// Fails idle active sessions and evicts completed ones past grace
    /// and failed ones past the idle timeout. Returns evictions.
    pub fn sweep_stale_sessions(&self) -> usize {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();

        for session in inner.sessions.values_mut() {
            if session.status == SessionStatus::Active
                && session.is_stale(now, self.config.session_timeout_ms)
            {
                tracing::debug!(session_id = %session.session_id, "failing idle sync session");
                session.status = SessionStatus::Failed;
            }
        }

        let grace = self.config.completed_grace_ms;
        let timeout = self.config.session_timeout_ms;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| match s.status {
            SessionStatus::Active => true,
            SessionStatus::Completed => now.saturating_sub(s.last_activity_at) < grace,
            SessionStatus::Failed => now.saturating_sub(s.last_activity_at) < timeout,
        });
        before - inner.sessions.len()
    }

    /// Drops expired sync keys not referenced by any resident session.
    /// Returns evictions.
    pub fn sweep_expired_keys(&self) -> usize {
        let now = self.clock.now_millis();
        let mut inner = self.inner.write();
        let referenced: Vec<String> = inner
            .sessions
            .values()
            .map(|s| s.key_id.clone())
            .collect();
        let before = inner.keys.len();
        inner
            .keys
            .retain(|id, key| !key.is_expired(now) || referenced.iter().any(|r| r == id));
        before - inner.keys.len()
    }

    /// Aggregate counters over the registry.
    pub fn stats(&self) -> SessionStats {
        let inner = self.inner.read();
        let mut stats = SessionStats {
            sync_keys: inner.keys.len() as u64,
            ..SessionStats::default()
        };
        for session in inner.sessions.values() {
            match session.status {
                SessionStatus::Active => stats.active_sessions += 1,
                SessionStatus::Completed => stats.completed_sessions += 1,
                SessionStatus::Failed => stats.failed_sessions += 1,
            }
            stats.items_processed += session.items_processed;
            stats.conflicts_recorded += session.conflicts.len() as u64;
        }
        stats
    }
}
