//! Master key lifecycle: initialize, unlock, verify, lock, auto-lock.
//!
//! Exactly one master key exists per unlocked manager and it lives only
//! in memory. What gets persisted is a [`KeyRecord`] holding the
//! verification hash `SHA-256(derived_key || salt)`, the salt and the
//! iteration count, never the derived key itself.

use crate::clock::Clock;
use crate::engine::{EncryptionEngine, EncryptionKey};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{self, DEFAULT_ITERATIONS};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Inactivity window after which the master key locks itself.
pub const AUTO_LOCK_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Current key record schema version.
pub const KEY_RECORD_VERSION: u32 = 1;

/// Persisted verification material for the master key.
///
/// Contains everything needed to verify a password after a restart and
/// nothing that lets an attacker decrypt data without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// `SHA-256(derived_key || salt)`, used only for password verification.
    pub password_hash: Vec<u8>,
    /// Salt the key was derived with.
    pub salt: Vec<u8>,
    /// PBKDF2 iteration count used at derivation time.
    pub iterations: u32,
    /// When the record was created (unix millis).
    pub created_at: u64,
    /// Record schema version.
    pub version: u32,
}

/// Persistence seam for the key record.
///
/// The store crate provides a backend-backed implementation; tests use
/// [`MemoryKeyRecordStore`].
pub trait KeyRecordStore: Send + Sync {
    /// Loads the persisted record, if any.
    fn load(&self) -> CryptoResult<Option<KeyRecord>>;
    /// Persists the record, replacing any existing one.
    fn save(&self, record: &KeyRecord) -> CryptoResult<()>;
}

/// In-memory key record store.
#[derive(Debug, Default)]
pub struct MemoryKeyRecordStore {
    record: RwLock<Option<KeyRecord>>,
}

impl MemoryKeyRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyRecordStore for MemoryKeyRecordStore {
    fn load(&self) -> CryptoResult<Option<KeyRecord>> {
        Ok(self.record.read().clone())
    }

    fn save(&self, record: &KeyRecord) -> CryptoResult<()> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }
}

/// A derived-but-not-yet-committed replacement key.
///
/// Produced by [`MasterKeyManager::begin_rekey`]; the previous key stays
/// fully intact until [`MasterKeyManager::commit_rekey`] swaps it in, so
/// password changes can re-encrypt everything before committing.
pub struct RekeyCandidate {
    /// The record to persist on commit.
    pub record: KeyRecord,
    /// The derived key for the new password.
    pub key: EncryptionKey,
}

enum KeyState {
    Locked,
    Unlocked {
        key: EncryptionKey,
        last_used_at: u64,
    },
}

/// Owns the long-lived master key through its Locked/Unlocked lifecycle.
///
/// All state transitions go through one mutex, so `lock`, `unlock` and a
/// rekey commit can never interleave. Compound operations spanning
/// several calls (a password change re-encrypting a whole store) hold
/// [`operation_guard`](Self::operation_guard) in addition, which `lock`
/// and `unlock` also contend on.
pub struct MasterKeyManager {
    state: Mutex<KeyState>,
    op_lock: Mutex<()>,
    records: Arc<dyn KeyRecordStore>,
    clock: Arc<dyn Clock>,
    engine: EncryptionEngine,
    auto_lock_timeout_ms: u64,
}

impl MasterKeyManager {
    /// Creates a manager in the locked state.
    pub fn new(records: Arc<dyn KeyRecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(KeyState::Locked),
            op_lock: Mutex::new(()),
            records,
            clock,
            engine: EncryptionEngine::new(),
            auto_lock_timeout_ms: AUTO_LOCK_TIMEOUT_MS,
        }
    }

    /// Overrides the auto-lock timeout.
    #[must_use]
    pub fn with_auto_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.auto_lock_timeout_ms = timeout_ms;
        self
    }

    /// Returns true if a key record has been persisted.
    pub fn is_initialized(&self) -> CryptoResult<bool> {
        Ok(self.records.load()?.is_some())
    }

    /// Returns true if the master key is currently unlocked.
    pub fn is_unlocked(&self) -> bool {
        matches!(&*self.state.lock(), KeyState::Unlocked { .. })
    }

    /// Generates a fresh master key from `password` and unlocks.
    ///
    /// # Errors
    ///
    /// Fails with [`CryptoError::AlreadyInitialized`] if a record exists.
    pub fn initialize(&self, password: &str) -> CryptoResult<()> {
        let mut state = self.state.lock();
        if self.records.load()?.is_some() {
            return Err(CryptoError::AlreadyInitialized);
        }

        let now = self.clock.now_millis();
        let candidate = self.derive_candidate(password, now)?;
        self.records.save(&candidate.record)?;

        *state = KeyState::Unlocked {
            key: candidate.key,
            last_used_at: now,
        };
        tracing::info!("master key initialized");
        Ok(())
    }

    /// Attempts to unlock with `password`.
    ///
    /// Returns `Ok(false)` on a wrong password; the manager stays locked
    /// and no partial state is left behind.
    pub fn unlock(&self, password: &str) -> CryptoResult<bool> {
        let _op = self.op_lock.lock();
        let mut state = self.state.lock();
        let record = self.records.load()?.ok_or(CryptoError::NotInitialized)?;

        let key = kdf::derive_key(password, &record.salt, record.iterations)?;
        if verification_hash(&key, &record.salt) != record.password_hash {
            tracing::debug!("unlock rejected: password mismatch");
            return Ok(false);
        }

        *state = KeyState::Unlocked {
            key,
            last_used_at: self.clock.now_millis(),
        };
        tracing::info!("master key unlocked");
        Ok(true)
    }

    /// Verifies a password without changing lock state.
    pub fn verify_password(&self, password: &str) -> CryptoResult<bool> {
        let record = self.records.load()?.ok_or(CryptoError::NotInitialized)?;
        let key = kdf::derive_key(password, &record.salt, record.iterations)?;
        Ok(verification_hash(&key, &record.salt) == record.password_hash)
    }

    /// Drops the in-memory key material and transitions to Locked.
    ///
    /// Idempotent; the key bytes are zeroized on drop.
    pub fn lock(&self) {
        let _op = self.op_lock.lock();
        let mut state = self.state.lock();
        if matches!(&*state, KeyState::Unlocked { .. }) {
            tracing::info!("master key locked");
        }
        *state = KeyState::Locked;
    }

    /// Derives the context-scoped subkey for `context`.
    ///
    /// Records activity for the auto-lock window. Fails with
    /// [`CryptoError::Locked`] when locked, including when the inactivity
    /// window has already elapsed.
    pub fn context_key(&self, context: &str) -> CryptoResult<EncryptionKey> {
        let mut state = self.state.lock();
        let now = self.clock.now_millis();

        match &mut *state {
            KeyState::Locked => Err(CryptoError::Locked),
            KeyState::Unlocked { key, last_used_at } => {
                if now.saturating_sub(*last_used_at) > self.auto_lock_timeout_ms {
                    *state = KeyState::Locked;
                    tracing::info!("master key auto-locked after inactivity");
                    return Err(CryptoError::Locked);
                }
                *last_used_at = now;
                self.engine.derive_context_key(key, context)
            }
        }
    }

    /// Records user activity, extending the auto-lock window.
    pub fn touch(&self) {
        if let KeyState::Unlocked { last_used_at, .. } = &mut *self.state.lock() {
            *last_used_at = self.clock.now_millis();
        }
    }

    /// Locks the key if the inactivity window has elapsed.
    ///
    /// Called by the maintenance sweep. Returns true if this call
    /// performed the lock.
    pub fn check_auto_lock(&self) -> bool {
        let mut state = self.state.lock();
        if let KeyState::Unlocked { last_used_at, .. } = &*state {
            let idle = self.clock.now_millis().saturating_sub(*last_used_at);
            if idle > self.auto_lock_timeout_ms {
                *state = KeyState::Locked;
                tracing::info!(idle_ms = idle, "master key auto-locked after inactivity");
                return true;
            }
        }
        false
    }

    /// Serializes a compound key operation against `lock` and `unlock`.
    ///
    /// A password change spans several calls on this manager; callers
    /// hold this guard across the whole sequence so an explicit lock or
    /// unlock cannot interleave with it.
    pub fn operation_guard(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock()
    }

    /// Derives a replacement key for `new_password` without touching the
    /// current state.
    pub fn begin_rekey(&self, new_password: &str) -> CryptoResult<RekeyCandidate> {
        if !self.is_unlocked() {
            return Err(CryptoError::Locked);
        }
        self.derive_candidate(new_password, self.clock.now_millis())
    }

    /// Snapshot of the current record and unlocked key, used to roll a
    /// failed rekey back.
    pub fn rekey_snapshot(&self) -> CryptoResult<RekeyCandidate> {
        let state = self.state.lock();
        let record = self.records.load()?.ok_or(CryptoError::NotInitialized)?;
        match &*state {
            KeyState::Locked => Err(CryptoError::Locked),
            KeyState::Unlocked { key, .. } => Ok(RekeyCandidate {
                record,
                key: key.clone(),
            }),
        }
    }

    /// Persists `candidate` and atomically swaps the in-memory key.
    ///
    /// A manager that is Locked stays Locked: the record is replaced but
    /// the candidate key is dropped instead of resurrecting an unlocked
    /// state someone explicitly gave up.
    pub fn commit_rekey(&self, candidate: RekeyCandidate) -> CryptoResult<()> {
        let mut state = self.state.lock();
        self.records.save(&candidate.record)?;
        match &*state {
            KeyState::Unlocked { .. } => {
                *state = KeyState::Unlocked {
                    key: candidate.key,
                    last_used_at: self.clock.now_millis(),
                };
                tracing::info!("master key record replaced");
            }
            KeyState::Locked => {
                tracing::info!("master key record replaced while locked");
            }
        }
        Ok(())
    }

    fn derive_candidate(&self, password: &str, now: u64) -> CryptoResult<RekeyCandidate> {
        let salt = kdf::generate_salt();
        let key = kdf::derive_key(password, &salt, DEFAULT_ITERATIONS)?;
        let record = KeyRecord {
            password_hash: verification_hash(&key, &salt),
            salt,
            iterations: DEFAULT_ITERATIONS,
            created_at: now,
            version: KEY_RECORD_VERSION,
        };
        Ok(RekeyCandidate { record, key })
    }
}

impl std::fmt::Debug for MasterKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyManager")
            .field("unlocked", &self.is_unlocked())
            .field("auto_lock_timeout_ms", &self.auto_lock_timeout_ms)
            .finish()
    }
}

fn verification_hash(key: &EncryptionKey, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(salt);
    hasher.finalize().to_vec()
}
