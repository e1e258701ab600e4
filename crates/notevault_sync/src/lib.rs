//! # NoteVault Sync
//!
//! Session management, payload encryption and conflict resolution for
//! syncing encrypted records between clients.
//!
//! This crate provides:
//! - Sync sessions pinned to rotating, encrypted-at-rest sync keys
//!   ([`session`])
//! - The wire codec turning payloads into ciphertext envelopes
//!   ([`codec`] and [`payload`])
//! - Deterministic, entity-aware conflict resolution ([`conflict`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod conflict;
pub mod error;
pub mod payload;
pub mod session;

pub use codec::SyncCodec;
pub use conflict::{
    ConflictResolution, ConflictResolver, ResolutionStrategy, SettingsMergePolicy, SyncConflict,
};
pub use error::{SyncError, SyncResult};
pub use payload::{
    EncryptedSyncPayload, EntityType, SyncAction, SyncPayload, SYNC_SCHEMA_VERSION,
};
pub use session::{
    SessionStats, SessionStatus, SyncKey, SyncSession, SyncSessionConfig, SyncSessionManager,
    COMPLETED_GRACE_MS, KEY_ROTATION_INTERVAL_MS, SESSION_TIMEOUT_MS, SYNC_KEY_CONTEXT,
};
