//! # NoteVault Engine
//!
//! The top-level facade for embedding the NoteVault zero-knowledge
//! vault: one [`VaultService`] wires the master key lifecycle, the
//! encrypted store, backup, sync sessions and conflict resolution
//! behind a single API, with a background [`MaintenanceScheduler`]
//! driving auto-lock and session expiry.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod maintenance;
pub mod service;

pub use config::{VaultConfig, MAINTENANCE_INTERVAL_MS};
pub use error::{EngineError, EngineResult};
pub use maintenance::MaintenanceScheduler;
pub use service::{MaintenanceReport, VaultService, VaultStatus};

pub use notevault_crypto::{Clock, ManualClock, SystemClock};
pub use notevault_store::{BackupContainer, MigrationReport};
pub use notevault_sync::{
    ConflictResolution, EncryptedSyncPayload, EntityType, ResolutionStrategy, SettingsMergePolicy,
    SyncAction, SyncConflict, SyncPayload, SyncSession,
};
