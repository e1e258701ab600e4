//! # NoteVault Store
//!
//! Encrypted key/value persistence for the NoteVault engine.
//!
//! This crate provides:
//! - The [`StorageBackend`] trait with in-memory and file backends
//! - [`EncryptedStore`]: transparent encryption on write, decryption on
//!   read, plaintext fallback policy and bulk migration
//! - Encrypted full-store backup and restore
//! - Password change with all-or-nothing re-encryption
//! - Backend-backed persistence for the master key record

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod backup;
pub mod error;
pub mod file;
pub mod record_store;
mod rekey;
pub mod store;

pub use backend::{MemoryBackend, StorageBackend};
pub use backup::{BackupContainer, BACKUP_CONTEXT, BACKUP_VERSION};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use record_store::{BackendKeyRecordStore, KEY_RECORD_KEY};
pub use store::{
    DowngradeStats, EncryptedStore, MigrationReport, StorageEntry, PREFIX_ENCRYPTED, PREFIX_PLAIN,
    PREFIX_RESERVED, STORAGE_CONTEXT,
};
