//! Error types for NoteVault storage.

use notevault_crypto::CryptoError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Crypto failure (integrity, locked key, derivation, ...).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error from a file-backed backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Entry or container (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// Another process holds the backing file.
    #[error("store file locked: another process has exclusive access")]
    BackendLocked,

    /// One or more entries failed to migrate. The plaintext originals
    /// for the listed keys are preserved; nothing is lost.
    #[error("migration incomplete: {migrated} migrated, {} failed", failed.len())]
    MigrationPartial {
        /// Number of entries successfully migrated.
        migrated: usize,
        /// Logical keys whose migration failed.
        failed: Vec<String>,
    },

    /// Backup container is unparseable or carries the wrong marker or
    /// version. Restore is aborted with nothing imported.
    #[error("invalid backup format: {message}")]
    BackupFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a backup format error.
    pub fn backup_format(message: impl Into<String>) -> Self {
        Self::BackupFormat {
            message: message.into(),
        }
    }
}
