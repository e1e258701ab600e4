//! Error types for NoteVault crypto operations.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (RNG unavailable, bad parameters).
    #[error("key derivation failed: {message}")]
    KeyDerivation {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed. Fatal to the calling operation; never falls
    /// back to plaintext.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Integrity check failed on decrypt. Covers both tampering and a
    /// wrong key; callers must treat the two identically and fail closed.
    #[error("integrity check failed: data is corrupted or was tampered with")]
    Integrity,

    /// Wrong password supplied for an operation that requires one.
    #[error("authentication failed: incorrect password")]
    Authentication,

    /// The master key is locked.
    #[error("master key is locked")]
    Locked,

    /// No master key has been initialized yet.
    #[error("master key is not initialized")]
    NotInitialized,

    /// A master key already exists.
    #[error("master key is already initialized")]
    AlreadyInitialized,

    /// Key material has the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Blob carries an algorithm id or schema version we cannot handle.
    #[error("unsupported blob format: {message}")]
    UnsupportedFormat {
        /// Description of the mismatch.
        message: String,
    },

    /// Persisting or loading the key record failed.
    #[error("key record storage failed: {message}")]
    RecordStorage {
        /// Description of the failure.
        message: String,
    },
}

impl CryptoError {
    /// Creates a key derivation error.
    pub fn key_derivation(message: impl Into<String>) -> Self {
        Self::KeyDerivation {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /// Creates a key record storage error.
    pub fn record_storage(message: impl Into<String>) -> Self {
        Self::RecordStorage {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }
}
