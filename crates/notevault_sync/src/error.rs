//! Error types for the sync layer.

use notevault_crypto::CryptoError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Crypto failure (integrity, locked master key, derivation, ...).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The session is unknown, evicted or past its inactivity timeout.
    /// The caller must create a new session; one is never created
    /// implicitly.
    #[error("unknown or expired sync session: {session_id}")]
    SessionExpired {
        /// The offending session id.
        session_id: String,
    },

    /// Payload (de)serialization failed.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payload violates the sync contract.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the violation.
        message: String,
    },
}

impl SyncError {
    /// Creates a session-expired error.
    pub fn session_expired(session_id: impl Into<String>) -> Self {
        Self::SessionExpired {
            session_id: session_id.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}
