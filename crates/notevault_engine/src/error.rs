//! Engine-level error type.

use notevault_crypto::CryptoError;
use notevault_store::StoreError;
use notevault_sync::SyncError;
use thiserror::Error;

/// Any failure surfaced by the vault facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Key derivation, encryption or master key state failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Storage backend or persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sync session, codec or payload failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True when the failure is the master key being locked.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::Locked)
                | Self::Store(StoreError::Crypto(CryptoError::Locked))
                | Self::Sync(SyncError::Crypto(CryptoError::Locked))
        )
    }
}
