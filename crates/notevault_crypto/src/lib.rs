//! # NoteVault Crypto
//!
//! Key derivation, authenticated encryption and master key lifecycle for
//! the NoteVault zero-knowledge engine.
//!
//! This crate provides:
//! - PBKDF2-HMAC-SHA256 password stretching ([`kdf`])
//! - AES-256-GCM encryption with an explicit HMAC integrity tag and
//!   context-scoped subkeys ([`engine`])
//! - The Locked/Unlocked master key state machine with auto-lock
//!   ([`master_key`])
//! - An injectable time source so expiry behavior is testable ([`clock`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod master_key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EncryptedBlob, EncryptionEngine, EncryptionKey, ALGORITHM_AES_256_GCM, BLOB_SCHEMA_VERSION,
    IV_SIZE, KEY_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, generate_salt, DEFAULT_ITERATIONS, MIN_ITERATIONS, SALT_SIZE};
pub use master_key::{
    KeyRecord, KeyRecordStore, MasterKeyManager, MemoryKeyRecordStore, RekeyCandidate,
    AUTO_LOCK_TIMEOUT_MS,
};
