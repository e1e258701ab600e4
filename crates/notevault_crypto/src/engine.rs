//! Authenticated encryption using AES-256-GCM with an explicit
//! integrity tag.
//!
//! ## Security model
//!
//! - AES-256-GCM with a unique 96-bit IV per encryption call
//! - Per-blob random salt; encryption and MAC subkeys are split from the
//!   caller's key with HKDF-SHA256 so the MAC key never doubles as the
//!   cipher key
//! - HMAC-SHA256 integrity tag over `ciphertext || iv`, verified in
//!   constant time BEFORE any decryption is attempted
//! - Context-scoped subkeys via HKDF so storage, sync and backup domains
//!   never share key material directly
//! - Keys are zeroized on drop

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM IV in bytes.
pub const IV_SIZE: usize = 12;
/// Size of the HMAC-SHA256 integrity tag in bytes.
pub const TAG_SIZE: usize = 32;
/// Size of the per-blob salt in bytes.
pub const BLOB_SALT_SIZE: usize = 16;

/// Algorithm identifier embedded in every blob.
pub const ALGORITHM_AES_256_GCM: &str = "aes-256-gcm";
/// Current blob schema version.
pub const BLOB_SCHEMA_VERSION: u32 = 1;

const ENC_SUBKEY_INFO: &[u8] = b"notevault-enc-v1";
const MAC_SUBKEY_INFO: &[u8] = b"notevault-mac-v1";
const CONTEXT_KEY_SALT: &[u8] = b"notevault-context-v1";

type HmacSha256 = Hmac<Sha256>;

/// A 256-bit symmetric key.
///
/// Zeroized when dropped; `Debug` never prints the material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::invalid_key_size(bytes.len(), KEY_SIZE));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Creates a key from a fixed-size array.
    #[must_use]
    pub fn from_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Never log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An immutable encrypted buffer with its integrity metadata.
///
/// The tag covers `ciphertext || iv`; a blob whose tag does not
/// recompute under the expected key is never decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// The AES-GCM ciphertext (includes the GCM tag suffix).
    pub ciphertext: Vec<u8>,
    /// The random IV used for this blob.
    pub iv: Vec<u8>,
    /// The random salt used to split the enc/mac subkeys.
    pub salt: Vec<u8>,
    /// Algorithm identifier, currently [`ALGORITHM_AES_256_GCM`].
    pub algorithm_id: String,
    /// Blob schema version.
    pub schema_version: u32,
    /// HMAC-SHA256 over `ciphertext || iv`.
    pub integrity_tag: Vec<u8>,
}

/// Encryption and MAC subkeys split from a caller key for one blob.
struct SubKeys {
    enc: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl Drop for SubKeys {
    fn drop(&mut self) {
        self.enc.fill(0);
        self.mac.fill(0);
    }
}

/// Authenticated encryption and decryption of opaque byte buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionEngine;

impl EncryptionEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encrypts `plaintext` under `key`, producing an [`EncryptedBlob`].
    ///
    /// A fresh random IV and subkey salt are generated per call; IVs are
    /// never reused for the same key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the cipher fails. Failures
    /// propagate; there is no plaintext fallback at this layer.
    pub fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> CryptoResult<EncryptedBlob> {
        let mut salt = vec![0u8; BLOB_SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut iv = vec![0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let subkeys = split_subkeys(key, &salt)?;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&subkeys.enc));
        let nonce = Nonce::from_slice(&iv);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::encryption("AES-GCM encryption error"))?;

        let integrity_tag = compute_tag(&subkeys.mac, &ciphertext, &iv)?;

        Ok(EncryptedBlob {
            ciphertext,
            iv,
            salt,
            algorithm_id: ALGORITHM_AES_256_GCM.to_string(),
            schema_version: BLOB_SCHEMA_VERSION,
            integrity_tag,
        })
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// The integrity tag is recomputed and verified first; only then is
    /// the ciphertext handed to the cipher. Any mismatch fails closed
    /// with [`CryptoError::Integrity`]; a wrong key and tampered data
    /// are deliberately indistinguishable to callers.
    pub fn decrypt(&self, blob: &EncryptedBlob, key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
        if blob.algorithm_id != ALGORITHM_AES_256_GCM {
            return Err(CryptoError::unsupported_format(format!(
                "unknown algorithm id: {}",
                blob.algorithm_id
            )));
        }
        if blob.schema_version != BLOB_SCHEMA_VERSION {
            return Err(CryptoError::unsupported_format(format!(
                "unsupported blob schema version: {}",
                blob.schema_version
            )));
        }
        if blob.iv.len() != IV_SIZE {
            return Err(CryptoError::Integrity);
        }

        let subkeys = split_subkeys(key, &blob.salt)?;

        // Verify before decrypt: untrusted ciphertext never reaches the
        // cipher. verify_slice compares in constant time.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&subkeys.mac)
            .map_err(|_| CryptoError::encryption("invalid MAC key length"))?;
        mac.update(&blob.ciphertext);
        mac.update(&blob.iv);
        mac.verify_slice(&blob.integrity_tag)
            .map_err(|_| CryptoError::Integrity)?;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&subkeys.enc));
        let nonce = Nonce::from_slice(&blob.iv);
        cipher
            .decrypt(nonce, blob.ciphertext.as_slice())
            .map_err(|_| CryptoError::Integrity)
    }

    /// Derives a context-scoped subkey from a master key.
    ///
    /// Distinct labels always yield distinct keys, so compromise of one
    /// context's data does not expose another context's key. Labels in
    /// use: `"storage"`, `"backup"`, `"sync_key_storage"`.
    pub fn derive_context_key(
        &self,
        master: &EncryptionKey,
        context: &str,
    ) -> CryptoResult<EncryptionKey> {
        let hk = Hkdf::<Sha256>::new(Some(CONTEXT_KEY_SALT), master.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(context.as_bytes(), &mut bytes)
            .map_err(|_| CryptoError::key_derivation("HKDF expand failed for context key"))?;
        Ok(EncryptionKey::from_array(bytes))
    }
}

fn split_subkeys(key: &EncryptionKey, salt: &[u8]) -> CryptoResult<SubKeys> {
    let hk = Hkdf::<Sha256>::new(Some(salt), key.as_bytes());

    let mut enc = [0u8; KEY_SIZE];
    hk.expand(ENC_SUBKEY_INFO, &mut enc)
        .map_err(|_| CryptoError::key_derivation("HKDF expand failed for enc subkey"))?;

    let mut mac = [0u8; KEY_SIZE];
    hk.expand(MAC_SUBKEY_INFO, &mut mac)
        .map_err(|_| CryptoError::key_derivation("HKDF expand failed for mac subkey"))?;

    Ok(SubKeys { enc, mac })
}

fn compute_tag(mac_key: &[u8], ciphertext: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|_| CryptoError::encryption("invalid MAC key length"))?;
    mac.update(ciphertext);
    mac.update(iv);
    Ok(mac.finalize().into_bytes().to_vec())
}
