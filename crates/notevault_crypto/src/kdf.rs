//! Password key stretching using PBKDF2-HMAC-SHA256.

use crate::engine::{EncryptionKey, KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;

/// Length of a freshly generated salt in bytes.
pub const SALT_SIZE: usize = 32;

/// Lowest iteration count accepted for key derivation.
///
/// Anything below this is too cheap to brute-force; the stored key record
/// carries the count actually used so verification stays reproducible
/// across client restarts even after the default changes.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Iteration count used for newly initialized keys.
pub const DEFAULT_ITERATIONS: u32 = 210_000;

/// Derives a symmetric key from a password and salt.
///
/// Deterministic: the same inputs always produce the same key.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `iterations` is below
/// [`MIN_ITERATIONS`] or the PBKDF2 computation fails.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> CryptoResult<EncryptionKey> {
    if iterations < MIN_ITERATIONS {
        return Err(CryptoError::key_derivation(format!(
            "iteration count {iterations} is below the minimum of {MIN_ITERATIONS}"
        )));
    }
    if salt.is_empty() {
        return Err(CryptoError::key_derivation("salt must not be empty"));
    }

    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut bytes)
        .map_err(|_| CryptoError::key_derivation("PBKDF2 output length invalid"))?;

    Ok(EncryptionKey::from_array(bytes))
}

/// Generates a fresh random salt of [`SALT_SIZE`] bytes.
#[must_use]
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let salt = generate_salt();
        let k1 = derive_key("hunter2", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("hunter2", &salt, MIN_ITERATIONS).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_salt_different_key() {
        let k1 = derive_key("hunter2", &generate_salt(), MIN_ITERATIONS).unwrap();
        let k2 = derive_key("hunter2", &generate_salt(), MIN_ITERATIONS).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_password_different_key() {
        let salt = generate_salt();
        let k1 = derive_key("hunter2", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("hunter3", &salt, MIN_ITERATIONS).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn iteration_count_affects_key() {
        let salt = generate_salt();
        let k1 = derive_key("hunter2", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("hunter2", &salt, MIN_ITERATIONS + 1).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn too_few_iterations_rejected() {
        let salt = generate_salt();
        assert!(derive_key("hunter2", &salt, MIN_ITERATIONS - 1).is_err());
        assert!(derive_key("hunter2", &salt, 0).is_err());
    }

    #[test]
    fn empty_salt_rejected() {
        assert!(derive_key("hunter2", &[], MIN_ITERATIONS).is_err());
    }

    #[test]
    fn salts_are_unique() {
        let s1 = generate_salt();
        let s2 = generate_salt();
        assert_eq!(s1.len(), SALT_SIZE);
        assert_ne!(s1, s2);
    }
}
