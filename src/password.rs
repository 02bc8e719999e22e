//! Account password hashing
//!
//! Salted, deliberately slow password storage for login credentials,
//! independent of the secret envelope. The stored format is a single
//! string `hex(salt):hex(derived key)` with scrypt as the key derivation
//! function. The cost factor is owned by this module and appears nowhere
//! in the stored format beyond the salt, so it can be tuned centrally
//! without touching call sites.

use rand::TryRng;
use rand::rngs::SysRng;
use scrypt::{Params, scrypt};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Length of the random salt in bytes.
const SALT_LEN: usize = 16;

/// Length of the derived key in bytes.
const KEY_LEN: usize = 64;

/// scrypt N parameter (CPU/memory cost), as log2.
const SCRYPT_LOG_N: u8 = 15;

/// scrypt r parameter (block size).
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization).
const SCRYPT_P: u32 = 1;

/// Hash a password for storage.
///
/// A fresh random salt goes into every call, so hashing the same password
/// twice yields two different stored strings.
pub fn hash(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    SysRng.try_fill_bytes(&mut salt).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoUnavailable,
            "secure random source unavailable",
            e,
        )
    })?;

    let key = derive(password.as_bytes(), &salt)?;
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(&key[..])))
}

/// Verify a password against a stored hash.
///
/// Returns `false` for a wrong password and for any malformed stored
/// value; a wrong password is an expected outcome, not an error. The
/// comparison against the stored key runs in constant time.
pub fn verify(password: &str, stored: &str) -> bool {
    let Some((salt_hex, key_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(stored_key) = hex::decode(key_hex) else {
        return false;
    };
    if stored_key.len() != KEY_LEN {
        return false;
    }

    let Ok(key) = derive(password.as_bytes(), &salt) else {
        return false;
    };
    constant_time_eq(&key[..], &stored_key)
}

/// Derive a key from a password and salt using the module's cost factor.
fn derive(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoUnavailable,
            "failed to create scrypt params",
            e,
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(password, salt, &params, &mut key[..]).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoUnavailable,
            "scrypt key derivation failed",
            e,
        )
    })?;

    Ok(key)
}

/// Equality check whose duration does not depend on where the first
/// differing byte occurs. Length mismatches short-circuit; lengths are
/// not secret here.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &stored));
        assert!(!verify("incorrect horse battery staple", &stored));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let first = hash("same-password").unwrap();
        let second = hash("same-password").unwrap();
        assert_ne!(first, second);
        assert!(verify("same-password", &first));
        assert!(verify("same-password", &second));
    }

    #[test]
    fn test_stored_format_shape() {
        let stored = hash("shape-check").unwrap();
        let (salt_hex, key_hex) = stored.split_once(':').unwrap();
        assert_eq!(salt_hex.len(), SALT_LEN * 2);
        assert_eq!(key_hex.len(), KEY_LEN * 2);
        assert!(salt_hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(key_hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_malformed_stored_values_verify_false() {
        assert!(!verify("anything", "malformed-no-colon"));
        assert!(!verify("anything", ""));
        assert!(!verify("anything", ":"));
        assert!(!verify("anything", "not-hex:also-not-hex"));
        // Valid hex, wrong derived-key length.
        assert!(!verify("anything", "00112233445566778899aabbccddeeff:00ff"));
    }

    #[test]
    fn test_empty_password_round_trips() {
        let stored = hash("").unwrap();
        assert!(verify("", &stored));
        assert!(!verify("nonempty", &stored));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"abc", b""));
    }
}
