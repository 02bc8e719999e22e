//! Envelope encryption/decryption using PBKDF2 + AES-GCM
//!
//! This module implements passphrase-based encryption producing
//! self-describing [`SecretEnvelope`] values:
//! - PBKDF2-HMAC (SHA-256 by default) for key derivation from the passphrase
//! - AES-GCM for authenticated encryption (ciphertext followed by the tag)
//!
//! Every call mints its own random salt and IV, so there is no shared
//! state between calls and no nonce bookkeeping. The resolved derivation
//! parameters are stamped into the envelope's `meta`, and decryption reads
//! them back from there - never from the module's current defaults.

use aes_gcm::aead::consts::{U12, U13, U14, U15, U16};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::{Aes128, Aes256};
use aes_gcm::{AesGcm, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use rand::TryRng;
use rand::rngs::SysRng;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::envelope::{ENVELOPE_VERSION, EnvelopeMeta, EnvelopeOptions, KdfDigest, SecretEnvelope};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Number of random bytes behind a generated passphrase.
const GENERATED_PASSPHRASE_BYTES: usize = 32;

/// The one message every decryption failure carries. An incorrect
/// passphrase, a flipped ciphertext bit, and a truncated payload must be
/// indistinguishable to the caller.
const DECRYPTION_FAILED_MSG: &str =
    "unable to decrypt: corrupt envelope, tampered-with data, or bad passphrase";

/// A key derived from a passphrase, usable only for sealing and opening
/// within this module. The raw bytes never leave this type and are wiped
/// from memory on drop.
struct DerivedKey(Zeroizing<Vec<u8>>);

impl DerivedKey {
    fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
    }
}

/// Encrypt a plaintext string with a passphrase using the default
/// envelope parameters.
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<SecretEnvelope> {
    encrypt_with_options(plaintext, passphrase, &EnvelopeOptions::default())
}

/// Encrypt a plaintext string with a passphrase, overriding envelope
/// parameters.
///
/// The resolved parameters are embedded in the returned envelope's `meta`,
/// making the envelope self-describing: [`decrypt`] needs only the
/// envelope and the passphrase.
pub fn encrypt_with_options(
    plaintext: &str,
    passphrase: &str,
    options: &EnvelopeOptions,
) -> Result<SecretEnvelope> {
    if plaintext.is_empty() {
        return Err(invalid_input("plaintext must not be empty"));
    }
    if passphrase.is_empty() {
        return Err(invalid_input("passphrase must not be empty"));
    }

    let meta = options.resolve()?;
    let salt = random_bytes(meta.salt_bytes)?;
    let iv = random_bytes(meta.iv_bytes)?;

    let key = derive_key(passphrase, &salt, &meta);
    let sealed = seal(&key, &iv, plaintext.as_bytes(), meta.tag_length)?;

    Ok(SecretEnvelope {
        version: ENVELOPE_VERSION.to_string(),
        ciphertext: BASE64_STANDARD.encode(&sealed),
        iv: BASE64_STANDARD.encode(&iv[..]),
        salt: BASE64_STANDARD.encode(&salt[..]),
        created_at: Utc::now(),
        meta,
    })
}

/// Decrypt an envelope with a passphrase, returning the original
/// plaintext string.
///
/// Key derivation uses exactly the parameters stored in `envelope.meta`,
/// so envelopes written under older defaults keep decrypting as defaults
/// evolve.
pub fn decrypt(envelope: &SecretEnvelope, passphrase: &str) -> Result<String> {
    if passphrase.is_empty() {
        return Err(invalid_input("passphrase must not be empty"));
    }
    envelope.validate()?;
    let meta = &envelope.meta;

    let salt = decode_field(&envelope.salt)?;
    let iv = decode_field(&envelope.iv)?;
    let sealed = decode_field(&envelope.ciphertext)?;
    if salt.len() != meta.salt_bytes || iv.len() != meta.iv_bytes {
        return Err(decryption_failed());
    }

    let key = derive_key(passphrase, &salt, meta);
    let plaintext = open(&key, &iv, &sealed, meta.tag_length)?;

    String::from_utf8(plaintext).map_err(|_| {
        VaultError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "authenticated plaintext is not valid UTF-8",
        )
    })
}

/// Generate a random passphrase: 32 bytes from the secure random source,
/// base64-encoded. The raw bytes exist only on this call's stack and are
/// wiped before returning.
pub fn generate_passphrase() -> Result<String> {
    let bytes = random_bytes(GENERATED_PASSPHRASE_BYTES)?;
    Ok(BASE64_STANDARD.encode(&bytes[..]))
}

/// Derive a symmetric key from a passphrase using the parameters in `meta`.
fn derive_key(passphrase: &str, salt: &[u8], meta: &EnvelopeMeta) -> DerivedKey {
    let mut key = Zeroizing::new(vec![0u8; meta.key_length]);
    match meta.digest {
        KdfDigest::Sha256 => {
            pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, meta.iterations, &mut key)
        }
        KdfDigest::Sha384 => {
            pbkdf2_hmac::<Sha384>(passphrase.as_bytes(), salt, meta.iterations, &mut key)
        }
        KdfDigest::Sha512 => {
            pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, meta.iterations, &mut key)
        }
    }
    DerivedKey(key)
}

/// Fill a fresh buffer from the OS random source.
///
/// A failing or absent OS RNG surfaces immediately as `CryptoUnavailable`
/// rather than degrading to a weaker source.
fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    SysRng.try_fill_bytes(&mut buf).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoUnavailable,
            "secure random source unavailable",
            e,
        )
    })?;
    Ok(buf)
}

fn decode_field(field: &str) -> Result<Vec<u8>> {
    // A field that fails to decode is corruption like any other; it must
    // not be reported differently from an authentication failure.
    BASE64_STANDARD
        .decode(field)
        .map_err(|_| decryption_failed())
}

fn seal(key: &DerivedKey, iv: &[u8], plaintext: &[u8], tag_length: u32) -> Result<Vec<u8>> {
    if iv.len() != 12 {
        return Err(internal_invariant("sealing with a non-12-byte nonce"));
    }
    match (key.bytes().len(), tag_length) {
        (16, 96) => gcm_seal::<AesGcm<Aes128, U12, U12>>(key.bytes(), iv, plaintext),
        (16, 104) => gcm_seal::<AesGcm<Aes128, U12, U13>>(key.bytes(), iv, plaintext),
        (16, 112) => gcm_seal::<AesGcm<Aes128, U12, U14>>(key.bytes(), iv, plaintext),
        (16, 120) => gcm_seal::<AesGcm<Aes128, U12, U15>>(key.bytes(), iv, plaintext),
        (16, 128) => gcm_seal::<AesGcm<Aes128, U12, U16>>(key.bytes(), iv, plaintext),
        (32, 96) => gcm_seal::<AesGcm<Aes256, U12, U12>>(key.bytes(), iv, plaintext),
        (32, 104) => gcm_seal::<AesGcm<Aes256, U12, U13>>(key.bytes(), iv, plaintext),
        (32, 112) => gcm_seal::<AesGcm<Aes256, U12, U14>>(key.bytes(), iv, plaintext),
        (32, 120) => gcm_seal::<AesGcm<Aes256, U12, U15>>(key.bytes(), iv, plaintext),
        (32, 128) => gcm_seal::<AesGcm<Aes256, U12, U16>>(key.bytes(), iv, plaintext),
        _ => Err(internal_invariant("sealing with unvalidated cipher parameters")),
    }
}

fn open(key: &DerivedKey, iv: &[u8], sealed: &[u8], tag_length: u32) -> Result<Vec<u8>> {
    if iv.len() != 12 {
        return Err(internal_invariant("opening with a non-12-byte nonce"));
    }
    match (key.bytes().len(), tag_length) {
        (16, 96) => gcm_open::<AesGcm<Aes128, U12, U12>>(key.bytes(), iv, sealed),
        (16, 104) => gcm_open::<AesGcm<Aes128, U12, U13>>(key.bytes(), iv, sealed),
        (16, 112) => gcm_open::<AesGcm<Aes128, U12, U14>>(key.bytes(), iv, sealed),
        (16, 120) => gcm_open::<AesGcm<Aes128, U12, U15>>(key.bytes(), iv, sealed),
        (16, 128) => gcm_open::<AesGcm<Aes128, U12, U16>>(key.bytes(), iv, sealed),
        (32, 96) => gcm_open::<AesGcm<Aes256, U12, U12>>(key.bytes(), iv, sealed),
        (32, 104) => gcm_open::<AesGcm<Aes256, U12, U13>>(key.bytes(), iv, sealed),
        (32, 112) => gcm_open::<AesGcm<Aes256, U12, U14>>(key.bytes(), iv, sealed),
        (32, 120) => gcm_open::<AesGcm<Aes256, U12, U15>>(key.bytes(), iv, sealed),
        (32, 128) => gcm_open::<AesGcm<Aes256, U12, U16>>(key.bytes(), iv, sealed),
        _ => Err(internal_invariant("opening with unvalidated cipher parameters")),
    }
}

fn gcm_seal<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| internal_invariant("cipher rejected the derived key length"))?;
    let nonce = Nonce::<C::NonceSize>::from_slice(iv);
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| internal_invariant("AES-GCM encryption failed"))
}

fn gcm_open<C>(key: &[u8], iv: &[u8], sealed: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| internal_invariant("cipher rejected the derived key length"))?;
    let nonce = Nonce::<C::NonceSize>::from_slice(iv);
    cipher.decrypt(nonce, sealed).map_err(|_| decryption_failed())
}

fn invalid_input(msg: &str) -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::InvalidInput, msg)
}

fn decryption_failed() -> VaultError {
    VaultError::with_kind(
        ErrorCategory::User,
        ErrorKind::DecryptionFailed,
        DECRYPTION_FAILED_MSG,
    )
}

fn internal_invariant(msg: &str) -> VaultError {
    VaultError::with_kind(ErrorCategory::Internal, ErrorKind::InternalInvariant, msg)
}
