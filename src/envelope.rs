//! Versioned secret envelope format
//!
//! Defines the self-describing envelope structure produced by encryption:
//! base64 ciphertext/IV/salt plus the complete set of key derivation
//! parameters needed to reproduce the key from a passphrase. The JSON
//! wire format is:
//!
//! ```json
//! {
//!   "version": "v1",
//!   "ciphertext": "<base64>",
//!   "iv": "<base64>",
//!   "salt": "<base64>",
//!   "createdAt": "<ISO-8601>",
//!   "meta": {
//!     "algorithm": "AES-GCM",
//!     "keyDerivation": "PBKDF2",
//!     "digest": "SHA-256",
//!     "iterations": 100000,
//!     "keyLength": 32,
//!     "saltBytes": 16,
//!     "ivBytes": 12,
//!     "tagLength": 128
//!   }
//! }
//! ```
//!
//! Because every derivation parameter travels inside `meta`, decryption
//! depends on nothing but the envelope and the passphrase; the module's
//! defaults can change without breaking envelopes already written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Envelope format version produced by this module.
pub const ENVELOPE_VERSION: &str = "v1";

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Default derived key length in bytes (AES-256).
pub const DEFAULT_KEY_LENGTH: usize = 32;

/// Default salt length in bytes.
pub const DEFAULT_SALT_BYTES: usize = 16;

/// Default IV length in bytes (the GCM standard nonce size).
pub const DEFAULT_IV_BYTES: usize = 12;

/// Default authentication tag length in bits.
pub const DEFAULT_TAG_LENGTH: u32 = 128;

/// Cipher identifier carried in envelope metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[serde(rename = "AES-GCM")]
    AesGcm,
}

/// Key derivation function identifier carried in envelope metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDerivation {
    #[serde(rename = "PBKDF2")]
    Pbkdf2,
}

/// Hash function driving PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfDigest {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[serde(rename = "SHA-512")]
    Sha512,
}

/// Algorithm parameters embedded in every envelope.
///
/// Invariant: holds everything needed to re-derive the encryption key from
/// the passphrase. Decryption reads these stored values, never the current
/// module defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub algorithm: CipherAlgorithm,
    pub key_derivation: KeyDerivation,
    pub digest: KdfDigest,
    /// PBKDF2 work factor.
    pub iterations: u32,
    /// Derived key length in bytes.
    pub key_length: usize,
    /// Salt length in bytes.
    pub salt_bytes: usize,
    /// Nonce length in bytes.
    pub iv_bytes: usize,
    /// Authentication tag length in bits.
    pub tag_length: u32,
}

impl EnvelopeMeta {
    /// Checks that the parameters fall within the ranges this
    /// implementation can execute. Runs before any key derivation so that
    /// unsupported parameters never reach the crypto layer.
    pub fn validate(&self) -> Result<()> {
        if self.iterations < 1 {
            return Err(invalid("iterations must be at least 1"));
        }
        if self.key_length != 16 && self.key_length != 32 {
            return Err(invalid(format!(
                "unsupported key length {} (expected 16 or 32 bytes)",
                self.key_length
            )));
        }
        if self.salt_bytes < 8 || self.salt_bytes > 64 {
            return Err(invalid(format!(
                "unsupported salt length {} (expected 8 through 64 bytes)",
                self.salt_bytes
            )));
        }
        if self.iv_bytes != 12 {
            return Err(invalid(format!(
                "unsupported IV length {} (AES-GCM uses 12-byte nonces)",
                self.iv_bytes
            )));
        }
        if !matches!(self.tag_length, 96 | 104 | 112 | 120 | 128) {
            return Err(invalid(format!(
                "unsupported tag length {} bits",
                self.tag_length
            )));
        }
        Ok(())
    }
}

/// One sealed secret. Immutable once created; consumed, never mutated,
/// by decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEnvelope {
    /// Format tag for forward compatibility.
    pub version: String,
    /// Base64 AEAD output (ciphertext followed by the authentication tag).
    pub ciphertext: String,
    /// Base64 per-encryption random nonce.
    pub iv: String,
    /// Base64 per-encryption random key derivation salt.
    pub salt: String,
    /// Creation time, informational only.
    pub created_at: DateTime<Utc>,
    /// Parameters needed to reproduce the key derivation.
    pub meta: EnvelopeMeta,
}

impl SecretEnvelope {
    /// Checks structural well-formedness: a supported version and all
    /// fields populated. Does not touch the base64 payloads beyond
    /// presence; decoding failures belong to the decryption step.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(invalid("envelope version is missing"));
        }
        if self.version != ENVELOPE_VERSION {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedVersion,
                format!(
                    "envelope version {:?} is not supported by this implementation",
                    self.version
                ),
            ));
        }
        if self.ciphertext.is_empty() {
            return Err(invalid("envelope ciphertext is missing"));
        }
        if self.iv.is_empty() {
            return Err(invalid("envelope IV is missing"));
        }
        if self.salt.is_empty() {
            return Err(invalid("envelope salt is missing"));
        }
        self.meta.validate()
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize envelope",
                e,
            )
        })
    }

    /// Parses an envelope from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                format!("input is not a valid secret envelope: {}", e),
                e,
            )
        })
    }
}

/// Per-call overrides for envelope encryption. Any field left at its
/// default falls back to the module default; the resolved values are
/// stamped into the envelope's `meta` so decryption never depends on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeOptions {
    pub iterations: u32,
    pub key_length: usize,
    pub salt_bytes: usize,
    pub iv_bytes: usize,
    pub digest: KdfDigest,
    pub tag_length: u32,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            key_length: DEFAULT_KEY_LENGTH,
            salt_bytes: DEFAULT_SALT_BYTES,
            iv_bytes: DEFAULT_IV_BYTES,
            digest: KdfDigest::Sha256,
            tag_length: DEFAULT_TAG_LENGTH,
        }
    }
}

impl EnvelopeOptions {
    /// Resolves the options into fully-populated envelope metadata,
    /// validating every parameter once. Everything downstream of this
    /// point operates on mandatory values.
    pub fn resolve(&self) -> Result<EnvelopeMeta> {
        let meta = EnvelopeMeta {
            algorithm: CipherAlgorithm::AesGcm,
            key_derivation: KeyDerivation::Pbkdf2,
            digest: self.digest,
            iterations: self.iterations,
            key_length: self.key_length,
            salt_bytes: self.salt_bytes,
            iv_bytes: self.iv_bytes,
            tag_length: self.tag_length,
        };
        meta.validate()?;
        Ok(meta)
    }
}

fn invalid(msg: impl Into<String>) -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::InvalidInput, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_envelope() -> SecretEnvelope {
        SecretEnvelope {
            version: ENVELOPE_VERSION.to_string(),
            ciphertext: "Y2lwaGVydGV4dA==".to_string(),
            iv: "bm9uY2UxMmJ5dGVz".to_string(),
            salt: "MDEyMzQ1Njc4OWFiY2RlZg==".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            meta: EnvelopeOptions::default().resolve().unwrap(),
        }
    }

    #[test]
    fn test_default_options_resolve_to_documented_defaults() {
        let meta = EnvelopeOptions::default().resolve().unwrap();
        assert_eq!(meta.algorithm, CipherAlgorithm::AesGcm);
        assert_eq!(meta.key_derivation, KeyDerivation::Pbkdf2);
        assert_eq!(meta.digest, KdfDigest::Sha256);
        assert_eq!(meta.iterations, 100_000);
        assert_eq!(meta.key_length, 32);
        assert_eq!(meta.salt_bytes, 16);
        assert_eq!(meta.iv_bytes, 12);
        assert_eq!(meta.tag_length, 128);
    }

    #[test]
    fn test_wire_format_field_names() {
        let value = serde_json::to_value(sample_envelope()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["ciphertext", "createdAt", "iv", "meta", "salt", "version"]
        );

        let meta = obj["meta"].as_object().unwrap();
        let mut meta_keys: Vec<&str> = meta.keys().map(|k| k.as_str()).collect();
        meta_keys.sort_unstable();
        assert_eq!(
            meta_keys,
            vec![
                "algorithm",
                "digest",
                "iterations",
                "ivBytes",
                "keyDerivation",
                "keyLength",
                "saltBytes",
                "tagLength"
            ]
        );
    }

    #[test]
    fn test_wire_format_identifier_strings() {
        let value = serde_json::to_value(sample_envelope()).unwrap();
        assert_eq!(value["version"], "v1");
        assert_eq!(value["meta"]["algorithm"], "AES-GCM");
        assert_eq!(value["meta"]["keyDerivation"], "PBKDF2");
        assert_eq!(value["meta"]["digest"], "SHA-256");
    }

    #[test]
    fn test_created_at_is_iso8601() {
        let value = serde_json::to_value(sample_envelope()).unwrap();
        assert_eq!(value["createdAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_json_round_trip() {
        let envelope = sample_envelope();
        let json = envelope.to_json().unwrap();
        let parsed = SecretEnvelope::from_json(&json).unwrap();
        assert_eq!(envelope, parsed);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = SecretEnvelope::from_json("not json at all").expect_err("expected parse error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidInput));

        let err = SecretEnvelope::from_json(r#"{"version": "v1"}"#)
            .expect_err("expected incomplete envelope to be rejected");
        assert_eq!(err.kind, Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn test_validate_rejects_future_version() {
        let mut envelope = sample_envelope();
        envelope.version = "v2".to_string();
        let err = envelope.validate().expect_err("expected version error");
        assert_eq!(err.kind, Some(ErrorKind::UnsupportedVersion));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        for field in ["version", "ciphertext", "iv", "salt"] {
            let mut envelope = sample_envelope();
            match field {
                "version" => envelope.version.clear(),
                "ciphertext" => envelope.ciphertext.clear(),
                "iv" => envelope.iv.clear(),
                "salt" => envelope.salt.clear(),
                _ => unreachable!(),
            }
            let err = envelope.validate().unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::InvalidInput), "field: {}", field);
        }
    }

    #[test]
    fn test_options_validation() {
        let cases = [
            EnvelopeOptions {
                iterations: 0,
                ..Default::default()
            },
            EnvelopeOptions {
                key_length: 24,
                ..Default::default()
            },
            EnvelopeOptions {
                salt_bytes: 4,
                ..Default::default()
            },
            EnvelopeOptions {
                iv_bytes: 16,
                ..Default::default()
            },
            EnvelopeOptions {
                tag_length: 64,
                ..Default::default()
            },
        ];
        for options in cases {
            let err = options
                .resolve()
                .expect_err("expected out-of-range options to be rejected");
            assert_eq!(err.kind, Some(ErrorKind::InvalidInput));
            assert_eq!(err.category, ErrorCategory::User);
        }
    }

    #[test]
    fn test_non_default_options_resolve() {
        let meta = EnvelopeOptions {
            iterations: 50_000,
            key_length: 16,
            salt_bytes: 32,
            digest: KdfDigest::Sha512,
            tag_length: 96,
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(meta.iterations, 50_000);
        assert_eq!(meta.key_length, 16);
        assert_eq!(meta.salt_bytes, 32);
        assert_eq!(meta.digest, KdfDigest::Sha512);
        assert_eq!(meta.tag_length, 96);
    }
}
