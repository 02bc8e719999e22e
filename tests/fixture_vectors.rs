//! Fixture vector validation
//!
//! The vectors under testdata/ were produced by an independent
//! implementation of the same scheme (PBKDF2-HMAC + AES-GCM envelopes,
//! scrypt password hashes). Decrypting and verifying them here pins the
//! wire format: any conforming client can open our envelopes and vice
//! versa.

use anyhow::Result;
use serde::Deserialize;

use vaultx::envelope::SecretEnvelope;
use vaultx::error::ErrorKind;
use vaultx::{password, secretcrypt};

#[derive(Debug, Deserialize)]
struct EnvelopeVector {
    comment: String,
    passphrase: String,
    plaintext: String,
    envelope: SecretEnvelope,
}

#[derive(Debug, Deserialize)]
struct PasswordVector {
    comment: String,
    password: String,
    stored: String,
}

fn load_envelope_vectors() -> Result<Vec<EnvelopeVector>> {
    let json_data = include_str!("../testdata/envelope-vectors.json");
    Ok(serde_json::from_str(json_data)?)
}

fn load_password_vectors() -> Result<Vec<PasswordVector>> {
    let json_data = include_str!("../testdata/password-vectors.json");
    Ok(serde_json::from_str(json_data)?)
}

#[test]
fn test_envelope_vectors_decrypt() {
    let vectors = load_envelope_vectors().expect("failed to load envelope vectors");
    assert!(!vectors.is_empty());

    for vector in &vectors {
        let plaintext = secretcrypt::decrypt(&vector.envelope, &vector.passphrase)
            .unwrap_or_else(|e| panic!("vector {:?} failed to decrypt: {}", vector.comment, e));
        assert_eq!(plaintext, vector.plaintext, "vector: {}", vector.comment);
    }
}

#[test]
fn test_envelope_vectors_reject_wrong_passphrase() {
    let vectors = load_envelope_vectors().expect("failed to load envelope vectors");

    for vector in &vectors {
        let err = secretcrypt::decrypt(&vector.envelope, "definitely not the passphrase")
            .expect_err("wrong passphrase accepted");
        assert_eq!(
            err.kind,
            Some(ErrorKind::DecryptionFailed),
            "vector: {}",
            vector.comment
        );
    }
}

#[test]
fn test_envelope_vectors_survive_json_round_trip() {
    let vectors = load_envelope_vectors().expect("failed to load envelope vectors");

    for vector in &vectors {
        let json = vector.envelope.to_json().unwrap();
        let parsed = SecretEnvelope::from_json(&json).unwrap();
        let plaintext = secretcrypt::decrypt(&parsed, &vector.passphrase).unwrap();
        assert_eq!(plaintext, vector.plaintext, "vector: {}", vector.comment);
    }
}

#[test]
fn test_password_vectors_verify() {
    let vectors = load_password_vectors().expect("failed to load password vectors");
    assert!(!vectors.is_empty());

    for vector in &vectors {
        assert!(
            password::verify(&vector.password, &vector.stored),
            "vector: {}",
            vector.comment
        );
        assert!(
            !password::verify("definitely not the password", &vector.stored),
            "vector: {}",
            vector.comment
        );
    }
}
