//! VaultX - Zero-knowledge secret envelopes
//!
//! Passphrase-based authenticated encryption producing self-describing,
//! versioned envelopes (PBKDF2 key derivation + AES-GCM), plus salted
//! scrypt password hashing for account credentials. The storing side
//! only ever sees envelopes - never passphrases or plaintext.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod passphrase;
pub mod password;
pub mod secretcrypt;
