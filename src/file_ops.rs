//! File sealing/opening operations
//!
//! High-level operations for sealing files into envelope JSON, opening
//! them back into plaintext, and updating sealed files in place. Sealed
//! files hold one pretty-printed [`SecretEnvelope`] document.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::envelope::{EnvelopeOptions, SecretEnvelope};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::passphrase::PassphraseReader;
use crate::secretcrypt;

/// Seal a file's contents into an envelope with a passphrase.
///
/// Reads UTF-8 plaintext from `input_path`, encrypts it using a passphrase
/// from `passphrase_reader`, and writes envelope JSON to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only)
/// on Unix systems.
pub fn seal_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    options: &EnvelopeOptions,
) -> Result<()> {
    let plaintext = read_text(input_path)?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let envelope = secretcrypt::encrypt_with_options(&plaintext, &passphrase, options)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_file_secure(output_path, envelope_document(&envelope)?.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Open a sealed file with a passphrase.
///
/// Reads envelope JSON from `input_path`, decrypts it using a passphrase
/// from `passphrase_reader`, and writes the plaintext to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only)
/// on Unix systems.
pub fn open_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let json = read_text(input_path)?;
    let envelope = SecretEnvelope::from_json(&json)
        .map_err(|e| e.with_context(format!("failed to parse {}", input_path.display())))?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let plaintext = secretcrypt::decrypt(&envelope, &passphrase)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    write_file_secure(output_path, plaintext.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Update a sealed file with new plaintext using the same passphrase.
///
/// This function:
/// 1. Decrypts the existing envelope at `sealed_path` to validate the passphrase
/// 2. Reads new plaintext from `plain_path`
/// 3. Seals the new plaintext with the validated passphrase
/// 4. Atomically writes to `sealed_path` (tempfile + fsync + rename)
///
/// The atomic write ensures that either the old file or the new file
/// exists, never a partial/corrupted file.
///
/// The passphrase validation prevents accidental passphrase changes.
pub fn update_file(
    plain_path: &Path,
    sealed_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let json = read_text(sealed_path)?;
    let envelope = SecretEnvelope::from_json(&json)
        .map_err(|e| e.with_context(format!("failed to parse {}", sealed_path.display())))?;
    let passphrase = passphrase_reader.read_passphrase()?;

    // Validate passphrase against the existing envelope (discard plaintext).
    secretcrypt::decrypt(&envelope, &passphrase)
        .map_err(|e| e.with_context("failed to decrypt"))?;

    let new_plaintext = read_text(plain_path)?;
    let new_envelope =
        secretcrypt::encrypt_with_options(&new_plaintext, &passphrase, &EnvelopeOptions::default())
            .map_err(|e| e.with_context("failed to encrypt"))?;
    let document = envelope_document(&new_envelope)?;

    let sealed_dir = sealed_path.parent().ok_or_else(|| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            "sealed path has no parent directory",
        )
    })?;
    let mut temp_file = tempfile::NamedTempFile::new_in(sealed_dir).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;
    temp_file.write_all(document.as_bytes()).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| {
                VaultError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to get tempfile metadata",
                    e,
                )
            })?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }
    temp_file.persist(sealed_path).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", sealed_path.display()),
            e,
        )
    })?;
    Ok(())
}

/// Render the envelope as the sealed-file document: pretty JSON plus a
/// trailing newline.
fn envelope_document(envelope: &SecretEnvelope) -> Result<String> {
    let mut document = serde_json::to_string_pretty(envelope).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to serialize envelope",
            e,
        )
    })?;
    document.push('\n');
    Ok(document)
}

/// Read a file that must contain UTF-8 text (plaintext inputs and
/// envelope JSON both are).
fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("{} is not valid UTF-8 text", path.display()),
            e,
        )
    })
}

/// Write file with secure permissions (0o600 on Unix).
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                VaultError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to open {}", path.display()),
                    e,
                )
            })?;

        file.write_all(contents).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn read_error(path: &Path, err: io::Error) -> VaultError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    VaultError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
