//! Encryption and decryption of protected field values.
//!
//! Only JSON strings are ever transformed. `null`, numbers, booleans, arrays
//! and nested objects are left exactly as they are, so a write that sets a
//! protected field to `null` clears it without producing an envelope.
//!
//! Per-record transforms fan out one blocking task per field and wait for all
//! of them before returning. Fields are independent of each other.

use std::sync::Arc;

use common::Record;
use serde_json::Value;
use thiserror::Error;
use tokio::task::{self, JoinHandle};

use crate::audit::AuditSink;
use crate::crypto::{cipher, Algorithm, CipherError, Envelope, EnvelopeError};
use crate::keychain::{Key, Keychain, LookupError};

/// Encrypting a protected field failed. The write must not proceed.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("failed to encrypt field `{field}`: {source}")]
    Cipher {
        field: String,
        #[source]
        source: CipherError,
    },

    /// The blocking task running the cipher panicked or was cancelled.
    #[error("encryption task for field `{field}` did not complete: {reason}")]
    Task { field: String, reason: String },
}

impl From<EncryptionError> for common::ClientError {
    fn from(e: EncryptionError) -> Self {
        common::ClientError::EncryptionFailure(e.to_string())
    }
}

/// A stored value could not be decrypted. Recoverable: the value passes through.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptionFailure {
    /// The envelope was sealed by a key that is not in the keychain.
    #[error("unknown key identifier {0}")]
    UnknownKey(String),

    /// The value is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),

    /// The envelope claims a different algorithm than its key is bound to.
    #[error("envelope algorithm {envelope} does not match key algorithm {key}")]
    AlgorithmMismatch { envelope: Algorithm, key: Algorithm },

    /// Authentication failed: tampered data or a colliding key identifier.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,

    /// The blocking task running the cipher panicked or was cancelled.
    #[error("decryption task did not complete: {0}")]
    Task(String),
}

impl From<LookupError> for DecryptionFailure {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::UnknownKeyIdentifier(id) => DecryptionFailure::UnknownKey(id),
            LookupError::MalformedEnvelope(e) => DecryptionFailure::MalformedEnvelope(e),
        }
    }
}

/// Seal `plaintext` under `key`, producing a fresh envelope string.
///
/// # Errors
///
/// Returns a [`CipherError`] if the AEAD layer fails.
pub fn encrypt_field(plaintext: &str, key: &Key) -> Result<String, CipherError> {
    let (nonce, ciphertext) = cipher::seal(key.algorithm(), key.material(), plaintext.as_bytes())?;
    Ok(Envelope {
        algorithm: key.algorithm(),
        key_id: key.fingerprint().to_string(),
        nonce,
        ciphertext,
    }
    .to_string_repr())
}

/// Open an envelope string with whichever keychain key sealed it.
///
/// # Errors
///
/// Returns a [`DecryptionFailure`] describing why the value cannot be decrypted.
/// Callers pass the original value through instead of failing.
pub fn decrypt_field(envelope: &str, keychain: &Keychain) -> Result<String, DecryptionFailure> {
    let key = keychain.lookup(envelope)?;
    let parsed = Envelope::parse(envelope)?;
    if parsed.algorithm != key.algorithm() {
        return Err(DecryptionFailure::AlgorithmMismatch {
            envelope: parsed.algorithm,
            key: key.algorithm(),
        });
    }
    let plaintext = cipher::open(
        key.algorithm(),
        key.material(),
        &parsed.nonce,
        &parsed.ciphertext,
    )?;
    String::from_utf8(plaintext).map_err(|_| DecryptionFailure::InvalidUtf8)
}

/// Seals one plaintext under one key.
pub(crate) type SealFn = fn(&str, &Key) -> Result<String, CipherError>;

/// Applies field transforms to whole records with a fixed active key and keychain.
#[derive(Clone)]
pub struct FieldTranscoder {
    keychain: Arc<Keychain>,
    active: Arc<Key>,
    seal: SealFn,
}

impl std::fmt::Debug for FieldTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldTranscoder")
            .field("keychain", &self.keychain)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl FieldTranscoder {
    pub fn new(keychain: Arc<Keychain>, active: Arc<Key>) -> Self {
        Self {
            keychain,
            active,
            seal: encrypt_field,
        }
    }

    /// Replace the per-field seal, e.g. with one that always fails.
    #[cfg(test)]
    pub(crate) fn with_seal(mut self, seal: SealFn) -> Self {
        self.seal = seal;
        self
    }

    pub fn keychain(&self) -> &Arc<Keychain> {
        &self.keychain
    }

    pub fn active_key(&self) -> &Arc<Key> {
        &self.active
    }

    /// Encrypt every string-valued field of `record` named in `fields`.
    ///
    /// All field tasks run to completion before this returns. On failure the
    /// first error in `fields` order is returned; fields that did encrypt keep
    /// their envelopes.
    ///
    /// # Errors
    ///
    /// Returns an [`EncryptionError`] if any field failed to encrypt.
    pub async fn encrypt_fields(
        &self,
        record: &mut Record,
        fields: &[String],
    ) -> Result<usize, EncryptionError> {
        let tasks: Vec<(String, JoinHandle<Result<String, CipherError>>)> = fields
            .iter()
            .filter_map(|field| {
                let Some(Value::String(plaintext)) = record.get(field) else {
                    return None;
                };
                let plaintext = plaintext.clone();
                let key = Arc::clone(&self.active);
                let seal = self.seal;
                let handle = task::spawn_blocking(move || seal(&plaintext, &key));
                Some((field.clone(), handle))
            })
            .collect();

        let mut first_error = None;
        let mut encrypted = 0;
        for (field, handle) in tasks {
            match handle.await {
                Ok(Ok(envelope)) => {
                    record.insert(field, Value::String(envelope));
                    encrypted += 1;
                }
                Ok(Err(source)) => {
                    first_error.get_or_insert(EncryptionError::Cipher { field, source });
                }
                Err(e) => {
                    first_error.get_or_insert(EncryptionError::Task {
                        field,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(encrypted),
        }
    }

    /// Decrypt every string-valued field of `record` named in `fields`.
    ///
    /// Failures leave the stored ciphertext in place and are reported to
    /// `audit`; they never fail the record. Returns the number of fields decrypted.
    pub async fn decrypt_fields(
        &self,
        model: &str,
        record: &mut Record,
        fields: &[String],
        audit: &dyn AuditSink,
    ) -> usize {
        let tasks: Vec<(String, JoinHandle<Result<String, DecryptionFailure>>)> = fields
            .iter()
            .filter_map(|field| {
                let Some(Value::String(ciphertext)) = record.get(field) else {
                    return None;
                };
                let ciphertext = ciphertext.clone();
                let keychain = Arc::clone(&self.keychain);
                let handle = task::spawn_blocking(move || decrypt_field(&ciphertext, &keychain));
                Some((field.clone(), handle))
            })
            .collect();

        let mut decrypted = 0;
        for (field, handle) in tasks {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(DecryptionFailure::Task(e.to_string())));
            match outcome {
                Ok(plaintext) => {
                    record.insert(field, Value::String(plaintext));
                    decrypted += 1;
                }
                Err(failure) => audit.decryption_failed(model, &field, &failure),
            }
        }
        decrypted
    }
}
