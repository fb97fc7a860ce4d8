//! Self-describing ciphertext strings stored in place of protected field values.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use super::cipher::{Algorithm, NONCE_LEN};

/// Format version written at the start of every envelope.
pub const FORMAT_VERSION: &str = "v1";

/// Errors produced while parsing an envelope string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Wrong number of `.`-separated parts, unknown version, or empty key identifier.
    #[error("invalid envelope format")]
    InvalidFormat,

    #[error("unsupported algorithm tag: {0}")]
    UnknownAlgorithm(String),

    /// The payload is not base64url, or is too short to contain a nonce.
    #[error("invalid envelope payload")]
    InvalidPayload,
}

/// A parsed, encrypted field value.
///
/// The string representation is
/// `v1.<algorithm-tag>.<key-fingerprint>.<base64url(nonce ‖ ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub algorithm: Algorithm,
    /// Fingerprint of the key that sealed this value.
    pub key_id: String,
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode this value to its canonical string representation.
    pub fn to_string_repr(&self) -> String {
        let mut payload = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(&self.ciphertext);
        format!(
            "{}.{}.{}.{}",
            FORMAT_VERSION,
            self.algorithm.tag(),
            self.key_id,
            URL_SAFE_NO_PAD.encode(payload),
        )
    }

    /// Read only the key identifier, without decoding the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidFormat`] when the header is malformed.
    pub fn key_id_of(s: &str) -> Result<&str, EnvelopeError> {
        let (_, _, key_id, _) = split(s)?;
        Ok(key_id)
    }

    /// Parse an envelope string back into an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] if the string does not match the expected structure.
    pub fn parse(s: &str) -> Result<Self, EnvelopeError> {
        let (_, tag, key_id, payload) = split(s)?;
        let algorithm =
            Algorithm::from_tag(tag).ok_or_else(|| EnvelopeError::UnknownAlgorithm(tag.into()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| EnvelopeError::InvalidPayload)?;
        if bytes.len() <= NONCE_LEN {
            return Err(EnvelopeError::InvalidPayload);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            algorithm,
            key_id: key_id.to_owned(),
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn split(s: &str) -> Result<(&str, &str, &str, &str), EnvelopeError> {
    let mut parts = s.splitn(4, '.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(version), Some(tag), Some(key_id), Some(payload))
            if version == FORMAT_VERSION && !key_id.is_empty() && !payload.contains('.') =>
        {
            Ok((version, tag, key_id, payload))
        }
        _ => Err(EnvelopeError::InvalidFormat),
    }
}
