//! [`Key`]: validated key material tagged with its fingerprint.

use std::fmt;

use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::{cipher, Algorithm, KEY_LEN};

/// Prefix of every serialised key secret.
pub const KEY_PREFIX: &str = "k1";

/// Number of hex characters kept from the SHA-256 of the algorithm tag and key material.
pub const FINGERPRINT_LEN: usize = 8;

/// Accepts key secrets with or without base64 padding.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors produced while parsing key secrets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The secret is not `k1.<algorithm-tag>.<base64url key>` with a 32-byte key.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Stable identifier derived from a key's algorithm and material.
///
/// The same bytes bound to two algorithms are two distinct keys.
///
/// Safe to log; it is embedded in every envelope the key produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    fn of(algorithm: Algorithm, material: &[u8]) -> Self {
        let digest = Sha256::new()
            .chain_update(algorithm.tag().as_bytes())
            .chain_update(b".")
            .chain_update(material)
            .finalize();
        let digest = hex::encode(digest);
        Self(digest[..FINGERPRINT_LEN].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-size buffer holding exactly [`KEY_LEN`] bytes of key material.
///
/// Overwritten with zeroes on drop.
struct KeyMaterial(Box<[u8; KEY_LEN]>);

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        (*self.0).zeroize();
    }
}

/// A parsed decryption / encryption key.
pub struct Key {
    fingerprint: KeyFingerprint,
    algorithm: Algorithm,
    material: KeyMaterial,
}

impl Key {
    /// Parse a `k1.<algorithm-tag>.<base64url key>` secret.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] on a wrong prefix, an unknown
    /// algorithm tag, invalid base64 or a key that is not [`KEY_LEN`] bytes.
    pub fn parse(secret: &str) -> Result<Self, KeyError> {
        let mut parts = secret.trim().split('.');
        let (prefix, tag, encoded) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(prefix), Some(tag), Some(encoded), None) => (prefix, tag, encoded),
            _ => {
                return Err(KeyError::InvalidKeyFormat(
                    "expected three `.`-separated parts".into(),
                ))
            }
        };
        if prefix != KEY_PREFIX {
            return Err(KeyError::InvalidKeyFormat(format!(
                "unsupported key version `{prefix}`"
            )));
        }
        let algorithm = Algorithm::from_tag(tag)
            .ok_or_else(|| KeyError::InvalidKeyFormat(format!("unknown algorithm `{tag}`")))?;

        let mut bytes = KEY_ENGINE
            .decode(encoded)
            .map_err(|_| KeyError::InvalidKeyFormat("key material is not base64url".into()))?;
        let key = Self::from_bytes(algorithm, &bytes);
        bytes.zeroize();
        key
    }

    /// Build a key from raw material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidKeyFormat(format!(
                "expected {KEY_LEN} bytes of key material, got {}",
                bytes.len()
            )));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self {
            fingerprint: KeyFingerprint::of(algorithm, bytes),
            algorithm,
            material: KeyMaterial(buf),
        })
    }

    /// Generate a fresh random key.
    pub fn generate(algorithm: Algorithm) -> Self {
        let mut bytes = cipher::random_key();
        let fingerprint = KeyFingerprint::of(algorithm, &bytes);
        let key = Self {
            fingerprint,
            algorithm,
            material: KeyMaterial(Box::new(bytes)),
        };
        bytes.zeroize();
        key
    }

    /// Serialise back to the `k1.<algorithm-tag>.<base64url key>` secret form.
    ///
    /// The result is secret material; never log it.
    pub fn to_secret(&self) -> String {
        format!(
            "{KEY_PREFIX}.{}.{}",
            self.algorithm.tag(),
            URL_SAFE.encode(&self.material.0[..])
        )
    }

    pub fn fingerprint(&self) -> &KeyFingerprint {
        &self.fingerprint
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn material(&self) -> &[u8] {
        &self.material.0[..]
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material is never printed.
        f.debug_struct("Key")
            .field("fingerprint", &self.fingerprint)
            .field("algorithm", &self.algorithm)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Key format used by existing AES-GCM deployments.
    const LEGACY_KEY: &str = "k1.aesgcm256.OsqVmAOZBB_WW3073q1wU4ag0ap0ETYAYMh041RuxuI=";

    #[test]
    fn parses_padded_legacy_key() {
        let key = Key::parse(LEGACY_KEY).unwrap();
        assert_eq!(key.algorithm(), Algorithm::Aes256Gcm);
        assert_eq!(key.fingerprint().as_str().len(), FINGERPRINT_LEN);
        assert!(key.fingerprint().as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn padding_is_optional() {
        let padded = Key::parse(LEGACY_KEY).unwrap();
        let unpadded = Key::parse(LEGACY_KEY.trim_end_matches('=')).unwrap();
        assert_eq!(padded.fingerprint(), unpadded.fingerprint());
    }

    #[test]
    fn secret_round_trip() {
        let key = Key::generate(Algorithm::Aes256GcmSiv);
        let secret = key.to_secret();
        assert!(secret.starts_with("k1.aesgcmsiv256."));
        let parsed = Key::parse(&secret).unwrap();
        assert_eq!(parsed.fingerprint(), key.fingerprint());
        assert_eq!(parsed.material(), key.material());
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = Key::from_bytes(Algorithm::Aes256GcmSiv, &[1u8; KEY_LEN]).unwrap();
        let b = Key::from_bytes(Algorithm::Aes256GcmSiv, &[1u8; KEY_LEN]).unwrap();
        let c = Key::from_bytes(Algorithm::Aes256GcmSiv, &[2u8; KEY_LEN]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_depends_on_algorithm() {
        let siv = Key::from_bytes(Algorithm::Aes256GcmSiv, &[1u8; KEY_LEN]).unwrap();
        let gcm = Key::from_bytes(Algorithm::Aes256Gcm, &[1u8; KEY_LEN]).unwrap();
        assert_ne!(siv.fingerprint(), gcm.fingerprint());
    }

    #[test]
    fn rejects_malformed_secrets() {
        for secret in [
            "",
            "not-a-key",
            "k2.aesgcm256.OsqVmAOZBB_WW3073q1wU4ag0ap0ETYAYMh041RuxuI=",
            "k1.rot13.OsqVmAOZBB_WW3073q1wU4ag0ap0ETYAYMh041RuxuI=",
            "k1.aesgcm256.!!!!",
            "k1.aesgcm256.AAAA",
            "k1.aesgcm256.OsqVmAOZBB_WW3073q1wU4ag0ap0ETYAYMh041RuxuI=.extra",
        ] {
            assert!(
                matches!(Key::parse(secret), Err(KeyError::InvalidKeyFormat(_))),
                "accepted {secret:?}"
            );
        }
    }

    #[test]
    fn debug_redacts_material() {
        let key = Key::parse(LEGACY_KEY).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("OsqVmAOZBB"));
    }
}
