//! AEAD sealing and opening of individual field values.
//!
//! **Algorithm choice:** new keys default to AES-256-GCM-SIV (RFC 8452), which
//! is nonce-misuse-resistant. AES-256-GCM is kept so that keys minted for
//! existing deployments (`k1.aesgcm256.…`) keep working.
//!
//! **Every seal draws a fresh random nonce.** Plain GCM nonce reuse under one
//! key breaks both confidentiality and authentication.

use aes_gcm_siv::aead::{rand_core::RngCore, Aead, KeyInit, OsRng};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a GCM / GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Symmetric algorithms a key can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// AES-256-GCM-SIV, tag `aesgcmsiv256`.
    #[default]
    Aes256GcmSiv,
    /// AES-256-GCM, tag `aesgcm256`.
    Aes256Gcm,
}

impl Algorithm {
    /// Tag written into key strings and envelopes.
    pub fn tag(self) -> &'static str {
        match self {
            Algorithm::Aes256GcmSiv => "aesgcmsiv256",
            Algorithm::Aes256Gcm => "aesgcm256",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "aesgcmsiv256" => Some(Algorithm::Aes256GcmSiv),
            "aesgcm256" => Some(Algorithm::Aes256Gcm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// Encryption failed, or decryption failed authentication (wrong key or tampered data).
    #[error("aead operation failed")]
    AeadFailure,
}

/// Encrypt `plaintext` under `key`, returning the random nonce and the
/// ciphertext with its authentication tag appended.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn seal(
    algorithm: Algorithm,
    key: &[u8],
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CipherError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = match algorithm {
        Algorithm::Aes256GcmSiv => siv_cipher(key)?
            .encrypt(aes_gcm_siv::Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::AeadFailure)?,
        Algorithm::Aes256Gcm => gcm_cipher(key)?
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::AeadFailure)?,
    };
    Ok((nonce, ciphertext))
}

/// Decrypt and authenticate `ciphertext` sealed with [`seal`].
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] if authentication fails.
pub fn open(
    algorithm: Algorithm,
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    match algorithm {
        Algorithm::Aes256GcmSiv => siv_cipher(key)?
            .decrypt(aes_gcm_siv::Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::AeadFailure),
        Algorithm::Aes256Gcm => gcm_cipher(key)?
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::AeadFailure),
    }
}

/// Fill a fresh key buffer from the OS CSPRNG.
pub(crate) fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn siv_cipher(key: &[u8]) -> Result<aes_gcm_siv::Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    aes_gcm_siv::Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

fn gcm_cipher(key: &[u8]) -> Result<aes_gcm::Aes256Gcm, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    aes_gcm::Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALGORITHMS: [Algorithm; 2] = [Algorithm::Aes256GcmSiv, Algorithm::Aes256Gcm];

    #[test]
    fn seal_open_round_trip() {
        for algorithm in ALGORITHMS {
            let key = random_key();
            let (nonce, ciphertext) = seal(algorithm, &key, b"123-45-6789").unwrap();
            let plaintext = open(algorithm, &key, &nonce, &ciphertext).unwrap();
            assert_eq!(plaintext, b"123-45-6789", "{algorithm}");
        }
    }

    #[test]
    fn wrong_key_fails_open() {
        for algorithm in ALGORITHMS {
            let (nonce, ciphertext) = seal(algorithm, &random_key(), b"secret").unwrap();
            assert_eq!(
                open(algorithm, &random_key(), &nonce, &ciphertext),
                Err(CipherError::AeadFailure)
            );
        }
    }

    #[test]
    fn algorithms_are_not_interchangeable() {
        let key = random_key();
        let (nonce, ciphertext) = seal(Algorithm::Aes256Gcm, &key, b"secret").unwrap();
        assert!(open(Algorithm::Aes256GcmSiv, &key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = [0u8; 16];
        assert_eq!(
            seal(Algorithm::Aes256GcmSiv, &short_key, b"x").unwrap_err(),
            CipherError::InvalidKeyLength
        );
        assert_eq!(
            open(Algorithm::Aes256Gcm, &short_key, &[0u8; NONCE_LEN], b"x").unwrap_err(),
            CipherError::InvalidKeyLength
        );
    }

    #[test]
    fn nonces_are_fresh() {
        let key = random_key();
        let (n1, c1) = seal(Algorithm::Aes256GcmSiv, &key, b"same").unwrap();
        let (n2, c2) = seal(Algorithm::Aes256GcmSiv, &key, b"same").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = random_key();
        let (nonce, mut ciphertext) = seal(Algorithm::Aes256GcmSiv, &key, b"tamper me").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(open(Algorithm::Aes256GcmSiv, &key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn tags_round_trip() {
        for algorithm in ALGORITHMS {
            assert_eq!(Algorithm::from_tag(algorithm.tag()), Some(algorithm));
        }
        assert_eq!(Algorithm::from_tag("chacha20"), None);
        assert_eq!(Algorithm::default(), Algorithm::Aes256GcmSiv);
    }
}
