//! Keychain: the immutable set of keys able to decrypt stored envelopes.
//!
//! # Lifecycle
//!
//! 1. At construction, [`Keychain::build`] parses every configured secret into a
//!    [`Key`], computing its fingerprint.
//! 2. The keychain is wrapped in an `Arc` and shared by every intercepted
//!    operation. It is never mutated afterwards, so readers need no locking.
//! 3. At decrypt time, [`Keychain::lookup`] reads the fingerprint embedded in the
//!    envelope and returns the matching key.
//!
//! # Security invariants
//!
//! - Key material is zeroed on drop and is never written to logs; only
//!   [`KeyFingerprint`]s may appear in traces.

pub mod key;

pub use key::{Key, KeyError, KeyFingerprint};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::crypto::{Envelope, EnvelopeError};

/// Errors from [`Keychain::lookup`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The envelope names a key that is not in the keychain.
    #[error("no configured key matches identifier {0}")]
    UnknownKeyIdentifier(String),

    /// The value is not an envelope at all.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),
}

/// Ordered, immutable collection of keys indexed by fingerprint.
#[derive(Debug, Default)]
pub struct Keychain {
    keys: Vec<Arc<Key>>,
    by_fingerprint: HashMap<String, usize>,
}

impl Keychain {
    /// Parse `secrets` into a keychain, keeping first-seen order.
    ///
    /// Duplicate secrets, and distinct secrets that decode to the same key
    /// material, are collapsed into one entry.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] for the first secret that does not parse.
    pub fn build<I, S>(secrets: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chain = Self::default();
        for secret in secrets {
            chain.insert(Key::parse(secret.as_ref())?);
        }
        Ok(chain)
    }

    /// Build a keychain from already-parsed keys.
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        let mut chain = Self::default();
        for key in keys {
            chain.insert(key);
        }
        chain
    }

    fn insert(&mut self, key: Key) {
        if self.by_fingerprint.contains_key(key.fingerprint().as_str()) {
            return;
        }
        self.by_fingerprint
            .insert(key.fingerprint().as_str().to_owned(), self.keys.len());
        self.keys.push(Arc::new(key));
    }

    /// Find the key that sealed `envelope`, by its embedded fingerprint.
    ///
    /// Only the envelope header is inspected; nothing is decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::MalformedEnvelope`] if the header cannot be parsed,
    /// [`LookupError::UnknownKeyIdentifier`] if no configured key matches.
    pub fn lookup(&self, envelope: &str) -> Result<Arc<Key>, LookupError> {
        let key_id = Envelope::key_id_of(envelope)?;
        self.get(key_id)
            .ok_or_else(|| LookupError::UnknownKeyIdentifier(key_id.to_owned()))
    }

    /// Return the key with the given fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<Arc<Key>> {
        self.by_fingerprint
            .get(fingerprint)
            .map(|&idx| Arc::clone(&self.keys[idx]))
    }

    /// Fingerprints of all keys, in configuration order.
    pub fn fingerprints(&self) -> Vec<&KeyFingerprint> {
        self.keys.iter().map(|k| k.fingerprint()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
