//! AEAD field encryption primitives and the envelope wire format.
//!
//! This module is free of keychain and pipeline concerns.
//! It provides the low-level seal/open operations used by the transcoder.
//!
//! # Ciphertext format
//!
//! ```text
//! v1.<algorithm-tag>.<key-fingerprint>.<base64url-no-pad(nonce ‖ ciphertext+tag)>
//! ```
//!
//! The key fingerprint lets the keychain pick the right decryption key, so
//! rotating the active key needs no out-of-band bookkeeping.

pub mod cipher;
pub mod envelope;

pub use cipher::{Algorithm, CipherError, KEY_LEN, NONCE_LEN};
pub use envelope::{Envelope, EnvelopeError};
