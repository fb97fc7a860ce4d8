//! Field-level encryption for data clients.
//!
//! [`FieldEncryption`] sits in a data client's interception hook. Configured
//! `Model.field` string values are encrypted before a write reaches storage and
//! decrypted after a read returns; callers never see ciphertext for protected
//! fields of the records they ask for.
//!
//! ```no_run
//! # async fn demo(client: impl common::DataClient) -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use fieldcrypt::{Configuration, EnvDefaults, FieldEncryption, FieldSelectors, Intercepted};
//!
//! let config = Configuration::new(FieldSelectors::parse(["User.name", "Post.content"])?)
//!     .with_encryption_key("k1.aesgcm256.OsqVmAOZBB_WW3073q1wU4ag0ap0ETYAYMh041RuxuI=");
//! let encryption = FieldEncryption::with_tracing(config, &EnvDefaults::from_env()?)?;
//! let client = Intercepted::new(client, Arc::new(encryption));
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod classify;
pub mod config;
pub mod crypto;
pub mod keychain;
pub mod pipeline;
pub mod transcode;

pub use audit::{AuditSink, Stage, TracingAudit};
pub use classify::{classify, EncryptionPlan};
pub use config::{ConfigError, Configuration, EnvDefaults, FieldSelectors};
pub use keychain::{Key, KeyError, KeyFingerprint, Keychain, LookupError};
pub use pipeline::{FieldEncryption, Intercepted};
pub use transcode::{
    decrypt_field, encrypt_field, DecryptionFailure, EncryptionError, FieldTranscoder,
};
