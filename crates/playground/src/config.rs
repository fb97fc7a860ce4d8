//! Configuration loading and validation for the playground.
//!
//! Key material is not read here: the encryption layer resolves
//! `FIELD_ENCRYPTION_KEY` / `FIELD_DECRYPTION_KEYS` itself.

use anyhow::{Context, Result};
use fieldcrypt::FieldSelectors;
use serde::Deserialize;

/// Validated playground configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Comma-separated `Model.field` selectors to protect.
    #[serde(default = "default_encrypted_fields")]
    pub encrypted_fields: String,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_encrypted_fields() -> String {
    "User.name,Post.content".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build playground configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise playground configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parsed field selectors.
    pub fn selectors(&self) -> Result<FieldSelectors> {
        FieldSelectors::parse(
            self.encrypted_fields
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
        .context("ENCRYPTED_FIELDS is invalid")
    }

    fn validate(&self) -> Result<()> {
        if self.selectors()?.is_empty() {
            anyhow::bail!("ENCRYPTED_FIELDS must name at least one Model.field");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }
}
