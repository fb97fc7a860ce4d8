//! Configuration of the field encryption layer.
//!
//! [`Configuration`] is an explicit, immutable value handed to
//! [`FieldEncryption::new`](crate::FieldEncryption::new). Anything it leaves
//! unset falls back to [`EnvDefaults`], read once from `FIELD_*` environment
//! variables:
//!
//! | variable | meaning |
//! |---|---|
//! | `FIELD_ENCRYPTION_KEY` | active key used for all new encryptions |
//! | `FIELD_DECRYPTION_KEYS` | comma-separated extra decryption keys |
//! | `FIELD_ENCRYPTION_LOG` | `false` silences per-stage snapshots |

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::keychain::KeyError;

/// Prefix of the environment variables read by [`EnvDefaults::from_env`].
pub const ENV_PREFIX: &str = "FIELD";

/// Errors raised while building the encryption layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A selector is not of the form `Model.field`.
    #[error("invalid field selector `{0}`: expected `Model.field`")]
    InvalidSelector(String),

    /// A configured key secret could not be parsed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The environment could not be read or deserialised.
    #[error("failed to read environment defaults: {0}")]
    Environment(#[from] config::ConfigError),
}

// ---------------------------------------------------------------------------
// Field selectors
// ---------------------------------------------------------------------------

/// Set of protected `Model.field` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelectors {
    by_model: BTreeMap<String, BTreeSet<String>>,
}

impl FieldSelectors {
    /// Parse `Model.field` selectors. Duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSelector`] if a selector does not have
    /// exactly one `.` separating two non-empty names.
    pub fn parse<I, S>(selectors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_model: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for selector in selectors {
            let selector = selector.as_ref().trim();
            let (model, field) = selector
                .split_once('.')
                .filter(|(m, f)| !m.is_empty() && !f.is_empty() && !f.contains('.'))
                .ok_or_else(|| ConfigError::InvalidSelector(selector.to_owned()))?;
            by_model
                .entry(model.to_owned())
                .or_default()
                .insert(field.to_owned());
        }
        Ok(Self { by_model })
    }

    /// Protected fields of `model`, sorted by name. Empty if none are configured.
    pub fn fields_for(&self, model: &str) -> Vec<String> {
        self.by_model
            .get(model)
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `model` has at least one protected field.
    pub fn has_model(&self, model: &str) -> bool {
        self.by_model.get(model).is_some_and(|f| !f.is_empty())
    }

    /// All selectors, as `Model.field` strings.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.by_model
            .iter()
            .flat_map(|(model, fields)| fields.iter().map(move |f| format!("{model}.{f}")))
    }

    pub fn len(&self) -> usize {
        self.by_model.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Explicit configuration
// ---------------------------------------------------------------------------

/// Explicit configuration of the encryption layer.
#[derive(Clone, Default)]
pub struct Configuration {
    /// Fields to protect.
    pub fields: FieldSelectors,
    /// Active key secret. Falls back to `FIELD_ENCRYPTION_KEY`.
    pub encryption_key: Option<String>,
    /// Extra decryption key secrets. Falls back to `FIELD_DECRYPTION_KEYS`.
    pub decryption_keys: Option<Vec<String>>,
    /// Per-stage snapshot logging. Falls back to `FIELD_ENCRYPTION_LOG`, then on.
    pub verbose: Option<bool>,
}

impl Configuration {
    pub fn new(fields: FieldSelectors) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_encryption_key(mut self, secret: impl Into<String>) -> Self {
        self.encryption_key = Some(secret.into());
        self
    }

    pub fn with_decryption_keys<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decryption_keys = Some(secrets.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Resolve the active key and decryption set against `env`.
    ///
    /// Returns `None` when no encryption key is available at all. The
    /// decryption set always starts with the active key and holds no duplicates.
    pub fn resolve_keys(&self, env: &EnvDefaults) -> Option<ResolvedKeys> {
        let encryption_key = non_empty(self.encryption_key.as_deref())
            .or_else(|| non_empty(env.encryption_key.as_deref()))?
            .to_owned();

        let extra = match &self.decryption_keys {
            Some(keys) => keys.clone(),
            None => env.decryption_keys(),
        };

        let mut decryption_keys = vec![encryption_key.clone()];
        for key in extra {
            let key = key.trim().to_owned();
            if !key.is_empty() && !decryption_keys.contains(&key) {
                decryption_keys.push(key);
            }
        }

        Some(ResolvedKeys {
            encryption_key,
            decryption_keys,
        })
    }

    /// Whether per-stage snapshots are logged.
    pub fn verbose(&self, env: &EnvDefaults) -> bool {
        self.verbose.or_else(|| env.verbose()).unwrap_or(true)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets are replaced by presence markers.
        f.debug_struct("Configuration")
            .field("fields", &self.fields)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "decryption_keys",
                &self.decryption_keys.as_ref().map(|k| format!("[{} REDACTED]", k.len())),
            )
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Key secrets after merging explicit configuration with environment defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub encryption_key: String,
    /// Always contains `encryption_key` first.
    pub decryption_keys: Vec<String>,
}

impl fmt::Debug for ResolvedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKeys")
            .field("decryption_keys", &self.decryption_keys.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Environment defaults
// ---------------------------------------------------------------------------

/// Fallback values read from `FIELD_*` environment variables.
#[derive(Clone, Default, Deserialize)]
pub struct EnvDefaults {
    /// `FIELD_ENCRYPTION_KEY`
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// `FIELD_DECRYPTION_KEYS`, comma-separated.
    #[serde(default)]
    pub decryption_keys: Option<String>,

    /// `FIELD_ENCRYPTION_LOG`
    #[serde(default)]
    pub encryption_log: Option<String>,
}

impl EnvDefaults {
    /// Read defaults from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Environment`] if the environment cannot be deserialised.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Read defaults from an explicit variable map instead of the process
    /// environment. Keys use the same `FIELD_*` names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Environment`] if the map cannot be deserialised.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_environment(source: config::Environment) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder().add_source(source).build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Parsed `FIELD_DECRYPTION_KEYS` list; blank entries are dropped.
    pub fn decryption_keys(&self) -> Vec<String> {
        self.decryption_keys
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// `Some(false)` only for `FIELD_ENCRYPTION_LOG=false`; any other value enables logging.
    pub fn verbose(&self) -> Option<bool> {
        self.encryption_log
            .as_deref()
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
