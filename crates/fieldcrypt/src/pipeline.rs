//! The interception pipeline wrapped around a data client.
//!
//! Stages run strictly in order for every operation:
//!
//! 1. classify the operation ([`classify`]);
//! 2. encrypt protected fields of the write payload;
//! 3. delegate to the data client;
//! 4. decrypt protected fields of the returned record;
//! 5. return the result.
//!
//! Only top-level fields of the target model are transformed. Related records
//! pulled in through `include` are returned as stored, still encrypted.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ClientError, DataClient, Operation};
use serde_json::{json, Value};
use tracing::debug;

use crate::audit::{AuditSink, Stage, TracingAudit};
use crate::classify::{classify, EncryptionPlan};
use crate::config::{ConfigError, Configuration, EnvDefaults, FieldSelectors};
use crate::keychain::{KeyFingerprint, Keychain};
use crate::transcode::FieldTranscoder;

/// Field encryption interceptor.
///
/// Built once from a [`Configuration`] and shared across operations; it holds
/// no per-operation state.
pub struct FieldEncryption {
    fields: FieldSelectors,
    /// `None` when no encryption key was available: every operation passes through.
    transcoder: Option<FieldTranscoder>,
    audit: Arc<dyn AuditSink>,
}

impl FieldEncryption {
    /// Build the interceptor, resolving keys against `env`.
    ///
    /// Without any encryption key the interceptor is built disabled and
    /// `audit` receives a single warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Key`] if a configured key secret is malformed.
    pub fn new(
        config: Configuration,
        env: &EnvDefaults,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        let Some(keys) = config.resolve_keys(env) else {
            audit.disabled("no encryption key provided");
            return Ok(Self {
                fields: config.fields,
                transcoder: None,
                audit,
            });
        };

        let keychain = Keychain::build(&keys.decryption_keys)?;
        let active = crate::keychain::Key::parse(&keys.encryption_key)?;
        let active = keychain
            .get(active.fingerprint().as_str())
            .unwrap_or_else(|| Arc::new(active));

        debug!(
            fields = config.fields.len(),
            encryption_key = %active.fingerprint(),
            decryption_keys = keychain.len(),
            "field encryption enabled"
        );

        Ok(Self {
            fields: config.fields,
            transcoder: Some(FieldTranscoder::new(Arc::new(keychain), active)),
            audit,
        })
    }

    /// Build the interceptor with a [`TracingAudit`] sink whose verbosity comes
    /// from `config` / `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Key`] if a configured key secret is malformed.
    pub fn with_tracing(config: Configuration, env: &EnvDefaults) -> Result<Self, ConfigError> {
        let audit = TracingAudit::new(config.verbose(env));
        Self::new(config, env, Arc::new(audit))
    }

    /// Returns `false` when the interceptor was built without an encryption key.
    pub fn is_enabled(&self) -> bool {
        self.transcoder.is_some()
    }

    pub fn fields(&self) -> &FieldSelectors {
        &self.fields
    }

    /// Fingerprint of the key used for new encryptions.
    pub fn active_fingerprint(&self) -> Option<&KeyFingerprint> {
        self.transcoder.as_ref().map(|t| t.active_key().fingerprint())
    }

    pub fn keychain(&self) -> Option<&Arc<Keychain>> {
        self.transcoder.as_ref().map(FieldTranscoder::keychain)
    }

    /// Run `operation` through the pipeline, with `next` performing the real
    /// read or write.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EncryptionFailure`] if a protected field could not
    /// be encrypted; `next` is not called in that case. Errors from `next` are
    /// returned unchanged. Decryption failures never produce an error.
    pub async fn intercept<F, Fut>(
        &self,
        mut operation: Operation,
        next: F,
    ) -> Result<Value, ClientError>
    where
        F: FnOnce(Operation) -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let Some(transcoder) = &self.transcoder else {
            return next(operation).await;
        };

        let model = operation.model().map(str::to_owned);
        let plan = classify(model.as_deref(), &operation.action(), &self.fields);
        let fields = model
            .as_deref()
            .map(|m| self.fields.fields_for(m))
            .unwrap_or_default();
        let label = operation.label();

        if self.audit.verbose() {
            let snapshot = json!({
                "context": {
                    "plan": plan,
                    "fields": fields,
                    "encryption_key": transcoder.active_key().fingerprint().as_str(),
                    "decryption_keys": transcoder
                        .keychain()
                        .fingerprints()
                        .iter()
                        .map(|fp| fp.as_str())
                        .collect::<Vec<_>>(),
                },
                "operation": to_snapshot(&operation),
            });
            self.audit.stage(Stage::PreEncrypt, &label, &snapshot);
        }

        if plan.encrypt_on_write && !fields.is_empty() {
            if let Some(payload) = operation.payload_mut() {
                for record in payload.records_mut() {
                    transcoder.encrypt_fields(record, &fields).await?;
                }
            }
        }

        if self.audit.verbose() {
            self.audit
                .stage(Stage::BeforeDelegate, &label, &to_snapshot(&operation));
        }

        let mut result = next(operation).await?;

        if self.audit.verbose() {
            self.audit.stage(Stage::AfterDelegate, &label, &result);
        }

        if plan.decrypt_on_read && !fields.is_empty() {
            // Lookups that find nothing return `null`; only records are decrypted.
            if let (Some(model), Value::Object(record)) = (model.as_deref(), &mut result) {
                transcoder
                    .decrypt_fields(model, record, &fields, self.audit.as_ref())
                    .await;
            }
        }

        if self.audit.verbose() {
            self.audit.stage(Stage::PostDecrypt, &label, &result);
        }

        Ok(result)
    }

    /// Run `operation` against `client` through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`FieldEncryption::intercept`].
    pub async fn execute<C>(&self, client: &C, operation: Operation) -> Result<Value, ClientError>
    where
        C: DataClient + ?Sized,
    {
        self.intercept(operation, |op| client.execute(op)).await
    }

    /// Classification of `operation` under this interceptor's field selectors.
    pub fn plan(&self, operation: &Operation) -> EncryptionPlan {
        classify(operation.model(), &operation.action(), &self.fields)
    }
}

impl std::fmt::Debug for FieldEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryption")
            .field("fields", &self.fields)
            .field("enabled", &self.is_enabled())
            .field("encryption_key", &self.active_fingerprint())
            .finish_non_exhaustive()
    }
}

fn to_snapshot(operation: &Operation) -> Value {
    serde_json::to_value(operation).unwrap_or_default()
}

/// A data client whose every call goes through a [`FieldEncryption`] interceptor.
#[derive(Debug, Clone)]
pub struct Intercepted<C> {
    inner: C,
    encryption: Arc<FieldEncryption>,
}

impl<C: DataClient> Intercepted<C> {
    pub fn new(inner: C, encryption: Arc<FieldEncryption>) -> Self {
        Self { inner, encryption }
    }

    /// The wrapped client, bypassing encryption.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn encryption(&self) -> &Arc<FieldEncryption> {
        &self.encryption
    }
}

#[async_trait]
impl<C: DataClient> DataClient for Intercepted<C> {
    async fn execute(&self, operation: Operation) -> Result<Value, ClientError> {
        self.encryption.execute(&self.inner, operation).await
    }
}
