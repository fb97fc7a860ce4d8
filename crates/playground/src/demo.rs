//! The demonstration scenario: write and read back protected fields through
//! the interceptor, then show what the store actually holds.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::{Action, ClientError, DataClient, Operation};
use fieldcrypt::{
    AuditSink, Configuration, EnvDefaults, FieldEncryption, Intercepted, TracingAudit,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::store::MemoryStore;

const SPY_EMAIL: &str = "spy@example.com";

/// Run the scenario against a fresh [`MemoryStore`].
pub async fn run(cfg: &Config) -> Result<()> {
    let env = EnvDefaults::from_env().context("failed to read FIELD_* environment")?;
    let config = Configuration::new(cfg.selectors()?);
    // Clones share the verbosity switch, so the scenario can mute single calls.
    let audit = TracingAudit::new(config.verbose(&env));
    let encryption = FieldEncryption::new(config, &env, Arc::new(audit.clone()))
        .context("failed to configure field encryption")?;
    if !encryption.is_enabled() {
        info!("field encryption is disabled; values are stored in plaintext");
    }

    let store = MemoryStore::new();
    let client = Intercepted::new(store.clone(), Arc::new(encryption));
    scenario(&client, &audit).await?;

    for model in ["User", "Post"] {
        for record in store.records(model).await {
            info!(model, stored = %serde_json::Value::Object(record), "stored record");
        }
    }
    Ok(())
}

/// The create / read / update / read / create sequence. Returns the user as
/// last read back.
///
/// Stage snapshots are muted for the clean-slate delete and restored afterwards.
pub async fn scenario(client: &impl DataClient, audit: &TracingAudit) -> Result<Value> {
    let verbose = audit.verbose();
    audit.set_verbose(false);
    let cleared = client
        .execute(op("User", Action::Delete, json!({ "where": { "email": SPY_EMAIL } }))?)
        .await;
    audit.set_verbose(verbose);

    // Clean slate: a missing record is fine.
    match cleared {
        Ok(_) => debug!("removed previous user"),
        Err(ClientError::NotFound(_)) => debug!("no previous user to remove"),
        Err(e) => return Err(e).context("clean slate delete failed"),
    }

    let user = client
        .execute(op(
            "User",
            Action::Create,
            json!({ "data": { "email": SPY_EMAIL, "name": "Super secret" } }),
        )?)
        .await
        .context("create user")?;
    info!(result = %user, "created user");

    let found = client
        .execute(op("User", Action::FindUnique, json!({ "where": { "email": SPY_EMAIL } }))?)
        .await
        .context("find user")?;
    info!(result = %found, "found user");

    let updated = client
        .execute(op(
            "User",
            Action::Update,
            json!({ "where": { "email": SPY_EMAIL }, "data": { "name": "Under cover" } }),
        )?)
        .await
        .context("update user")?;
    info!(result = %updated, "updated user");

    let reread = client
        .execute(op("User", Action::FindFirst, json!({ "where": { "email": SPY_EMAIL } }))?)
        .await
        .context("re-read user")?;
    info!(result = %reread, "re-read user");

    let post = client
        .execute(op(
            "Post",
            Action::Create,
            json!({ "data": {
                "title": "Field report",
                "content": "Meet at the usual place",
                "authorId": user["id"],
            } }),
        )?)
        .await
        .context("create post")?;
    info!(result = %post, "created post");

    Ok(reread)
}

fn op(model: &str, action: Action, args: Value) -> Result<Operation> {
    Ok(Operation::from_parts(Some(model.into()), action, args)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fieldcrypt::crypto::Algorithm;
    use fieldcrypt::{FieldSelectors, Key};
    use std::sync::Mutex;

    fn encryption_with(with_key: bool, audit: &TracingAudit) -> Arc<FieldEncryption> {
        let mut config =
            Configuration::new(FieldSelectors::parse(["User.name", "Post.content"]).unwrap());
        if with_key {
            config = config.with_encryption_key(Key::generate(Algorithm::default()).to_secret());
        }
        let audit = Arc::new(audit.clone());
        Arc::new(FieldEncryption::new(config, &EnvDefaults::default(), audit).unwrap())
    }

    fn encryption(with_key: bool) -> Arc<FieldEncryption> {
        encryption_with(with_key, &quiet())
    }

    fn quiet() -> TracingAudit {
        TracingAudit::new(false)
    }

    /// Notes whether snapshots were enabled when each action reached the store.
    struct VerbosityRecorder {
        store: MemoryStore,
        audit: TracingAudit,
        seen: Mutex<Vec<(Action, bool)>>,
    }

    #[async_trait]
    impl DataClient for VerbosityRecorder {
        async fn execute(&self, operation: Operation) -> Result<Value, ClientError> {
            self.seen
                .lock()
                .unwrap()
                .push((operation.action(), self.audit.verbose()));
            self.store.execute(operation).await
        }
    }

    #[tokio::test]
    async fn scenario_reads_back_plaintext_and_stores_ciphertext() {
        let store = MemoryStore::new();
        let client = Intercepted::new(store.clone(), encryption(true));

        let reread = scenario(&client, &quiet()).await.unwrap();
        assert_eq!(reread["name"], "Under cover");

        let users = store.records("User").await;
        assert_eq!(users.len(), 1);
        let stored = users[0]["name"].as_str().unwrap();
        assert!(stored.starts_with("v1."), "{stored}");
        assert_eq!(users[0]["email"], SPY_EMAIL);

        let posts = store.records("Post").await;
        assert!(posts[0]["content"].as_str().unwrap().starts_with("v1."));
        assert_eq!(posts[0]["title"], "Field report");
        assert_eq!(posts[0]["authorId"], users[0]["id"]);
    }

    #[tokio::test]
    async fn scenario_is_repeatable() {
        let store = MemoryStore::new();
        let client = Intercepted::new(store.clone(), encryption(true));
        scenario(&client, &quiet()).await.unwrap();
        scenario(&client, &quiet()).await.unwrap();
        assert_eq!(store.records("User").await.len(), 1);
    }

    #[tokio::test]
    async fn disabled_scenario_stores_plaintext() {
        let store = MemoryStore::new();
        let client = Intercepted::new(store.clone(), encryption(false));
        scenario(&client, &quiet()).await.unwrap();
        assert_eq!(store.records("User").await[0]["name"], "Under cover");
    }

    #[tokio::test]
    async fn clean_slate_delete_is_muted_then_restored() {
        let audit = TracingAudit::new(true);
        let recorder = VerbosityRecorder {
            store: MemoryStore::new(),
            audit: audit.clone(),
            seen: Mutex::new(Vec::new()),
        };
        let client = Intercepted::new(recorder, encryption_with(true, &audit));

        scenario(&client, &audit).await.unwrap();

        assert!(audit.verbose());
        let seen = client.inner().seen.lock().unwrap();
        assert_eq!(seen[0], (Action::Delete, false));
        assert!(seen[1..].iter().all(|(_, verbose)| *verbose), "{seen:?}");
    }
}
