//! [`MemoryStore`]: an in-memory [`DataClient`] standing in for a database.
//!
//! Records are grouped by model. `where` selectors match on field equality.
//! Created records without an `id` are assigned a random UUID.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    Action, ClientError, DataClient, Operation, OtherOperation, ReadOperation, Record,
    WriteAction, WriteOperation, WritePayload,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<Record>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records of `model` exactly as persisted.
    pub async fn records(&self, model: &str) -> Vec<Record> {
        self.inner
            .read()
            .await
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    async fn read(&self, op: ReadOperation) -> Result<Value, ClientError> {
        let models = self.inner.read().await;
        let found = models
            .get(&op.model)
            .and_then(|records| records.iter().find(|r| matches(r, &op.args)));
        Ok(found.cloned().map(Value::Object).unwrap_or(Value::Null))
    }

    async fn write(&self, op: WriteOperation) -> Result<Value, ClientError> {
        let action = Action::from(op.action);
        let mut models = self.inner.write().await;
        let records = models.entry(op.model.clone()).or_default();
        let existing = if op.action == WriteAction::Create {
            None
        } else {
            let selector = op
                .args
                .get("where")
                .ok_or_else(|| ClientError::BadRequest(format!("{action} requires `where`")))?;
            if !selector.is_object() {
                return Err(ClientError::BadRequest("`where` must be an object".into()));
            }
            records.iter().position(|r| matches(r, &op.args))
        };

        let record = match (op.payload, existing) {
            (WritePayload::Data(data), Some(i))
            | (WritePayload::Upsert { update: data, .. }, Some(i)) => {
                records[i].extend(data);
                records[i].clone()
            }
            (WritePayload::Data(_), None) if op.action != WriteAction::Create => {
                return Err(ClientError::NotFound(format!("{} record", op.model)));
            }
            (WritePayload::Data(data), None)
            | (WritePayload::Upsert { create: data, .. }, None) => {
                let record = with_id(data);
                records.push(record.clone());
                record
            }
        };
        debug!(model = %op.model, %action, "record written");
        Ok(Value::Object(record))
    }

    async fn other(&self, op: OtherOperation) -> Result<Value, ClientError> {
        let Some(model) = op.model else {
            return Err(ClientError::BadRequest(format!(
                "raw action {} is not supported",
                op.action
            )));
        };

        match op.action {
            Action::Delete => {
                let mut models = self.inner.write().await;
                let records = models.entry(model.clone()).or_default();
                let index = records
                    .iter()
                    .position(|r| matches(r, &op.args))
                    .ok_or_else(|| ClientError::NotFound(format!("{model} record")))?;
                Ok(Value::Object(records.remove(index)))
            }
            Action::DeleteMany => {
                let mut models = self.inner.write().await;
                let records = models.entry(model).or_default();
                let before = records.len();
                records.retain(|r| !matches(r, &op.args));
                Ok(serde_json::json!({ "count": before - records.len() }))
            }
            Action::FindMany => {
                let models = self.inner.read().await;
                let found = models
                    .get(&model)
                    .map(|records| {
                        records
                            .iter()
                            .filter(|r| matches(r, &op.args))
                            .cloned()
                            .map(Value::Object)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Array(found))
            }
            Action::Count => {
                let models = self.inner.read().await;
                let count = models
                    .get(&model)
                    .map_or(0, |records| records.iter().filter(|r| matches(r, &op.args)).count());
                Ok(Value::from(count))
            }
            action => Err(ClientError::BadRequest(format!(
                "{model}.{action} is not supported"
            ))),
        }
    }
}

#[async_trait]
impl DataClient for MemoryStore {
    async fn execute(&self, operation: Operation) -> Result<Value, ClientError> {
        match operation {
            Operation::Read(op) => self.read(op).await,
            Operation::Write(op) => self.write(op).await,
            Operation::Other(op) => self.other(op).await,
        }
    }
}

/// A missing or non-object `where` matches every record.
fn matches(record: &Record, args: &Value) -> bool {
    args.get("where")
        .and_then(Value::as_object)
        .map_or(true, |selector| {
            selector.iter().all(|(k, v)| record.get(k) == Some(v))
        })
}

fn with_id(mut record: Record) -> Record {
    record
        .entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    record
}
