//! Operation model handed from a data client to its interception hook.
//!
//! A data client describes every call as a model name (absent for raw access),
//! an action name and an untyped argument tree. [`Operation::from_parts`] turns
//! those into tagged variants so that interceptors only see the fields relevant
//! to each kind of action: reads carry their selector arguments, writes carry
//! an explicit [`WritePayload`], and everything else is opaque.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// JSON object holding one record's top-level fields.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Action names understood by data clients.
///
/// Unrecognised names are preserved in [`Action::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    FindUnique,
    FindFirst,
    FindMany,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    Aggregate,
    GroupBy,
    ExecuteRaw,
    QueryRaw,
    Other(String),
}

/// Coarse grouping of actions used to decide which transforms apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Single-record lookups (`findUnique`, `findFirst`).
    ReadSingle,
    /// Single-record writes (`create`, `update`, `upsert`).
    Write,
    /// Deletes, batch operations, aggregates, raw access and unknown actions.
    Other,
}

impl Action {
    /// The client-facing action name.
    pub fn as_str(&self) -> &str {
        match self {
            Action::FindUnique => "findUnique",
            Action::FindFirst => "findFirst",
            Action::FindMany => "findMany",
            Action::Create => "create",
            Action::CreateMany => "createMany",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Upsert => "upsert",
            Action::Delete => "delete",
            Action::DeleteMany => "deleteMany",
            Action::Count => "count",
            Action::Aggregate => "aggregate",
            Action::GroupBy => "groupBy",
            Action::ExecuteRaw => "executeRaw",
            Action::QueryRaw => "queryRaw",
            Action::Other(name) => name,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::FindUnique | Action::FindFirst => ActionKind::ReadSingle,
            Action::Create | Action::Update | Action::Upsert => ActionKind::Write,
            _ => ActionKind::Other,
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "findUnique" => Action::FindUnique,
            "findFirst" => Action::FindFirst,
            "findMany" => Action::FindMany,
            "create" => Action::Create,
            "createMany" => Action::CreateMany,
            "update" => Action::Update,
            "updateMany" => Action::UpdateMany,
            "upsert" => Action::Upsert,
            "delete" => Action::Delete,
            "deleteMany" => Action::DeleteMany,
            "count" => Action::Count,
            "aggregate" => Action::Aggregate,
            "groupBy" => Action::GroupBy,
            "executeRaw" => Action::ExecuteRaw,
            "queryRaw" => Action::QueryRaw,
            other => Action::Other(other.to_owned()),
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::from(name.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_owned()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that look up a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadAction {
    FindUnique,
    FindFirst,
}

/// Actions that write a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteAction {
    Create,
    Update,
    Upsert,
}

impl From<ReadAction> for Action {
    fn from(action: ReadAction) -> Self {
        match action {
            ReadAction::FindUnique => Action::FindUnique,
            ReadAction::FindFirst => Action::FindFirst,
        }
    }
}

impl From<WriteAction> for Action {
    fn from(action: WriteAction) -> Self {
        match action {
            WriteAction::Create => Action::Create,
            WriteAction::Update => Action::Update,
            WriteAction::Upsert => Action::Upsert,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Record data carried by a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePayload {
    /// `create` and `update` carry a single `data` object.
    Data(Record),
    /// `upsert` carries one object for each branch.
    Upsert { create: Record, update: Record },
}

impl WritePayload {
    /// Every record object in the payload, in `create`, `update` order for upserts.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        let records: Vec<&mut Record> = match self {
            WritePayload::Data(data) => vec![data],
            WritePayload::Upsert { create, update } => vec![create, update],
        };
        records.into_iter()
    }
}

/// A single-record lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOperation {
    pub model: String,
    pub action: ReadAction,
    /// Selector arguments (`where`, `select`, `include`, ...).
    pub args: Value,
}

/// A single-record write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    pub model: String,
    pub action: WriteAction,
    pub payload: WritePayload,
    /// Remaining arguments with the payload keys removed.
    pub args: Value,
}

/// Any operation the interception layer passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherOperation {
    /// `None` for raw / unstructured access.
    pub model: Option<String>,
    pub action: Action,
    pub args: Value,
}

/// One call against a data client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Read(ReadOperation),
    Write(WriteOperation),
    Other(OtherOperation),
}

impl Operation {
    /// Build a typed operation from the untyped parts a data client supplies.
    ///
    /// Write payloads are moved out of `args.data` (or `args.create` /
    /// `args.update` for upserts).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BadRequest`] if a write is missing its payload or
    /// the payload is not a JSON object.
    pub fn from_parts(
        model: Option<String>,
        action: Action,
        args: Value,
    ) -> Result<Self, ClientError> {
        let Some(model) = model else {
            return Ok(Operation::Other(OtherOperation {
                model: None,
                action,
                args,
            }));
        };

        match action {
            Action::FindUnique => Ok(Operation::Read(ReadOperation {
                model,
                action: ReadAction::FindUnique,
                args,
            })),
            Action::FindFirst => Ok(Operation::Read(ReadOperation {
                model,
                action: ReadAction::FindFirst,
                args,
            })),
            Action::Create | Action::Update => {
                let write_action = if action == Action::Create {
                    WriteAction::Create
                } else {
                    WriteAction::Update
                };
                let mut args = args;
                let data = take_record(&mut args, "data", &model, &action)?;
                Ok(Operation::Write(WriteOperation {
                    model,
                    action: write_action,
                    payload: WritePayload::Data(data),
                    args,
                }))
            }
            Action::Upsert => {
                let mut args = args;
                let create = take_record(&mut args, "create", &model, &action)?;
                let update = take_record(&mut args, "update", &model, &action)?;
                Ok(Operation::Write(WriteOperation {
                    model,
                    action: WriteAction::Upsert,
                    payload: WritePayload::Upsert { create, update },
                    args,
                }))
            }
            other => Ok(Operation::Other(OtherOperation {
                model: Some(model),
                action: other,
                args,
            })),
        }
    }

    /// Reassemble the untyped `(model, action, args)` form, putting write
    /// payloads back under their original keys.
    pub fn into_parts(self) -> (Option<String>, Action, Value) {
        match self {
            Operation::Read(op) => (Some(op.model), op.action.into(), op.args),
            Operation::Write(op) => {
                let mut args = match op.args {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                match op.payload {
                    WritePayload::Data(data) => {
                        args.insert("data".into(), Value::Object(data));
                    }
                    WritePayload::Upsert { create, update } => {
                        args.insert("create".into(), Value::Object(create));
                        args.insert("update".into(), Value::Object(update));
                    }
                }
                (Some(op.model), op.action.into(), Value::Object(args))
            }
            Operation::Other(op) => (op.model, op.action, op.args),
        }
    }

    /// Target model name, `None` for raw access.
    pub fn model(&self) -> Option<&str> {
        match self {
            Operation::Read(op) => Some(&op.model),
            Operation::Write(op) => Some(&op.model),
            Operation::Other(op) => op.model.as_deref(),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Operation::Read(op) => op.action.into(),
            Operation::Write(op) => op.action.into(),
            Operation::Other(op) => op.action.clone(),
        }
    }

    /// Mutable access to the write payload, `None` for non-write operations.
    pub fn payload_mut(&mut self) -> Option<&mut WritePayload> {
        match self {
            Operation::Write(op) => Some(&mut op.payload),
            _ => None,
        }
    }

    /// `Model.action` label used in logs, `raw.action` when no model is set.
    pub fn label(&self) -> String {
        format!("{}.{}", self.model().unwrap_or("raw"), self.action())
    }
}

/// Remove `key` from `args` and return it as a record.
fn take_record(
    args: &mut Value,
    key: &str,
    model: &str,
    action: &Action,
) -> Result<Record, ClientError> {
    let taken = args
        .as_object_mut()
        .and_then(|map| map.remove(key))
        .ok_or_else(|| {
            ClientError::BadRequest(format!("{model}.{action} requires `{key}` in its arguments"))
        })?;
    match taken {
        Value::Object(record) => Ok(record),
        _ => Err(ClientError::BadRequest(format!(
            "{model}.{action}: `{key}` must be an object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_names_parse_and_display() {
        for name in [
            "findUnique",
            "findFirst",
            "findMany",
            "create",
            "createMany",
            "update",
            "updateMany",
            "upsert",
            "delete",
            "deleteMany",
            "count",
            "aggregate",
            "groupBy",
            "executeRaw",
            "queryRaw",
        ] {
            let action = Action::from(name);
            assert!(!matches!(action, Action::Other(_)), "{name} parsed as Other");
            assert_eq!(action.to_string(), name);
        }
    }

    #[test]
    fn unknown_action_is_preserved() {
        let action = Action::from("findRaw");
        assert_eq!(action, Action::Other("findRaw".into()));
        assert_eq!(action.as_str(), "findRaw");
        assert_eq!(action.kind(), ActionKind::Other);
    }

    #[test]
    fn action_kinds() {
        assert_eq!(Action::FindUnique.kind(), ActionKind::ReadSingle);
        assert_eq!(Action::FindFirst.kind(), ActionKind::ReadSingle);
        assert_eq!(Action::Create.kind(), ActionKind::Write);
        assert_eq!(Action::Update.kind(), ActionKind::Write);
        assert_eq!(Action::Upsert.kind(), ActionKind::Write);
        assert_eq!(Action::FindMany.kind(), ActionKind::Other);
        assert_eq!(Action::Delete.kind(), ActionKind::Other);
        assert_eq!(Action::CreateMany.kind(), ActionKind::Other);
    }

    #[test]
    fn action_serde_uses_client_names() {
        let json = serde_json::to_string(&Action::GroupBy).unwrap();
        assert_eq!(json, "\"groupBy\"");
        let decoded: Action = serde_json::from_str("\"upsert\"").unwrap();
        assert_eq!(decoded, Action::Upsert);
    }

    #[test]
    fn create_moves_data_into_payload() {
        let op = Operation::from_parts(
            Some("User".into()),
            Action::Create,
            json!({"data": {"email": "a@b.c", "name": "Alice"}, "select": {"id": true}}),
        )
        .unwrap();
        let Operation::Write(write) = &op else {
            panic!("expected write, got {op:?}");
        };
        assert_eq!(write.action, WriteAction::Create);
        assert_eq!(
            write.payload,
            WritePayload::Data(
                json!({"email": "a@b.c", "name": "Alice"})
                    .as_object()
                    .unwrap()
                    .clone()
            )
        );
        assert!(write.args.get("data").is_none());
        assert_eq!(write.args["select"]["id"], true);
    }

    #[test]
    fn upsert_splits_branches() {
        let op = Operation::from_parts(
            Some("User".into()),
            Action::Upsert,
            json!({"where": {"id": 1}, "create": {"name": "a"}, "update": {"name": "b"}}),
        )
        .unwrap();
        let Operation::Write(write) = op else {
            panic!("expected write");
        };
        match write.payload {
            WritePayload::Upsert { create, update } => {
                assert_eq!(create["name"], "a");
                assert_eq!(update["name"], "b");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn write_without_data_is_bad_request() {
        let err = Operation::from_parts(Some("User".into()), Action::Update, json!({"where": {}}))
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");

        let err = Operation::from_parts(Some("User".into()), Action::Create, json!({"data": 3}))
            .unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn missing_model_is_other() {
        let op = Operation::from_parts(None, Action::Create, json!({"data": {}})).unwrap();
        assert!(matches!(op, Operation::Other(OtherOperation { model: None, .. })));
        assert_eq!(op.label(), "raw.create");
    }

    #[test]
    fn into_parts_restores_args() {
        let args = json!({"where": {"id": 7}, "create": {"name": "a"}, "update": {"name": "b"}});
        let op = Operation::from_parts(Some("Post".into()), Action::Upsert, args.clone()).unwrap();
        let (model, action, restored) = op.into_parts();
        assert_eq!(model.as_deref(), Some("Post"));
        assert_eq!(action, Action::Upsert);
        assert_eq!(restored, args);
    }

    #[test]
    fn payload_records_in_order() {
        let mut payload = WritePayload::Upsert {
            create: Record::new(),
            update: Record::new(),
        };
        for (i, record) in payload.records_mut().enumerate() {
            record.insert("n".into(), json!(i));
        }
        let WritePayload::Upsert { create, update } = payload else {
            unreachable!()
        };
        assert_eq!(create["n"], 0);
        assert_eq!(update["n"], 1);
    }

    #[test]
    fn label_and_accessors() {
        let mut op = Operation::from_parts(
            Some("User".into()),
            Action::FindUnique,
            json!({"where": {"email": "x"}}),
        )
        .unwrap();
        assert_eq!(op.label(), "User.findUnique");
        assert_eq!(op.model(), Some("User"));
        assert_eq!(op.action(), Action::FindUnique);
        assert!(op.payload_mut().is_none());
    }
}
