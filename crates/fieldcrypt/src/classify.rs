//! Decide which transforms apply to an operation.

use common::{Action, ActionKind};

use crate::config::FieldSelectors;

/// Transforms to run around one delegated operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EncryptionPlan {
    /// Encrypt protected fields of the write payload before delegating.
    pub encrypt_on_write: bool,
    /// Decrypt protected fields of the returned record.
    pub decrypt_on_read: bool,
}

impl EncryptionPlan {
    /// Neither transform applies.
    pub const SKIP: Self = Self {
        encrypt_on_write: false,
        decrypt_on_read: false,
    };

    pub fn is_skip(&self) -> bool {
        *self == Self::SKIP
    }
}

/// Classify an operation by its target model and action.
///
/// | action | encrypt_on_write | decrypt_on_read |
/// |---|---|---|
/// | `findUnique`, `findFirst` | no | yes |
/// | `create`, `update`, `upsert` | if the model has protected fields | yes |
/// | anything else | no | no |
///
/// Raw access (no model) is never transformed.
pub fn classify(model: Option<&str>, action: &Action, fields: &FieldSelectors) -> EncryptionPlan {
    let Some(model) = model else {
        return EncryptionPlan::SKIP;
    };

    match action.kind() {
        ActionKind::ReadSingle => EncryptionPlan {
            encrypt_on_write: false,
            decrypt_on_read: true,
        },
        ActionKind::Write => EncryptionPlan {
            encrypt_on_write: fields.has_model(model),
            decrypt_on_read: true,
        },
        ActionKind::Other => EncryptionPlan::SKIP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> FieldSelectors {
        FieldSelectors::parse(["User.name", "Post.content"]).unwrap()
    }

    const READ: EncryptionPlan = EncryptionPlan {
        encrypt_on_write: false,
        decrypt_on_read: true,
    };

    const WRITE: EncryptionPlan = EncryptionPlan {
        encrypt_on_write: true,
        decrypt_on_read: true,
    };

    #[test]
    fn single_reads_decrypt_only() {
        for action in [Action::FindUnique, Action::FindFirst] {
            assert_eq!(classify(Some("User"), &action, &fields()), READ);
            assert_eq!(classify(Some("Comment"), &action, &fields()), READ);
        }
    }

    #[test]
    fn writes_encrypt_when_model_is_configured() {
        for action in [Action::Create, Action::Update, Action::Upsert] {
            assert_eq!(classify(Some("User"), &action, &fields()), WRITE);
            assert_eq!(classify(Some("Comment"), &action, &fields()), READ);
        }
    }

    #[test]
    fn everything_else_is_skipped() {
        for action in [
            Action::FindMany,
            Action::CreateMany,
            Action::UpdateMany,
            Action::Delete,
            Action::DeleteMany,
            Action::Count,
            Action::Aggregate,
            Action::GroupBy,
            Action::ExecuteRaw,
            Action::QueryRaw,
            Action::Other("findRaw".into()),
            Action::from("somethingNew"),
        ] {
            assert!(
                classify(Some("User"), &action, &fields()).is_skip(),
                "{action} was not skipped"
            );
        }
    }

    #[test]
    fn missing_model_is_always_skipped() {
        for action in [
            Action::FindUnique,
            Action::Create,
            Action::Update,
            Action::Upsert,
            Action::QueryRaw,
        ] {
            assert_eq!(classify(None, &action, &fields()), EncryptionPlan::SKIP);
        }
    }
}
