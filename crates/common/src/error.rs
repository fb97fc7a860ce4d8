//! Error type returned by data clients and by the interception layer on top of them.

use thiserror::Error;

/// Top-level data client error type.
///
/// Variants map to short machine-readable codes returned to callers:
/// - [`ClientError::BadRequest`] → `bad_request`
/// - [`ClientError::NotFound`] → `not_found`
/// - [`ClientError::EncryptionFailure`] → `encryption_failure`
/// - [`ClientError::Unavailable`] → `unavailable`
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation was malformed: missing selector or wrong payload shape.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The record targeted by the operation does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A protected field could not be encrypted; the write was not performed.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The underlying store is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Returns the machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::BadRequest(_) => "bad_request",
            ClientError::NotFound(_) => "not_found",
            ClientError::EncryptionFailure(_) => "encryption_failure",
            ClientError::Unavailable(_) => "unavailable",
            ClientError::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` when the error only means the target record is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(ClientError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(ClientError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ClientError::EncryptionFailure("x".into()).code(),
            "encryption_failure"
        );
        assert_eq!(ClientError::Unavailable("x".into()).code(), "unavailable");
        assert_eq!(ClientError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn display_includes_message() {
        let e = ClientError::BadRequest("missing where clause".into());
        assert!(e.to_string().contains("missing where clause"));
    }

    #[test]
    fn not_found_predicate() {
        assert!(ClientError::NotFound("User".into()).is_not_found());
        assert!(!ClientError::Internal("boom".into()).is_not_found());
    }
}
