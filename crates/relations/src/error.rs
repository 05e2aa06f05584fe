//! Error types for relation resolution
//!
//! Every failure raised by this crate is a [`RelationError`]. Conditions are
//! never retried or suppressed here; they propagate to the caller as-is.

use thiserror::Error;

use crate::relations::metadata::RelationKind;

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relation operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationError {
    /// The relation kind does not implement the requested operation
    #[error("relation kind {kind} does not support {operation}")]
    Unsupported {
        kind: RelationKind,
        operation: &'static str,
    },

    /// The input does not identify a target record
    #[error("missing input: {0}")]
    MissingInput(String),

    /// A referenced row that must exist could not be found
    #[error("associated record not found: {model} with key {key}")]
    RecordNotFound { model: String, key: String },

    /// Attribute binding would overwrite one of the owner's own attributes
    #[error("bound attribute '{attribute}' already exists on the owner")]
    BindingConflict { attribute: String },

    /// The model declares no relation with this name
    #[error("model '{model}' has no relation named '{relation}'")]
    UnknownRelation { model: String, relation: String },

    /// No model is registered under this name
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Invalid relation or registry configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query building error
    #[error("query error: {0}")]
    Query(String),

    /// Failure reported by the query executor
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RelationError {
    pub(crate) fn unsupported(kind: RelationKind, operation: &'static str) -> Self {
        RelationError::Unsupported { kind, operation }
    }

    /// True when the relation kind lacks the operation. Callers use this as a
    /// capability check.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, RelationError::Unsupported { .. })
    }

    /// True when a referenced row was expected to exist but did not.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, RelationError::RecordNotFound { .. })
    }
}

impl From<sqlx::Error> for RelationError {
    fn from(err: sqlx::Error) -> Self {
        RelationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        RelationError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for RelationError {
    fn from(err: anyhow::Error) -> Self {
        RelationError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_names_kind_and_operation() {
        let err = RelationError::unsupported(RelationKind::HasManyThrough, "has_where");
        assert_eq!(
            err.to_string(),
            "relation kind has_many_through does not support has_where"
        );
        assert!(err.is_unsupported());
        assert!(!err.is_integrity_fault());
    }

    #[test]
    fn test_record_not_found_is_integrity_fault() {
        let err = RelationError::RecordNotFound {
            model: "Post".to_string(),
            key: "7".to_string(),
        };
        assert!(err.is_integrity_fault());
        assert_eq!(err.to_string(), "associated record not found: Post with key 7");
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: RelationError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RelationError::Serialization(_)));
    }
}
