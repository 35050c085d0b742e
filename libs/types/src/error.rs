//! Error types for field, message and subject validation

use thiserror::Error;

/// Errors raised while building or inspecting messages
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Field names must contain at least one non-whitespace character
    #[error("Field name cannot be empty")]
    EmptyFieldName,

    #[error("Duplicate field '{0}'")]
    DuplicateField(String),

    #[error("Invalid subject '{subject}': {reason}")]
    InvalidSubject { subject: String, reason: String },

    #[error("Invalid subscription pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Message JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for TypesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type for message operations
pub type TypesResult<T> = Result<T, TypesError>;
