//! Error types for the workflow engine
//!
//! Every transition validates before it mutates: `Validation` errors are
//! raised before any row is touched, `State` errors reject the operation
//! with no partial mutation, and anything raised inside a transaction
//! aborts that transaction.

use thiserror::Error;

use crate::blob_store::BlobStoreError;

/// Main error type for workflow operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input, rejected before any mutation. Carries the
    /// offending field for form-level reporting.
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// The entity is not in a stage where the requested action applies,
    /// or no matching pending approval exists. A race loser on the
    /// pending-entry lookup surfaces here too; safe to retry after reload.
    #[error("State error: {0}")]
    State(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Blob store failure for a mandatory artifact. Best-effort deletes
    /// never raise this; they are logged and ignored.
    #[error("Storage error: {0}")]
    Storage(#[from] BlobStoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    /// Shorthand for a field-level validation failure
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = WorkflowError::validation("surname", "required for individual applicants");
        assert_eq!(
            err.to_string(),
            "Validation error on 'surname': required for individual applicants"
        );
    }
}
