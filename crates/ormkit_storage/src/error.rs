//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A condition fragment could not be parsed or evaluated.
    #[error("invalid condition: {message}")]
    InvalidCondition {
        /// Description of the problem.
        message: String,
    },

    /// A placeholder had no bound value, or values were left over.
    #[error("placeholder mismatch: {placeholders} placeholders, {bound} bound values")]
    PlaceholderMismatch {
        /// Number of `?` placeholders in the condition.
        placeholders: usize,
        /// Number of values supplied.
        bound: usize,
    },

    /// A write violated a table constraint.
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation {
        /// The table being written.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// A row addressed by identifier does not exist.
    #[error("row {id} not found in {table}")]
    RowNotFound {
        /// The table searched.
        table: String,
        /// Rendered identifier.
        id: String,
    },

    /// A transaction was started while another one is open.
    #[error("a transaction is already active")]
    TransactionAlreadyActive,

    /// Commit or rollback was requested with no open transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// The backend refused the operation.
    #[error("backend rejected operation: {0}")]
    Rejected(String),
}

impl StorageError {
    /// Creates an invalid condition error.
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a rejected-operation error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
