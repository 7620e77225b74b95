//! Error types for the store

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected an operation
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection lock was poisoned by a panicking holder
    #[error("connection lock poisoned")]
    Poisoned,

    /// A row holds a value the current code cannot interpret
    #[error("corrupt row in {table}: {detail}")]
    CorruptRow {
        /// Table the row was read from
        table: &'static str,
        /// What failed to decode
        detail: String,
    },
}

impl StoreError {
    /// Whether this failure is a uniqueness-constraint violation.
    ///
    /// The engine treats these as "somebody else got there first": a second
    /// active cycle, a duplicate entry, a double claim.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
