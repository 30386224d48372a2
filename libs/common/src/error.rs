//! Custom error types for the common library
//!
//! This module defines the persistence error taxonomy shared by every
//! repository implementation in the job board.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A unique constraint rejected the write
    #[error("Duplicate value for {field}")]
    Duplicate { field: &'static str },

    /// A stored row could not be mapped back into a model
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Map a sqlx error, turning unique violations into [`DatabaseError::Duplicate`]
    pub fn from_write(err: SqlxError, field: &'static str) -> Self {
        match &err {
            SqlxError::Database(db) if db.is_unique_violation() => Self::Duplicate { field },
            _ => Self::Query(err),
        }
    }
}

impl From<SqlxError> for DatabaseError {
    fn from(err: SqlxError) -> Self {
        Self::Query(err)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
