//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection string could not be understood
    #[error("Invalid store target: {0}")]
    InvalidTarget(String),

    /// Could not reach or authenticate against the database
    #[error("Connection error: {0}")]
    Connection(String),

    /// Constraint violation (unique, foreign key, missing key column, etc.)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid target error.
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Classify a sqlx error raised while writing rows.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => Self::Constraint(db_err.message().to_string()),
                _ => Self::Sqlx(err),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Connection(err.to_string()),
            _ => Self::Sqlx(err),
        }
    }
}
