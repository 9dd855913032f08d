use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("database migration error: {0}")]
    Migration(String),
    #[error("database query error: {0}")]
    Query(String),
    /// A row with the same key already exists.
    #[error("duplicate row")]
    Duplicate,
    #[error("database operation deadline exceeded")]
    Timeout,
    #[error("database task failed: {0}")]
    Task(String),
}

impl DatabaseError {
    /// Whether the caller may reasonably retry the whole request.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DatabaseError::Duplicate)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate)
    }
}

impl From<DieselError> for DatabaseError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                DatabaseError::Duplicate
            }
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                DatabaseError::Connection(info.message().to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }
}
