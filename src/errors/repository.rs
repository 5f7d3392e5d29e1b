use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(SqlxError),

    /// Unique constraint violation on `short_code`
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// The store did not answer within the request deadline
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The pool is closed or the backend cannot be reached
    #[error("Unavailable error: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped to a record
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl RepositoryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::PoolTimedOut => Self::Timeout("Timed out acquiring a connection".to_string()),
            SqlxError::PoolClosed | SqlxError::WorkerCrashed => {
                Self::Unavailable(err.to_string())
            }
            SqlxError::ColumnNotFound(_)
            | SqlxError::ColumnDecode { .. }
            | SqlxError::Decode(_)
            | SqlxError::TypeNotFound { .. } => Self::InvalidData(err.to_string()),
            SqlxError::Database(db_err) => {
                // PostgreSQL error codes for common constraints
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        // Unique violation
                        "23505" => {
                            return Self::Conflict("Short code already exists".to_string())
                        }
                        // Check constraint violation
                        "23514" => {
                            return Self::InvalidData("Data violates constraints".to_string())
                        }
                        _ => {}
                    }
                }
                Self::Database(SqlxError::Database(db_err))
            }
            _ => Self::Database(err),
        }
    }
}
