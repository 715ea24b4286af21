//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return DbError::Conflict(db.message().to_string());
            }
        }
        DbError::Database(err)
    }
}

impl From<DbError> for conveyor_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => conveyor_core::Error::NotFound(what),
            DbError::InvalidData(message) => conveyor_core::Error::InvalidInput(message),
            DbError::Conflict(message) => conveyor_core::Error::Conflict(message),
            other => conveyor_core::Error::Database(other.to_string()),
        }
    }
}
