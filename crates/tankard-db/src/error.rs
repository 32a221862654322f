//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl From<DbError> for tankard_core::CoreError {
    fn from(err: DbError) -> Self {
        tankard_core::CoreError::Storage(err.to_string())
    }
}

/// Postgres unique-constraint violation (SQLSTATE 23505). The adapters
/// translate these into the domain's concurrency sentinels.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
