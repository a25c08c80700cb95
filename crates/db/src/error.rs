//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Record namespace {found:?} does not match target namespace {expected:?}")]
    NamespaceMismatch { expected: String, found: String },

    #[error("Persistent storage is not compiled in (enable the `surrealkv` feature)")]
    PersistenceDisabled,

    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
