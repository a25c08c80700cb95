//! Storage layer for docchat
//!
//! Embedding records live in an embedded SurrealDB instance: in memory for
//! tests and throwaway sessions, SurrealKV on disk otherwise.

pub mod error;
pub mod repository;
pub mod schema;

pub use error::{DbError, Result};
pub use repository::{NamespaceStats, Repository};

use std::path::Path;
use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;

/// Database connection type
pub type DbConnection = Surreal<Db>;

/// Initialize database on disk (persistent)
#[cfg(feature = "surrealkv")]
pub async fn init_persistent(path: impl AsRef<Path>) -> Result<DbConnection> {
    use surrealdb::engine::local::SurrealKv;

    let db = Surreal::new::<SurrealKv>(path.as_ref()).await?;
    setup_database(&db).await?;
    Ok(db)
}

#[cfg(not(feature = "surrealkv"))]
pub async fn init_persistent(_path: impl AsRef<Path>) -> Result<DbConnection> {
    Err(DbError::PersistenceDisabled)
}

/// Initialize database in-memory (for testing)
pub async fn init_memory() -> Result<DbConnection> {
    let db = Surreal::new::<Mem>(()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Setup database namespace, database, and schema
async fn setup_database(db: &DbConnection) -> Result<()> {
    db.use_ns("docchat").use_db("corpus").await?;
    schema::initialize_schema(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_memory() {
        let db = init_memory().await.expect("Failed to init memory db");
        let rows: Vec<serde_json::Value> = db.select(schema::PASSAGE_TABLE).await.unwrap();
        assert!(rows.is_empty());
    }

    #[cfg(feature = "surrealkv")]
    #[tokio::test]
    async fn test_init_persistent_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        let db = init_persistent(&path).await.expect("Failed to init persistent db");
        let rows: Vec<serde_json::Value> = db.select(schema::PASSAGE_TABLE).await.unwrap();
        assert!(rows.is_empty());
    }
}
