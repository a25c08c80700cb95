//! SurrealDB schema definitions

use crate::{DbConnection, Result};
use tracing::info;

/// Table holding one row per embedded chunk
pub const PASSAGE_TABLE: &str = "passage";

/// Initialize the database schema
pub async fn initialize_schema(db: &DbConnection) -> Result<()> {
    info!("Initializing database schema...");

    db.query(SCHEMA_DEFINITION).await?.check()?;

    info!("Schema initialized successfully");
    Ok(())
}

// Vectors are compared with a brute-force cosine scan, so the table carries
// no HNSW index and accepts any embedding dimension.
const SCHEMA_DEFINITION: &str = r#"
DEFINE TABLE IF NOT EXISTS passage SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS corpus ON passage TYPE string;
DEFINE FIELD IF NOT EXISTS seq ON passage TYPE int;
DEFINE FIELD IF NOT EXISTS content ON passage TYPE string;
DEFINE FIELD IF NOT EXISTS embedding ON passage TYPE array<float>;
DEFINE FIELD IF NOT EXISTS source ON passage TYPE string;
DEFINE FIELD IF NOT EXISTS document_id ON passage TYPE string;
DEFINE FIELD IF NOT EXISTS chunk_index ON passage TYPE int;
DEFINE FIELD IF NOT EXISTS start_offset ON passage TYPE int;
DEFINE FIELD IF NOT EXISTS end_offset ON passage TYPE int;
DEFINE FIELD IF NOT EXISTS content_hash ON passage TYPE string;

DEFINE INDEX IF NOT EXISTS idx_passage_corpus ON passage FIELDS corpus;
DEFINE INDEX IF NOT EXISTS idx_passage_hash ON passage FIELDS corpus, content_hash;
DEFINE INDEX IF NOT EXISTS idx_passage_seq ON passage FIELDS seq;
"#;

#[cfg(test)]
mod tests {
    use crate::init_memory;

    #[tokio::test]
    async fn test_schema_is_reapplicable() {
        let db = init_memory().await.expect("Failed to init db");

        super::initialize_schema(&db)
            .await
            .expect("Schema should apply twice");
    }
}
