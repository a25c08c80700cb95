//! Repository pattern for database operations

use crate::{DbConnection, DbError, Result};
use docchat_core::{EmbeddingRecord, PassageMetadata, SourcePassage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Repository for all database operations
#[derive(Clone)]
pub struct Repository {
    db: DbConnection,
    // Serializes writers so sequence numbers stay unique and ordered
    write_lock: Arc<Mutex<()>>,
}

/// Stored shape of one embedded passage
#[derive(Debug, Serialize, Deserialize)]
struct PassageRow {
    corpus: String,
    seq: i64,
    content: String,
    embedding: Vec<f32>,
    source: String,
    document_id: String,
    chunk_index: i64,
    start_offset: i64,
    end_offset: i64,
    content_hash: String,
}

impl PassageRow {
    fn from_record(seq: i64, record: EmbeddingRecord) -> Self {
        let EmbeddingRecord {
            namespace,
            vector,
            text,
            metadata,
        } = record;

        Self {
            corpus: namespace,
            seq,
            content: text,
            embedding: vector,
            source: metadata.source,
            document_id: metadata.document_id,
            chunk_index: metadata.chunk_index as i64,
            start_offset: metadata.start_offset as i64,
            end_offset: metadata.end_offset as i64,
            content_hash: metadata.content_hash,
        }
    }
}

/// Row returned by a similarity query
#[derive(Debug, Deserialize)]
struct ScoredRow {
    seq: i64,
    content: String,
    source: String,
    document_id: String,
    chunk_index: i64,
    start_offset: i64,
    end_offset: i64,
    content_hash: String,
    // NaN or NONE when either vector has zero norm
    #[serde(default)]
    score: Option<f64>,
}

impl ScoredRow {
    /// Similarity with degenerate scores pinned to 0
    fn similarity(&self) -> f64 {
        self.score.filter(|s| s.is_finite()).unwrap_or(0.0)
    }
}

/// Most similar first, equal scores in insertion order
fn rank(rows: &mut Vec<ScoredRow>, limit: usize) {
    rows.sort_by(|a, b| {
        b.similarity()
            .total_cmp(&a.similarity())
            .then_with(|| a.seq.cmp(&b.seq))
    });
    rows.truncate(limit);
}

impl From<ScoredRow> for SourcePassage {
    fn from(row: ScoredRow) -> Self {
        let score = row.similarity() as f32;
        SourcePassage {
            page_content: row.content,
            metadata: PassageMetadata {
                source: row.source,
                document_id: row.document_id,
                chunk_index: row.chunk_index.max(0) as usize,
                start_offset: row.start_offset.max(0) as usize,
                end_offset: row.end_offset.max(0) as usize,
                content_hash: row.content_hash,
            },
            score,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeqRow {
    seq: i64,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    records: i64,
}

/// Record count of one namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceStats {
    #[serde(rename = "corpus")]
    pub namespace: String,
    pub records: i64,
}

impl Repository {
    /// Create a new repository
    pub fn new(db: DbConnection) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    // ==========================================
    // WRITE OPERATIONS
    // ==========================================

    /// Store records in `namespace`, preserving their order.
    ///
    /// Every record must carry `namespace`; a mismatch rejects the whole
    /// batch before anything is written.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn insert_embeddings(
        &self,
        namespace: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<usize> {
        if let Some(stray) = records.iter().find(|r| r.namespace != namespace) {
            return Err(DbError::NamespaceMismatch {
                expected: namespace.to_string(),
                found: stray.namespace.clone(),
            });
        }
        if records.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        let first_seq = self.next_seq().await?;
        let rows: Vec<PassageRow> = records
            .into_iter()
            .enumerate()
            .map(|(offset, record)| PassageRow::from_record(first_seq + offset as i64, record))
            .collect();
        let inserted = rows.len();

        self.db
            .query("INSERT INTO passage $rows RETURN NONE")
            .bind(("rows", rows))
            .await?
            .check()?;

        debug!(inserted, first_seq, "Stored embedding records");
        Ok(inserted)
    }

    async fn next_seq(&self) -> Result<i64> {
        let last: Vec<SeqRow> = self
            .db
            .query("SELECT seq FROM passage ORDER BY seq DESC LIMIT 1")
            .await?
            .take(0)?;

        Ok(last.first().map(|row| row.seq + 1).unwrap_or(0))
    }

    /// Delete every record of a namespace, returning how many were removed
    #[instrument(skip(self))]
    pub async fn purge(&self, namespace: &str) -> Result<i64> {
        let _guard = self.write_lock.lock().await;

        let removed = self.count(namespace).await?;
        self.db
            .query("DELETE passage WHERE corpus = $corpus")
            .bind(("corpus", namespace.to_string()))
            .await?
            .check()?;

        Ok(removed)
    }

    // ==========================================
    // READ OPERATIONS
    // ==========================================

    /// The `limit` passages of `namespace` most similar to `vector`.
    ///
    /// Ordered by cosine similarity descending; equal scores keep insertion
    /// order.
    #[instrument(skip(self, vector))]
    pub async fn nearest(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<SourcePassage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut rows: Vec<ScoredRow> = self
            .db
            .query(
                "SELECT seq, content, source, document_id, chunk_index, start_offset, end_offset, content_hash,
                        vector::similarity::cosine(embedding, $vector) AS score
                 FROM passage
                 WHERE corpus = $corpus
                 ORDER BY score DESC, seq ASC
                 LIMIT $limit",
            )
            .bind(("corpus", namespace.to_string()))
            .bind(("vector", vector))
            .bind(("limit", limit as i64))
            .await?
            .take(0)?;

        // Re-sort in Rust so tie-breaking does not depend on the engine
        rank(&mut rows, limit);

        Ok(rows.into_iter().map(SourcePassage::from).collect())
    }

    /// Which of `hashes` already exist in `namespace`
    #[instrument(skip(self, hashes), fields(count = hashes.len()))]
    pub async fn existing_hashes(
        &self,
        namespace: &str,
        hashes: Vec<String>,
    ) -> Result<HashSet<String>> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> = self
            .db
            .query(
                "SELECT VALUE content_hash FROM passage
                 WHERE corpus = $corpus AND content_hash INSIDE $hashes",
            )
            .bind(("corpus", namespace.to_string()))
            .bind(("hashes", hashes))
            .await?
            .take(0)?;

        Ok(found.into_iter().collect())
    }

    /// Number of records stored in a namespace
    #[instrument(skip(self))]
    pub async fn count(&self, namespace: &str) -> Result<i64> {
        let rows: Vec<CountRow> = self
            .db
            .query("SELECT count() AS records FROM passage WHERE corpus = $corpus GROUP ALL")
            .bind(("corpus", namespace.to_string()))
            .await?
            .take(0)?;

        Ok(rows.first().map(|row| row.records).unwrap_or(0))
    }

    /// Record counts for every namespace, sorted by name
    #[instrument(skip(self))]
    pub async fn namespace_stats(&self) -> Result<Vec<NamespaceStats>> {
        let mut stats: Vec<NamespaceStats> = self
            .db
            .query("SELECT corpus, count() AS records FROM passage GROUP BY corpus")
            .await?
            .take(0)?;

        stats.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        Ok(stats)
    }
}
