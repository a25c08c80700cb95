//! Ingestion pipeline: load -> chunk -> embed -> store
//!
//! Runs are at-least-once. A failure aborts the run without rolling back
//! batches already stored, and re-running without `dedupe` stores the same
//! chunks again.

use crate::capabilities::{Embedder, VectorIndex};
use crate::chain::DEFAULT_CALL_TIMEOUT;
use crate::error::Service;
use crate::loader::DirectoryLoader;
use crate::{AgentError, Result};
use chrono::{DateTime, Utc};
use docchat_core::{chunk_document, Chunk, ChunkingConfig, Document, EmbeddingRecord};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "pdf-docs";

/// Chunks per embedding request
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Index partition every record is written to
    pub namespace: String,
    pub chunking: ChunkingConfig,
    pub embed_batch_size: usize,
    /// Skip chunks whose content hash is already stored in the namespace
    pub dedupe: bool,
    /// Deadline for each embedding or storage call
    pub call_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            chunking: ChunkingConfig::default(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            dedupe: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embed_batch_size == 0 {
            return Err(AgentError::Validation(
                "embed batch size must be at least 1".into(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(AgentError::Validation("namespace must not be empty".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(AgentError::Validation("call timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub namespace: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents_loaded: usize,
    /// Documents with no extractable text
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub records_inserted: usize,
    pub duplicates_skipped: usize,
}

impl IngestReport {
    fn start(namespace: &str) -> Self {
        let now = Utc::now();
        Self {
            namespace: namespace.to_string(),
            started_at: now,
            finished_at: now,
            documents_loaded: 0,
            documents_skipped: 0,
            chunks_created: 0,
            records_inserted: 0,
            duplicates_skipped: 0,
        }
    }
}

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    loader: DirectoryLoader,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: IngestConfig) -> Self {
        Self {
            embedder,
            index,
            loader: DirectoryLoader::default(),
            config,
        }
    }

    pub fn with_loader(mut self, loader: DirectoryLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest every supported file under `path`
    #[instrument(skip(self, path), fields(path = %path.display(), namespace = %self.config.namespace))]
    pub async fn ingest_directory(&self, path: &Path) -> Result<IngestReport> {
        self.config.validate()?;
        let documents = self.loader.load(path).await?;
        self.ingest_documents(documents).await
    }

    /// Ingest already-loaded documents, in order
    #[instrument(skip(self, documents), fields(count = documents.len(), namespace = %self.config.namespace))]
    pub async fn ingest_documents(&self, documents: Vec<Document>) -> Result<IngestReport> {
        self.config.validate()?;

        let mut report = IngestReport::start(&self.config.namespace);
        // Hashes written during this run, so in-run duplicates are caught too
        let mut seen: HashSet<String> = HashSet::new();

        for document in &documents {
            if document.is_blank() {
                debug!("Skipping blank document {}", document.source());
                report.documents_skipped += 1;
                continue;
            }
            report.documents_loaded += 1;

            let mut chunks = chunk_document(document, &self.config.chunking)?;
            report.chunks_created += chunks.len();

            if self.config.dedupe {
                let before = chunks.len();
                chunks = self.drop_duplicates(document, chunks, &mut seen).await?;
                report.duplicates_skipped += before - chunks.len();
            }

            for batch in chunks.chunks(self.config.embed_batch_size) {
                report.records_inserted += self.store_batch(document, batch).await?;
            }

            debug!(
                chunks = report.chunks_created,
                inserted = report.records_inserted,
                "Ingested {}",
                document.source()
            );
        }

        report.finished_at = Utc::now();
        info!(
            "Ingestion complete: {} documents, {} chunks, {} records into {:?}",
            report.documents_loaded,
            report.chunks_created,
            report.records_inserted,
            report.namespace
        );
        Ok(report)
    }

    async fn drop_duplicates(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        seen: &mut HashSet<String>,
    ) -> Result<Vec<Chunk>> {
        let hashes: Vec<String> = chunks.iter().map(Chunk::content_hash).collect();
        let stored = self
            .with_deadline(
                Service::VectorIndex,
                self.index.existing_hashes(&self.config.namespace, &hashes),
            )
            .await
            .map_err(|e| AgentError::ingestion(document.source(), e))?;

        Ok(chunks
            .into_iter()
            .zip(hashes)
            .filter(|(_, hash)| !stored.contains(hash) && seen.insert(hash.clone()))
            .map(|(chunk, _)| chunk)
            .collect())
    }

    async fn store_batch(&self, document: &Document, batch: &[Chunk]) -> Result<usize> {
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return Ok(0);
        };
        let item = format!(
            "{} (chunks {}..={})",
            document.source(),
            first.index,
            last.index
        );

        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .with_deadline(Service::Embedder, self.embedder.embed_batch(&texts))
            .await
            .map_err(|e| AgentError::ingestion(&item, e))?;

        if vectors.len() != batch.len() {
            return Err(AgentError::ingestion(
                item,
                format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                ),
            ));
        }

        let records: Vec<EmbeddingRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::new(&self.config.namespace, chunk, vector))
            .collect();

        self.with_deadline(
            Service::VectorIndex,
            self.index.upsert(&self.config.namespace, records),
        )
        .await
        .map_err(|e| AgentError::ingestion(item, e))
    }

    async fn with_deadline<T>(
        &self,
        service: Service,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.call_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| AgentError::Timeout { service, timeout })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HashingEmbedder, MemoryIndex};
    use docchat_core::SourceType;

    fn pipeline(
        embedder: Arc<HashingEmbedder>,
        index: Arc<MemoryIndex>,
        config: IngestConfig,
    ) -> IngestionPipeline {
        IngestionPipeline::new(embedder, index, config)
    }

    fn small_chunks() -> IngestConfig {
        IngestConfig {
            chunking: ChunkingConfig::new(20, 5).unwrap(),
            embed_batch_size: 2,
            ..IngestConfig::default()
        }
    }

    #[tokio::test]
    async fn test_records_land_in_namespace_in_order() {
        let embedder = Arc::new(HashingEmbedder::default());
        let index = Arc::new(MemoryIndex::new());
        let config = IngestConfig {
            namespace: "physics".into(),
            ..small_chunks()
        };

        let doc = Document::new(
            "Quarks carry colour charge. Gluons bind them together. Leptons do not.",
            "qcd.txt",
            SourceType::Text,
        );
        let report = pipeline(embedder.clone(), index.clone(), config)
            .ingest_documents(vec![doc])
            .await
            .unwrap();

        let records = index.records();
        assert_eq!(report.records_inserted, records.len());
        assert_eq!(report.chunks_created, records.len());
        assert!(records.len() > 2);
        assert!(records.iter().all(|r| r.namespace == "physics"));
        let indices: Vec<_> = records.iter().map(|r| r.metadata.chunk_index).collect();
        assert_eq!(indices, (0..records.len()).collect::<Vec<_>>());
        // batches of two
        assert_eq!(embedder.calls(), records.len().div_ceil(2));
    }

    #[tokio::test]
    async fn test_blank_documents_are_skipped() {
        let index = Arc::new(MemoryIndex::new());
        let report = pipeline(Arc::new(HashingEmbedder::default()), index.clone(), IngestConfig::default())
            .ingest_documents(vec![
                Document::new("  \n\t ", "scan.pdf", SourceType::Pdf),
                Document::new("The sky is blue.", "sky.txt", SourceType::Text),
            ])
            .await
            .unwrap();

        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.documents_loaded, 1);
        assert_eq!(index.len(DEFAULT_NAMESPACE), 1);
    }

    #[tokio::test]
    async fn test_rerun_duplicates_without_dedupe() {
        let index = Arc::new(MemoryIndex::new());
        let pipe = pipeline(Arc::new(HashingEmbedder::default()), index.clone(), IngestConfig::default());
        let doc = Document::new("The sky is blue.", "sky.txt", SourceType::Text);

        pipe.ingest_documents(vec![doc.clone()]).await.unwrap();
        pipe.ingest_documents(vec![doc]).await.unwrap();

        assert_eq!(index.len(DEFAULT_NAMESPACE), 2);
    }

    #[tokio::test]
    async fn test_dedupe_skips_stored_and_repeated_chunks() {
        let index = Arc::new(MemoryIndex::new());
        let config = IngestConfig {
            dedupe: true,
            ..IngestConfig::default()
        };
        let pipe = pipeline(Arc::new(HashingEmbedder::default()), index.clone(), config);
        let doc = Document::new("The sky is blue.", "sky.txt", SourceType::Text);
        let copy = Document::new("The sky is blue.", "copy.txt", SourceType::Text);

        let first = pipe.ingest_documents(vec![doc.clone(), copy]).await.unwrap();
        let second = pipe.ingest_documents(vec![doc]).await.unwrap();

        assert_eq!(first.records_inserted, 1);
        assert_eq!(first.duplicates_skipped, 1);
        assert_eq!(second.records_inserted, 0);
        assert_eq!(second.duplicates_skipped, 1);
        assert_eq!(index.len(DEFAULT_NAMESPACE), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_names_document() {
        let index = Arc::new(MemoryIndex::new());
        let err = pipeline(
            Arc::new(HashingEmbedder::failing("quota exceeded")),
            index.clone(),
            IngestConfig::default(),
        )
        .ingest_documents(vec![Document::new("text", "paper.pdf", SourceType::Pdf)])
        .await
        .unwrap_err();

        match err {
            AgentError::Ingestion { item, message } => {
                assert!(item.starts_with("paper.pdf"));
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(index.len(DEFAULT_NAMESPACE), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_earlier_batches() {
        let index = Arc::new(MemoryIndex::failing_upsert_from(3, "disk full"));
        let config = IngestConfig {
            embed_batch_size: 1,
            ..small_chunks()
        };
        let doc = Document::new(
            "Quarks carry colour charge. Gluons bind them together. Leptons do not.",
            "qcd.txt",
            SourceType::Text,
        );

        let err = pipeline(Arc::new(HashingEmbedder::default()), index.clone(), config)
            .ingest_documents(vec![doc])
            .await
            .unwrap_err();

        match err {
            AgentError::Ingestion { item, message } => {
                assert_eq!(item, "qcd.txt (chunks 2..=2)");
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let stored: Vec<_> = index
            .records()
            .iter()
            .map(|r| r.metadata.chunk_index)
            .collect();
        assert_eq!(stored, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_slow_embedder_hits_deadline() {
        let index = Arc::new(MemoryIndex::new());
        let embedder = HashingEmbedder::default().with_delay(Duration::from_millis(200));
        let config = IngestConfig {
            call_timeout: Duration::from_millis(20),
            ..IngestConfig::default()
        };

        let err = pipeline(Arc::new(embedder), index.clone(), config)
            .ingest_documents(vec![Document::new("The sky is blue.", "sky.txt", SourceType::Text)])
            .await
            .unwrap_err();

        match err {
            AgentError::Ingestion { item, message } => {
                assert_eq!(item, "sky.txt (chunks 0..=0)");
                assert!(message.starts_with("Embedder did not respond"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(index.len(DEFAULT_NAMESPACE), 0);
    }

    #[tokio::test]
    async fn test_invalid_chunking_rejected_before_work() {
        let embedder = Arc::new(HashingEmbedder::default());
        let config = IngestConfig {
            chunking: ChunkingConfig {
                chunk_size: 10,
                chunk_overlap: 10,
            },
            ..IngestConfig::default()
        };

        let err = pipeline(embedder.clone(), Arc::new(MemoryIndex::new()), config)
            .ingest_documents(vec![Document::new("text", "a.txt", SourceType::Text)])
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sky.txt"), "The sky is blue.").unwrap();
        std::fs::write(dir.path().join("water.md"), "Water is wet.").unwrap();
        let index = Arc::new(MemoryIndex::new());

        let report = pipeline(Arc::new(HashingEmbedder::default()), index.clone(), IngestConfig::default())
            .ingest_directory(dir.path())
            .await
            .unwrap();

        assert_eq!(report.documents_loaded, 2);
        assert_eq!(report.records_inserted, 2);
        assert_eq!(index.records()[0].text, "The sky is blue.");
    }
}
