//! SurrealDB-backed vector index

use crate::capabilities::VectorIndex;
use crate::error::Service;
use crate::{AgentError, Result};
use async_trait::async_trait;
use docchat_core::{EmbeddingRecord, SourcePassage};
use docchat_db::Repository;
use std::collections::HashSet;

#[async_trait]
impl VectorIndex for Repository {
    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        self.insert_embeddings(namespace, records)
            .await
            .map_err(|e| AgentError::upstream(Service::VectorIndex, e))
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SourcePassage>> {
        self.nearest(namespace, vector.to_vec(), top_k)
            .await
            .map_err(|e| AgentError::upstream(Service::VectorIndex, e))
    }

    async fn existing_hashes(&self, namespace: &str, hashes: &[String]) -> Result<HashSet<String>> {
        Repository::existing_hashes(self, namespace, hashes.to_vec())
            .await
            .map_err(|e| AgentError::upstream(Service::VectorIndex, e))
    }
}
