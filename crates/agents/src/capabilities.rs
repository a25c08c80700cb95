//! Capability seams between the orchestration code and its collaborators.
//!
//! The chain and the ingestion pipeline only ever talk to these traits, so
//! providers can be swapped (OpenAI, Ollama, SurrealDB, in-memory fakes)
//! without touching either.

use crate::Result;
use async_trait::async_trait;
use docchat_core::{EmbeddingRecord, SourcePassage};
use std::collections::HashSet;

/// Turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Namespaced similarity search over stored passages
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append records to `namespace`, returning how many were stored
    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize>;

    /// Up to `top_k` passages, highest score first, ties by insertion order
    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<SourcePassage>>;

    /// Subset of `hashes` already present in `namespace`
    async fn existing_hashes(&self, namespace: &str, hashes: &[String]) -> Result<HashSet<String>>;
}

/// Text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}
