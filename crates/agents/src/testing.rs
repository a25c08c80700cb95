//! Deterministic stand-ins for the remote collaborators.
//!
//! Compiled for this crate's tests and, through the `test-support` feature,
//! for downstream test suites.

use crate::capabilities::{Embedder, LanguageModel, VectorIndex};
use crate::error::Service;
use crate::{AgentError, Result};
use async_trait::async_trait;
use docchat_core::{EmbeddingRecord, SourcePassage};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_DIMENSION: usize = 64;

/// Bag-of-words embedder: each lower-cased word is hashed into a bucket.
///
/// Texts sharing words get similar vectors. Bucket 0 is a constant bias so
/// no vector is all zeros.
pub struct HashingEmbedder {
    dimension: usize,
    fail_with: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(2),
            fail_with: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// An embedder whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleep before every call, for deadline tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `embed`/`embed_batch` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        vector[0] = 1.0;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = 1 + (fnv1a(&word.to_lowercase()) as usize % (self.dimension - 1));
            vector[bucket] += 1.0;
        }
        vector
    }

    async fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(message) => Err(AgentError::upstream(Service::Embedder, message)),
            None => Ok(()),
        }
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check().await?;
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.check().await?;
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Language model that replays scripted replies and records every prompt
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_reply: String,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, f32)>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new("scripted answer")
    }
}

impl ScriptedModel {
    /// A model answering `default_reply` once the script runs out
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.into(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    /// Sleep before answering, for deadline tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: std::result::Result<String, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Prompts received so far with their temperatures
    pub fn calls(&self) -> Vec<(String, f32)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.to_string(), temperature));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AgentError::upstream(Service::LanguageModel, message)),
            None => Ok(self.default_reply.clone()),
        }
    }
}

/// In-process vector index with brute-force cosine search
#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<Vec<EmbeddingRecord>>,
    queries: AtomicUsize,
    upserts: AtomicUsize,
    fail_with: Option<String>,
    fail_upsert_at: Option<usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Fail the `nth` upsert (1-based) and every one after it
    pub fn failing_upsert_from(nth: usize, message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            fail_upsert_at: Some(nth),
            ..Self::default()
        }
    }

    /// Number of similarity queries served
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Snapshot of stored records, in insertion order
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.namespace == namespace)
            .count()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Vec<EmbeddingRecord>>> {
        self.records
            .lock()
            .map_err(|_| AgentError::upstream(Service::VectorIndex, "index lock poisoned"))
    }

    fn check(&self, upsert: bool) -> Result<()> {
        let Some(message) = &self.fail_with else {
            return Ok(());
        };
        let failing = match (upsert, self.fail_upsert_at) {
            (_, None) => true,
            (true, Some(nth)) => self.upserts.fetch_add(1, Ordering::SeqCst) + 1 >= nth,
            (false, Some(_)) => false,
        };
        if failing {
            Err(AgentError::upstream(Service::VectorIndex, message))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        self.check(true)?;
        if let Some(stray) = records.iter().find(|r| r.namespace != namespace) {
            return Err(AgentError::upstream(
                Service::VectorIndex,
                format!(
                    "record namespace {:?} does not match {:?}",
                    stray.namespace, namespace
                ),
            ));
        }
        let count = records.len();
        self.locked()?.extend(records);
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SourcePassage>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check(false)?;
        let records = self.locked()?;

        let mut hits: Vec<SourcePassage> = records
            .iter()
            .filter(|r| r.namespace == namespace)
            .map(|r| SourcePassage {
                page_content: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine(&r.vector, vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn existing_hashes(&self, namespace: &str, hashes: &[String]) -> Result<HashSet<String>> {
        self.check(false)?;
        let wanted: HashSet<&String> = hashes.iter().collect();
        Ok(self
            .locked()?
            .iter()
            .filter(|r| r.namespace == namespace && wanted.contains(&r.metadata.content_hash))
            .map(|r| r.metadata.content_hash.clone())
            .collect())
    }
}

/// Cosine similarity; 0 for mismatched or zero-length vectors
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
