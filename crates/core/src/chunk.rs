//! Chunk types - bounded passages of a document and their embeddings

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Document, PassageMetadata, TextSpan};

/// A contiguous slice of a document's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Document this chunk was cut from
    pub document_id: String,

    /// Origin path of that document
    pub source: String,

    /// Position among the document's chunks
    pub index: usize,

    /// Passage text
    pub text: String,

    /// Character offset where the passage starts
    pub start: usize,

    /// Character offset one past the passage end
    pub end: usize,
}

impl Chunk {
    pub(crate) fn from_span(document: &Document, index: usize, span: TextSpan) -> Self {
        Self {
            document_id: document.id.clone(),
            source: document.metadata.source.clone(),
            index,
            text: span.text,
            start: span.start,
            end: span.end,
        }
    }

    /// Hex SHA-256 of the passage text, used to spot re-ingested chunks
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }

    /// Provenance carried alongside the vector
    pub fn metadata(&self) -> PassageMetadata {
        PassageMetadata {
            source: self.source.clone(),
            document_id: self.document_id.clone(),
            chunk_index: self.index,
            start_offset: self.start,
            end_offset: self.end,
            content_hash: self.content_hash(),
        }
    }
}

/// Hex SHA-256 digest of `text`
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// A chunk's vector plus the text and provenance stored next to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Index partition this record belongs to
    pub namespace: String,

    /// Embedding vector
    pub vector: Vec<f32>,

    /// Passage text
    pub text: String,

    /// Where the passage came from
    pub metadata: PassageMetadata,
}

impl EmbeddingRecord {
    pub fn new(namespace: impl Into<String>, chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            namespace: namespace.into(),
            vector,
            text: chunk.text.clone(),
            metadata: chunk.metadata(),
        }
    }
}
