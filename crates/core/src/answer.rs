//! Answer types - what the chain returns to callers

use serde::{Deserialize, Serialize};

/// Provenance of a retrieved passage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PassageMetadata {
    /// Origin path of the source document
    pub source: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Hex SHA-256 of the passage text
    pub content_hash: String,
}

/// A passage returned by the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcePassage {
    /// Passage text
    pub page_content: String,

    pub metadata: PassageMetadata,

    /// Similarity to the query vector (higher is closer)
    pub score: f32,
}

/// Generated answer plus the passages it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    /// Model output
    pub text: String,

    /// Retrieved passages, most similar first
    pub source_documents: Vec<SourcePassage>,

    /// Question the retrieval actually ran against
    #[serde(skip)]
    pub standalone_question: String,
}
