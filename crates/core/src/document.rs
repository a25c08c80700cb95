//! Document types - the raw source units that get chunked

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The kind of file a document was loaded from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// PDF document
    Pdf,
    /// Plain text file
    Text,
    /// Markdown file
    Markdown,
}

impl SourceType {
    /// Guess the source type from a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Pdf => write!(f, "pdf"),
            SourceType::Text => write!(f, "text"),
            SourceType::Markdown => write!(f, "markdown"),
        }
    }
}

/// Where a document came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Origin path (or any caller-chosen label)
    pub source: String,

    /// Type of source file
    pub source_type: SourceType,

    /// When the document was loaded
    pub loaded_at: DateTime<Utc>,
}

/// A raw document. Never mutated once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this load
    pub id: String,

    /// Full extracted text
    pub text: String,

    /// Provenance
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document from already-extracted text
    pub fn new(text: impl Into<String>, source: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                source_type,
                loaded_at: Utc::now(),
            },
        }
    }

    /// Create a document for a file on disk
    pub fn from_file(path: &Path, source_type: SourceType, text: impl Into<String>) -> Self {
        Self::new(text, path.display().to_string(), source_type)
    }

    /// Origin path of the document
    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    /// True if there is nothing worth chunking
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
