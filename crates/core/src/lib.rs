//! Core domain types for docchat
//!
//! This crate defines the data that flows through ingestion and question
//! answering: Documents, Chunks, embedding records, conversation turns,
//! domain profiles, and the prompt templates the chain renders.

pub mod answer;
pub mod chunk;
pub mod chunker;
pub mod conversation;
pub mod document;
pub mod error;
pub mod profile;
pub mod prompt;

pub use answer::{AnswerResult, PassageMetadata, SourcePassage};
pub use chunk::{Chunk, EmbeddingRecord};
pub use chunker::{chunk_document, split_text, ChunkingConfig, TextSpan};
pub use conversation::ConversationTurn;
pub use document::{Document, DocumentMetadata, SourceType};
pub use error::{CoreError, Result};
pub use profile::{DomainProfile, ProfileSet};
pub use prompt::PromptTemplates;
