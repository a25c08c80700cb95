//! Document question answering agents for docchat
//!
//! This crate wires the core types to their remote collaborators:
//! - Ingestion: load documents, chunk, embed and store them
//! - Chain: answer conversational questions from the stored passages
//! - Inference: OpenAI and Ollama clients behind the capability traits

pub mod capabilities;
pub mod chain;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod loader;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capabilities::{Embedder, LanguageModel, VectorIndex};
pub use chain::{normalize_question, ChainConfig, ConversationalChain};
pub use error::{AgentError, Result, Service};
pub use inference::{CompletionClient, EmbeddingClient, Provider, ProviderConfig};
pub use ingest::{IngestConfig, IngestReport, IngestionPipeline, DEFAULT_NAMESPACE};
pub use loader::{DirectoryLoader, DocumentLoader, PdfLoader, TextLoader};
