//! Common test utilities

use docchat_agents::testing::{HashingEmbedder, ScriptedModel};
use docchat_agents::{ChainConfig, ConversationalChain, IngestConfig, IngestionPipeline};
use docchat_db::{init_memory, Repository};
use std::sync::Arc;

/// Create a test repository with in-memory database
pub async fn create_test_repo() -> Repository {
    let db = init_memory().await.expect("Failed to create test database");
    Repository::new(db)
}

/// Pipeline and chain sharing one in-memory store and embedder
pub struct Harness {
    pub repo: Arc<Repository>,
    pub embedder: Arc<HashingEmbedder>,
    pub llm: Arc<ScriptedModel>,
}

impl Harness {
    pub async fn new(llm: ScriptedModel) -> Self {
        Self {
            repo: Arc::new(create_test_repo().await),
            embedder: Arc::new(HashingEmbedder::new(256)),
            llm: Arc::new(llm),
        }
    }

    pub fn pipeline(&self, config: IngestConfig) -> IngestionPipeline {
        IngestionPipeline::new(self.embedder.clone(), self.repo.clone(), config)
    }

    pub fn chain(&self, config: ChainConfig) -> ConversationalChain {
        ConversationalChain::new(
            self.embedder.clone(),
            self.repo.clone(),
            self.llm.clone(),
            config,
        )
    }
}
