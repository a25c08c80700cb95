//! Conversational retrieval chain
//!
//! answer = normalize -> condense -> retrieve -> generate. Each stage only
//! sees the previous stage's output; the chain itself holds no mutable
//! state and can be shared behind an `Arc`.

use crate::capabilities::{Embedder, LanguageModel, VectorIndex};
use crate::error::Service;
use crate::ingest::DEFAULT_NAMESPACE;
use crate::{AgentError, Result};
use docchat_core::{AnswerResult, ConversationTurn, ProfileSet, PromptTemplates, SourcePassage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Passages retrieved per question
pub const DEFAULT_TOP_K: usize = 4;

/// Deadline applied to each remote call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// Both model calls are deterministic
const TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub namespace: String,
    pub top_k: usize,
    pub call_timeout: Duration,
    pub templates: PromptTemplates,
    pub profiles: ProfileSet,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            top_k: DEFAULT_TOP_K,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            templates: PromptTemplates::default(),
            profiles: ProfileSet::default(),
        }
    }
}

pub struct ConversationalChain {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LanguageModel>,
    config: ChainConfig,
}

/// Trim and fold line breaks into spaces.
///
/// Fails with a validation error when nothing is left.
pub fn normalize_question(question: &str) -> Result<String> {
    let normalized = question
        .trim()
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ");

    if normalized.trim().is_empty() {
        return Err(AgentError::Validation("No question in the request".into()));
    }
    Ok(normalized)
}

impl ConversationalChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LanguageModel>,
        config: ChainConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.config.profiles
    }

    /// Answer `question` in the context of `history`, grounded on the
    /// configured namespace and phrased for `profile`
    #[instrument(skip(self, question, history), fields(turns = history.len(), profile = ?profile))]
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
        profile: Option<&str>,
    ) -> Result<AnswerResult> {
        let question = normalize_question(question)?;
        let system_prompt = &self.config.profiles.resolve(profile).system_prompt;

        let standalone = self.condense(&question, history).await?;
        let sources = self.retrieve(&standalone).await?;
        let text = self.generate(&standalone, &sources, system_prompt).await?;

        info!(sources = sources.len(), "Answered question");
        Ok(AnswerResult {
            text,
            source_documents: sources,
            standalone_question: standalone,
        })
    }

    /// Rewrite a follow-up into a standalone question. With no history the
    /// question is already standalone and the model is not called.
    pub async fn condense(&self, question: &str, history: &[ConversationTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = self.config.templates.condense_prompt(history, question);
        let rewritten = self
            .with_deadline(Service::LanguageModel, self.llm.complete(&prompt, TEMPERATURE))
            .await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            debug!("Condense step returned nothing, keeping the original question");
            return Ok(question.to_string());
        }
        debug!(standalone = %rewritten, "Condensed question");
        Ok(rewritten.to_string())
    }

    /// Top-k passages for `question`, most similar first
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SourcePassage>> {
        let vector = self
            .with_deadline(Service::Embedder, self.embedder.embed(question))
            .await?;

        let mut passages = self
            .with_deadline(
                Service::VectorIndex,
                self.index.query(&self.config.namespace, &vector, self.config.top_k),
            )
            .await?;

        // Stable: equal scores keep the index's insertion order
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        passages.truncate(self.config.top_k);
        Ok(passages)
    }

    /// Answer from the retrieved passages
    pub async fn generate(
        &self,
        question: &str,
        passages: &[SourcePassage],
        system_prompt: &str,
    ) -> Result<String> {
        let context = passages
            .iter()
            .map(|p| p.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.config.templates.qa_prompt(system_prompt, &context, question);

        self.with_deadline(Service::LanguageModel, self.llm.complete(&prompt, TEMPERATURE))
            .await
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
