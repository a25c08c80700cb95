//! Remote inference clients for embeddings and text completion.
//!
//! Both clients speak either the OpenAI API (or anything compatible with it)
//! or a local Ollama server, selected per client through environment
//! variables.

use crate::capabilities::{Embedder, LanguageModel};
use crate::error::Service;
use crate::{AgentError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_EMBED_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OLLAMA_MODEL: &str = "phi4-mini:latest";
const DEFAULT_MAX_BATCH: usize = 32;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_positive<T: std::str::FromStr + PartialOrd + Default>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

/// API flavour spoken by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl Provider {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => Err(AgentError::Config(format!(
                "unknown provider {other:?} (expected \"openai\" or \"ollama\")"
            ))),
        }
    }
}

/// Connection settings for one remote model
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Provider::OpenAi,
            base_url: DEFAULT_OPENAI_URL.to_string(),
            model: model.into(),
            api_key: Some(api_key.into()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Embedding settings from `EMBEDDINGS_PROVIDER`, `EMBEDDINGS_URL`,
    /// `EMBEDDINGS_MODEL` and `OPENAI_API_KEY`
    pub fn embeddings_from_env() -> Result<Self> {
        Self::from_env(
            "EMBEDDINGS",
            DEFAULT_OPENAI_EMBED_MODEL,
            DEFAULT_OLLAMA_EMBED_MODEL,
        )
    }

    /// Completion settings from `LLM_PROVIDER`, `LLM_URL`, `LLM_MODEL`,
    /// `LLM_TIMEOUT_SECS` and `OPENAI_API_KEY`
    pub fn completion_from_env() -> Result<Self> {
        Self::from_env("LLM", DEFAULT_OPENAI_CHAT_MODEL, DEFAULT_OLLAMA_MODEL)
    }

    fn from_env(prefix: &str, openai_model: &str, ollama_model: &str) -> Result<Self> {
        let provider = Provider::parse(&env_or_default(&format!("{prefix}_PROVIDER"), "openai"))?;
        let url_key = format!("{prefix}_URL");
        let model_key = format!("{prefix}_MODEL");

        let mut config = match provider {
            Provider::OpenAi => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
                let base = std::env::var(&url_key)
                    .unwrap_or_else(|_| env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_URL));
                Self::openai(api_key, env_or_default(&model_key, openai_model)).with_base_url(base)
            }
            Provider::Ollama => Self::ollama(env_or_default(&model_key, ollama_model))
                .with_base_url(env_or_default(&url_key, DEFAULT_OLLAMA_URL)),
        };

        config.timeout = Duration::from_secs(env_positive(
            &format!("{prefix}_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        ));
        Ok(config)
    }

    fn http_client(&self, service: Service) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let auth = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| AgentError::Config(format!("{service}: invalid API key")))?;
            headers.insert(AUTHORIZATION, auth);
        }

        Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AgentError::Config(format!("{service}: failed to build HTTP client: {e}")))
    }
}

/// Send a request and decode a JSON body, mapping every failure to the service
async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    service: Service,
    timeout: Duration,
) -> Result<T> {
    let map_send = |e: reqwest::Error| {
        if e.is_timeout() {
            AgentError::Timeout { service, timeout }
        } else {
            AgentError::upstream(service, e)
        }
    };

    let response = request.send().await.map_err(map_send)?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(AgentError::upstream(
            service,
            format!("request failed ({status}): {body}"),
        ));
    }

    response.json::<T>().await.map_err(map_send)
}

// ==========================================
// EMBEDDINGS
// ==========================================

#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    config: ProviderConfig,
    max_batch: usize,
}

impl EmbeddingClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client(Service::Embedder)?,
            config,
            max_batch: DEFAULT_MAX_BATCH,
        })
    }

    pub fn from_env() -> Result<Self> {
        let mut client = Self::new(ProviderConfig::embeddings_from_env()?)?;
        client.max_batch = env_positive("EMBEDDINGS_MAX_BATCH", DEFAULT_MAX_BATCH);
        Ok(client)
    }

    /// Cap on inputs per HTTP request; larger batches are split
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.config.provider {
            Provider::OpenAi => format!("{}/models", self.config.base_url),
            Provider::Ollama => format!("{}/api/tags", self.config.base_url),
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::upstream(Service::Embedder, e))?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn openai_embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let request = OpenAiEmbeddingRequest {
            model: &self.config.model,
            input: inputs,
        };

        let response: OpenAiEmbeddingResponse = send_json(
            self.client.post(&url).json(&request),
            Service::Embedder,
            self.config.timeout,
        )
        .await?;

        ordered_embeddings(response, inputs.len())
    }

    async fn ollama_embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let request = OllamaEmbedRequest {
            model: &self.config.model,
            prompt: text,
        };

        let response: OllamaEmbedResponse = send_json(
            self.client.post(&url).json(&request),
            Service::Embedder,
            self.config.timeout,
        )
        .await?;

        Ok(response.embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AgentError::upstream(Service::Embedder, "empty embedding response"))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        match self.config.provider {
            Provider::OpenAi => {
                for chunk in texts.chunks(self.max_batch) {
                    results.extend(self.openai_embed(chunk).await?);
                }
            }
            Provider::Ollama => {
                for text in texts {
                    results.push(self.ollama_embed(text).await?);
                }
            }
        }

        debug!(vectors = results.len(), "Embedded batch");
        Ok(results)
    }
}

fn ordered_embeddings(mut response: OpenAiEmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected {
        return Err(AgentError::upstream(
            Service::Embedder,
            format!(
                "returned {} embeddings for {} inputs",
                response.data.len(),
                expected
            ),
        ));
    }
    Ok(response.data.into_iter().map(|entry| entry.embedding).collect())
}

// ==========================================
// COMPLETION
// ==========================================

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    config: ProviderConfig,
}

impl CompletionClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client(Service::LanguageModel)?,
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::completion_from_env()?)
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.config.provider {
            Provider::OpenAi => format!("{}/models", self.config.base_url),
            Provider::Ollama => format!("{}/api/tags", self.config.base_url),
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::upstream(Service::LanguageModel, e))?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LanguageModel for CompletionClient {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        match self.config.provider {
            Provider::OpenAi => {
                let url = format!("{}/chat/completions", self.config.base_url);
                let request = ChatCompletionRequest {
                    model: &self.config.model,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                    temperature,
                };

                let response: ChatCompletionResponse = send_json(
                    self.client.post(&url).json(&request),
                    Service::LanguageModel,
                    self.config.timeout,
                )
                .await?;

                first_choice(response)
            }
            Provider::Ollama => {
                let url = format!("{}/api/generate", self.config.base_url);
                let request = OllamaGenerateRequest {
                    model: &self.config.model,
                    prompt,
                    stream: false,
                    options: OllamaOptions { temperature },
                };

                let response: OllamaGenerateResponse = send_json(
                    self.client.post(&url).json(&request),
                    Service::LanguageModel,
                    self.config.timeout,
                )
                .await?;

                Ok(response.response)
            }
        }
    }
}

fn first_choice(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| AgentError::upstream(Service::LanguageModel, "response contained no choices"))
}

// ==========================================
// WIRE TYPES
// ==========================================

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("OpenAI").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::parse(" ollama ").unwrap(), Provider::Ollama);
        assert!(matches!(
            Provider::parse("pinecone"),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ProviderConfig::ollama("m").with_base_url("http://localhost:11434/");
        assert_eq!(config.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_embeddings_reordered_by_index() {
        let response: OpenAiEmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"embedding": [2.0], "index": 1},
                {"embedding": [1.0], "index": 0}
            ]}"#,
        )
        .unwrap();

        let vectors = ordered_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_embedding_count_mismatch_is_upstream_error() {
        let response: OpenAiEmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"embedding": [1.0], "index": 0}]}"#).unwrap();

        let err = ordered_embeddings(response, 3).unwrap_err();
        assert!(matches!(
            err,
            AgentError::Upstream {
                service: Service::Embedder,
                ..
            }
        ));
    }

    #[test]
    fn test_first_choice() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "Blue."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "Blue.");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(first_choice(empty).is_err());
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.0,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["temperature"], 0.0);
    }
}
