//! Agent error types

use docchat_core::CoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Remote collaborator a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedder,
    VectorIndex,
    LanguageModel,
    DocumentLoader,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Embedder => "Embedder",
            Service::VectorIndex => "Vector index",
            Service::LanguageModel => "Language model",
            Service::DocumentLoader => "Document loader",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    Validation(String),

    #[error("{service} error: {message}")]
    Upstream { service: Service, message: String },

    #[error("{service} did not respond within {}s", .timeout.as_secs_f32())]
    Timeout { service: Service, timeout: Duration },

    #[error("Ingestion failed at {item}: {message}")]
    Ingestion { item: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn upstream(service: Service, err: impl fmt::Display) -> Self {
        AgentError::Upstream {
            service,
            message: err.to_string(),
        }
    }

    pub fn ingestion(item: impl Into<String>, err: impl fmt::Display) -> Self {
        AgentError::Ingestion {
            item: item.into(),
            message: err.to_string(),
        }
    }

    /// Caller mistakes, as opposed to failures of a collaborator
    pub fn is_validation(&self) -> bool {
        matches!(self, AgentError::Validation(_))
    }
}

impl From<CoreError> for AgentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidProfiles(_) => AgentError::Config(err.to_string()),
            other => AgentError::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_names_service() {
        let err = AgentError::upstream(Service::LanguageModel, "rate limited");
        assert_eq!(err.to_string(), "Language model error: rate limited");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_chunking_error_is_validation() {
        let err: AgentError = CoreError::InvalidChunking {
            chunk_size: 10,
            overlap: 10,
        }
        .into();
        assert!(err.is_validation());
    }
}
