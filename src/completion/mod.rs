/// Chat completion provider trait
///
/// Structured-output LLM calls used for reranking candidates and for analysing raw
/// job text. Providers are asked for JSON matching a supplied schema and return the
/// raw content string; parsing and validation belong to the caller.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::{self, Transient};

/// Errors that can occur during completion calls.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transport failure or undecodable response envelope
    #[error("Completion generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The model answered without any content
    #[error("Completion returned no content")]
    EmptyResponse,
}

impl Transient for CompletionError {
    fn is_transient(&self) -> bool {
        match self {
            CompletionError::Api { status, .. } => retry::is_transient_status(*status),
            CompletionError::Generation(_) | CompletionError::EmptyResponse => true,
            CompletionError::NotConfigured(_) => false,
        }
    }
}

/// A named JSON schema the model output must satisfy.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    pub fn new(name: &str, schema: serde_json::Value) -> Self {
        ResponseSchema { name: name.to_string(), schema }
    }
}

/// Core trait for structured chat completions.
///
/// Implementations must be Send + Sync (shared as Arc<dyn CompletionProvider>).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send a single user prompt and return the model's raw JSON content.
    async fn complete(&self, prompt: &str, schema: &ResponseSchema) -> Result<String, CompletionError>;

    /// Return the model name identifier used by this provider.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CompletionError::EmptyResponse.is_transient());
        assert!(CompletionError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!CompletionError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!CompletionError::NotConfigured("key".into()).is_transient());
    }
}
