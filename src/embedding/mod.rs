/// Embedding provider trait and supporting types
///
/// Provides a pluggable interface for text embedding generation (OpenAI-compatible
/// APIs by default) plus the `EmbeddingStore`, which reads and writes the two
/// embeddings kept for every profile and job posting.

pub mod openai;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::MatchError;
use crate::retry::{self, RetryPolicy, Transient};
use crate::vector;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Embedding generation failure (transport or response decoding)
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Api { status, .. } => retry::is_transient_status(*status),
            EmbeddingError::Generation(_) => true,
            EmbeddingError::NotConfigured(_) => false,
        }
    }
}

/// The two embeddings kept per entity: one from skills text, one from summary text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPair {
    pub skill: Vec<f64>,
    pub summary: Vec<f64>,
}

/// Core trait for embedding text into fixed-dimension float vectors.
///
/// Implementations must be Send + Sync to support use in async contexts
/// and across thread boundaries (e.g., Arc<dyn EmbeddingProvider>).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Return the model name identifier (e.g., "text-embedding-3-small").
    fn model_name(&self) -> &str;

    /// Return the dimension of the embedding vectors produced by this model.
    fn dimension(&self) -> usize;
}

/// Text embedded for the skill vector.
pub fn skills_text(skills: &[String]) -> String {
    skills.join(", ")
}

/// Embed skills text and summary text concurrently, retrying transient failures.
///
/// Both vectors are normalized before they are returned.
pub async fn embed_pair(
    provider: &dyn EmbeddingProvider,
    policy: RetryPolicy,
    skills_text: &str,
    summary_text: &str,
) -> Result<EmbeddingPair, MatchError> {
    let (skill, summary) = tokio::try_join!(
        retry::with_backoff(policy, "embed_skills", || provider.embed(skills_text)),
        retry::with_backoff(policy, "embed_summary", || provider.embed(summary_text)),
    )?;

    Ok(EmbeddingPair {
        skill: vector::normalize(&vector::widen(&skill)),
        summary: vector::normalize(&vector::widen(&summary)),
    })
}
