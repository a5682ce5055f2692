/// OpenAI embedding provider
///
/// Requests vectors of the configured dimension from an OpenAI-compatible
/// `/embeddings` endpoint. The key comes from JOBMATCH_EMBEDDING__OPENAI_API_KEY or
/// `embedding.openai_api_key`. A response whose length differs from the configured
/// dimension is rejected here so a misconfigured model never reaches the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAIEmbeddingProvider {
    /// # Errors
    /// `EmbeddingError::NotConfigured` if the api key is missing or empty.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                EmbeddingError::NotConfigured(
                    "OpenAI API key is required for embeddings. \
                     Set JOBMATCH_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in jobmatch.toml"
                        .to_string(),
                )
            })?
            .to_string();

        Ok(OpenAIEmbeddingProvider {
            client: reqwest::Client::new(),
            endpoint: format!("{}/embeddings", config.openai_base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

/// Single vector of the expected length from a decoded response.
fn single_vector(response: EmbedResponse, dimension: usize) -> Result<Vec<f32>, EmbeddingError> {
    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbeddingError::Generation("API returned empty embedding list".to_string()))?;

    if vector.len() != dimension {
        return Err(EmbeddingError::Generation(format!(
            "expected {} dimensions, model returned {}",
            dimension,
            vector.len()
        )));
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            input: text,
            model: &self.model,
            dimensions: self.dimension,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api { status: status.as_u16(), message });
        }

        let decoded: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse API response: {}", e)))?;
        single_vector(decoded, self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
