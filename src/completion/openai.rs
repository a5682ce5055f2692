/// OpenAI-compatible completion provider
///
/// Calls any OpenAI-compatible Chat Completions API (OpenRouter by default) with a
/// strict json_schema response format. The base_url is configurable.
/// Requires an API key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CompletionError, CompletionProvider, ResponseSchema};
use crate::config::CompletionConfig;

// --- HTTP request/response structs ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible completion provider for one model.
pub struct OpenAICompletionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAICompletionProvider {
    /// Create a provider for `model` using the shared completion settings.
    ///
    /// # Errors
    /// Returns `CompletionError::NotConfigured` if the api key is missing or empty.
    pub fn new(config: &CompletionConfig, model: &str) -> Result<Self, CompletionError> {
        let api_key = config.openai_api_key.clone().unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(CompletionError::NotConfigured(
                "An API key is required for the completion provider. \
                 Set JOBMATCH_COMPLETION__OPENAI_API_KEY or completion.openai_api_key in jobmatch.toml"
                    .to_string(),
            ));
        }

        Ok(OpenAICompletionProvider {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
        })
    }
}

/// First non-empty message content of a chat response.
fn first_content(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(CompletionError::EmptyResponse)
}

#[async_trait]
impl CompletionProvider for OpenAICompletionProvider {
    async fn complete(&self, prompt: &str, schema: &ResponseSchema) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    strict: true,
                    schema: &schema.schema,
                },
            },
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CompletionError::Api { status, message: body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Generation(format!("Failed to parse completion response: {}", e)))?;

        first_content(chat_response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
