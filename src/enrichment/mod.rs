/// Offline job enrichment.
///
/// Raw job text is structured by the chat model into `{skills, summary}` (format only,
/// no interpretation), then both fields are embedded. `pipeline` runs this over every
/// posting that is still missing an embedding.

pub mod pipeline;

pub use pipeline::{Enricher, EnrichmentReport};

use serde::Deserialize;
use std::sync::Arc;

use crate::completion::{CompletionProvider, ResponseSchema};
use crate::embedding::{embed_pair, skills_text, EmbeddingProvider};
use crate::errors::MatchError;
use crate::retry::{self, RetryPolicy};
use crate::store::{JobEmbeddingUpdate, JobText};

/// Structured form of a job posting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobAnalysis {
    pub skills: Vec<String>,
    pub summary: String,
}

/// Build the job analysis prompt.
pub fn build_job_analysis_prompt(title: &str, text: &str) -> String {
    format!(
        "Analyze the job listing and format it so that it complies with the provided schema. \
         Do not change anything and do not interpret it. Only format it to the schema.\n\n\
         Title: {title}\n\
         Description: {text}"
    )
}

/// JSON schema for job analysis output.
pub fn job_analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "skills": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" }
        },
        "required": ["skills", "summary"],
        "additionalProperties": false
    })
}

/// Parse and sanity-check the model's analysis.
pub fn parse_job_analysis(job_id: &str, content: &str) -> Result<JobAnalysis, MatchError> {
    let analysis: JobAnalysis = serde_json::from_str(content.trim())
        .map_err(|e| MatchError::LlmParseFailure(format!("job {}: {}", job_id, e)))?;
    if analysis.summary.trim().is_empty() {
        return Err(MatchError::LlmParseFailure(format!("job {}: empty summary", job_id)));
    }
    Ok(analysis)
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Turns one raw posting into its embedding pair.
pub struct JobAnalyzer {
    completion: Arc<dyn CompletionProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    max_text_chars: usize,
}

impl JobAnalyzer {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        max_text_chars: usize,
    ) -> Self {
        JobAnalyzer { completion, embedder, retry, max_text_chars }
    }

    pub async fn analyze(&self, job: &JobText) -> Result<JobAnalysis, MatchError> {
        let prompt = build_job_analysis_prompt(&job.title, clip(&job.text, self.max_text_chars));
        let schema = ResponseSchema::new("analyze_job", job_analysis_schema());
        let content = retry::with_backoff(self.retry, "analyze_job", || self.completion.complete(&prompt, &schema)).await?;
        parse_job_analysis(&job.id, &content)
    }

    /// Analyze, then embed summary and skills text concurrently.
    pub async fn enrich(&self, job: &JobText) -> Result<JobEmbeddingUpdate, MatchError> {
        let analysis = self.analyze(job).await?;
        let embeddings = embed_pair(
            self.embedder.as_ref(),
            self.retry,
            &skills_text(&analysis.skills),
            &analysis.summary,
        )
        .await?;
        tracing::debug!(job_id = %job.id, skills = analysis.skills.len(), "Job analyzed");
        Ok(JobEmbeddingUpdate { job_id: job.id.clone(), embeddings })
    }
}
