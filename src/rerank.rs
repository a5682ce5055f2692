/// LLM re-ranking of a candidate shortlist.
///
/// The model sees the user's stated profile (text only) and the textual fields of
/// each candidate, and answers with `{id, score, reason}` objects. The answer is
/// reconciled against the candidates it was given: unknown ids are dropped with a
/// warning, duplicates keep their first occurrence, the rest is sorted by score and
/// truncated to `max_results`. A response that does not fit the schema fails the
/// whole request.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionProvider, ResponseSchema};
use crate::errors::{MatchError, Warning};
use crate::retry::{self, RetryPolicy};
use crate::store::{JobPosting, UserProfile};

/// Textual view of a job sent to the model. No embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateJob {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl From<&JobPosting> for CandidateJob {
    fn from(job: &JobPosting) -> Self {
        CandidateJob {
            id: job.id.clone(),
            title: job.title.clone(),
            location: job.location.clone(),
            compensation: job.compensation.clone(),
            summary: job.summary.clone(),
        }
    }
}

/// One accepted recommendation from the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedJob {
    pub id: String,
    /// 0 to 100
    pub score: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reranked {
    pub jobs: Vec<RerankedJob>,
    pub warnings: Vec<Warning>,
}

/// Profile fields the model is allowed to see.
#[derive(Serialize)]
struct ProfileView<'a> {
    skills: &'a [String],
    experience: &'a [crate::store::Experience],
    total_experience_years: f64,
    career_level: String,
    category: &'a str,
    summary: &'a str,
}

impl<'a> From<&'a UserProfile> for ProfileView<'a> {
    fn from(p: &'a UserProfile) -> Self {
        ProfileView {
            skills: &p.skills,
            experience: &p.experience,
            total_experience_years: p.total_experience_years,
            career_level: p.career_level.to_string(),
            category: &p.category,
            summary: &p.summary,
        }
    }
}

/// Build the re-ranking prompt.
pub fn build_rerank_prompt(profile_json: &str, candidates_json: &str, max_results: usize) -> String {
    format!(
        "You are an experienced technical recruiter matching one candidate against a list of open jobs.\n\n\
         Rules:\n\
         1. Recommend only jobs that are a genuinely strong match for this candidate.\n\
         2. If few or none of the jobs are strong matches, return fewer results or an empty list. \
            Never pad the list with weak matches.\n\
         3. Score each recommended job from 0 to 100 and use the full range: \
            90+ for exceptional fits, 70-89 for solid fits, lower scores only when still worth showing.\n\
         4. Give each recommendation a short reason that connects specific facts from the candidate's \
            profile (skills, experience, level) to specific requirements of the job.\n\
         5. Only use job ids from the list below. Never invent or alter ids.\n\n\
         Return at most {max_results} jobs, best match first, as JSON matching the provided schema: \
         {{\"matches\": [{{\"id\": \"...\", \"score\": 0, \"reason\": \"...\"}}]}}. \
         Do not add commentary.\n\n\
         Candidate profile:\n{profile_json}\n\n\
         Jobs:\n{candidates_json}"
    )
}

/// JSON schema for re-ranking output.
pub fn rerank_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "matches": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Job id exactly as given" },
                        "score": { "type": "integer", "minimum": 0, "maximum": 100 },
                        "reason": { "type": "string", "description": "Why this job fits the candidate" }
                    },
                    "required": ["id", "score", "reason"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["matches"],
        "additionalProperties": false
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RerankPayload {
    Wrapped { matches: Vec<RawMatch> },
    Bare(Vec<RawMatch>),
}

#[derive(Deserialize)]
struct RawMatch {
    id: serde_json::Value,
    score: f64,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse model output into recommendations, in model order.
///
/// Accepts `{"matches": [...]}` or a bare array. Ids may be strings or integers.
/// Anything else, including a score outside 0..=100, is an `LlmParseFailure`.
pub fn parse_rerank_response(content: &str) -> Result<Vec<RerankedJob>, MatchError> {
    let payload: RerankPayload = serde_json::from_str(content.trim()).map_err(|e| {
        MatchError::LlmParseFailure(format!("{} (content: {})", e, truncate(content, 200)))
    })?;

    let raw = match payload {
        RerankPayload::Wrapped { matches } => matches,
        RerankPayload::Bare(matches) => matches,
    };

    raw.into_iter()
        .map(|m| {
            let id = match m.id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                other => return Err(MatchError::LlmParseFailure(format!("invalid job id: {}", other))),
            };
            if !m.score.is_finite() || !(0.0..=100.0).contains(&m.score) {
                return Err(MatchError::LlmParseFailure(format!(
                    "score {} for job {} is outside 0-100",
                    m.score, id
                )));
            }
            Ok(RerankedJob { id, score: m.score, reason: m.reason })
        })
        .collect()
}

/// Keep only ids from `candidates`, first occurrence wins, best score first, at most `max_results`.
pub fn reconcile(parsed: Vec<RerankedJob>, candidates: &[CandidateJob], max_results: usize) -> Reranked {
    let valid: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut warnings = Vec::new();
    let mut jobs = Vec::new();

    for job in parsed {
        if !valid.contains(job.id.as_str()) {
            tracing::warn!(job_id = %job.id, "LLM returned a job id outside the candidate set");
            warnings.push(Warning::UnknownRerankId { id: job.id });
            continue;
        }
        if !seen.insert(job.id.clone()) {
            tracing::debug!(job_id = %job.id, "Dropping duplicate reranked id");
            continue;
        }
        jobs.push(job);
    }

    // Stable sort: equal scores keep the model's order
    jobs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    jobs.truncate(max_results);
    Reranked { jobs, warnings }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

pub struct LlmReranker {
    provider: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl LlmReranker {
    pub fn new(provider: Arc<dyn CompletionProvider>, retry: RetryPolicy) -> Self {
        LlmReranker { provider, retry }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Re-rank `candidates` for `profile`.
    ///
    /// Transient provider errors are retried per the policy. The call races `cancel`;
    /// once cancelled, the result is discarded even if the call already finished.
    pub async fn rerank(
        &self,
        profile: &UserProfile,
        candidates: &[CandidateJob],
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Reranked, MatchError> {
        if candidates.is_empty() || max_results == 0 {
            return Ok(Reranked::default());
        }

        let profile_json = serde_json::to_string_pretty(&ProfileView::from(profile))
            .map_err(|e| MatchError::Validation { message: format!("Failed to serialize profile: {}", e), field: None })?;
        let candidates_json = serde_json::to_string_pretty(candidates)
            .map_err(|e| MatchError::Validation { message: format!("Failed to serialize candidates: {}", e), field: None })?;

        let prompt = build_rerank_prompt(&profile_json, &candidates_json, max_results);
        let schema = ResponseSchema::new("job_matches", rerank_schema());

        tracing::debug!(
            model = self.provider.model_name(),
            candidates = candidates.len(),
            max_results,
            "Requesting LLM re-ranking"
        );

        let call = retry::with_backoff(self.retry, "rerank", || self.provider.complete(&prompt, &schema));
        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MatchError::Cancelled),
            result = call => result?,
        };

        if cancel.is_cancelled() {
            tracing::debug!("Discarding rerank result of a cancelled request");
            return Err(MatchError::Cancelled);
        }

        let parsed = parse_rerank_response(&content)?;
        Ok(reconcile(parsed, candidates, max_results))
    }
}
