//! Shared fixtures for integration tests: scripted providers and a seeded corpus.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobmatch::completion::{CompletionError, CompletionProvider, ResponseSchema};
use jobmatch::config::RecommendationConfig;
use jobmatch::embedding::{EmbeddingError, EmbeddingPair, EmbeddingProvider};
use jobmatch::rerank::LlmReranker;
use jobmatch::retry::RetryPolicy;
use jobmatch::store::memory::MemoryStore;
use jobmatch::store::{CareerLevel, JobPosting, UserProfile};
use jobmatch::vector::normalize;

pub const DIM: usize = 3;

type Responder = dyn Fn(&str) -> Result<String, CompletionError> + Send + Sync;

/// Completion provider that answers from a closure and records every prompt.
pub struct ScriptedCompletion {
    respond: Box<Responder>,
    delay: Duration,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        ScriptedCompletion { respond: Box::new(respond), delay: Duration::ZERO, prompts: Mutex::new(Vec::new()) }
    }

    pub fn fixed(content: &str) -> Self {
        let content = content.to_string();
        ScriptedCompletion::new(move |_| Ok(content.clone()))
    }

    /// Scores every candidate in the prompt, first candidate highest.
    pub fn rank_all() -> Self {
        ScriptedCompletion::new(|prompt| {
            let matches: Vec<serde_json::Value> = candidate_ids(prompt)
                .into_iter()
                .enumerate()
                .map(|(i, id)| serde_json::json!({ "id": id, "score": 100 - i as i64, "reason": "fits" }))
                .collect();
            Ok(serde_json::json!({ "matches": matches }).to_string())
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str, _schema: &ResponseSchema) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(prompt)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Candidate ids listed in a rerank prompt, in prompt order.
pub fn candidate_ids(prompt: &str) -> Vec<String> {
    let Some((_, jobs)) = prompt.split_once("Jobs:\n") else {
        return Vec::new();
    };
    let parsed: Vec<serde_json::Value> = serde_json::from_str(jobs).unwrap_or_default();
    parsed
        .iter()
        .filter_map(|j| j["id"].as_str().map(str::to_string))
        .collect()
}

/// Embedding provider that maps keywords onto fixed axes.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        KeywordEmbedder { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let axis = |word: &str| if lower.contains(word) { 1.0 } else { 0.1 };
        Ok(vec![axis("rust"), axis("data"), axis("design")])
    }

    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

pub fn profile(user_id: &str) -> UserProfile {
    UserProfile {
        user_id: user_id.to_string(),
        skills: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        experience: Vec::new(),
        total_experience_years: 6.0,
        career_level: CareerLevel::Senior,
        category: "engineer/developer".to_string(),
        summary: "Backend engineer focused on storage engines".to_string(),
    }
}

pub fn job(id: &str) -> JobPosting {
    JobPosting {
        id: id.to_string(),
        title: format!("Engineer {}", id),
        location: Some("Remote".to_string()),
        compensation: None,
        summary: Some(format!("Role {}", id)),
        posting_url: Some(format!("https://jobs.example/{}", id)),
    }
}

/// Unit vector drifting away from the x axis as `step` grows.
pub fn drifted(step: usize) -> Vec<f64> {
    normalize(&[1.0, step as f64 * 0.1, 0.0])
}

pub fn pair(v: Vec<f64>) -> EmbeddingPair {
    EmbeddingPair { skill: v.clone(), summary: v }
}

/// Ten jobs j01..j10. j01..j08 have embeddings at increasing distance from the x axis,
/// j09 and j10 have none. User "u1" has a profile on the x axis.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 1..=10 {
        let id = format!("j{:02}", i);
        let embeddings = (i <= 8).then(|| pair(drifted(i)));
        store.insert_job(job(&id), "job text", embeddings.as_ref()).await;
    }
    let base = vec![1.0, 0.0, 0.0];
    store
        .insert_profile_raw(
            profile("u1"),
            Some(serde_json::json!(base)),
            Some(serde_json::Value::String("[1,0,0]".to_string())),
        )
        .await;
    store
}

pub fn config(max_results: usize) -> RecommendationConfig {
    RecommendationConfig { max_results, ..RecommendationConfig::default() }
}

pub fn reranker(provider: Arc<ScriptedCompletion>) -> LlmReranker {
    LlmReranker::new(provider, RetryPolicy::none())
}
