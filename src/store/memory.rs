/// In-process implementation of RecommendationStore
///
/// Keeps profiles, jobs and feedback behind a tokio RwLock. Embeddings are held in
/// their raw stored form so the read path exercises the same coercion as the
/// database backend. Nearest-neighbour queries rank in process with
/// `rank_by_combined_distance`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::embedding::EmbeddingPair;
use crate::errors::MatchError;
use crate::search::rank_by_combined_distance;
use crate::store::{
    CandidateQuery, Feedback, JobEmbeddingRow, JobEmbeddingUpdate, JobPosting, JobText, RawEmbeddings,
    RecommendationStore, ScoredJob, UserProfile,
};
use crate::vector::coerce_to_vector;

struct ProfileEntry {
    profile: UserProfile,
    embeddings: RawEmbeddings,
}

struct JobEntry {
    job: JobPosting,
    text: String,
    embeddings: RawEmbeddings,
}

#[derive(Default)]
struct State {
    profiles: HashMap<String, ProfileEntry>,
    // BTreeMap keeps id order for deterministic listings
    jobs: BTreeMap<String, JobEntry>,
    feedback: HashMap<(String, String), Feedback>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

fn pair_to_raw(pair: &EmbeddingPair) -> RawEmbeddings {
    RawEmbeddings {
        skill: Some(serde_json::json!(pair.skill)),
        summary: Some(serde_json::json!(pair.summary)),
    }
}

fn is_complete(raw: &RawEmbeddings) -> bool {
    raw.skill.is_some() && raw.summary.is_some()
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Add or replace a job posting, optionally with embeddings.
    pub async fn insert_job(&self, job: JobPosting, text: &str, embeddings: Option<&EmbeddingPair>) {
        let raw = embeddings
            .map(pair_to_raw)
            .unwrap_or(RawEmbeddings { skill: None, summary: None });
        self.insert_job_entry(job, text, raw).await;
    }

    /// Add or replace a job posting with embeddings in any stored form.
    pub async fn insert_job_raw(&self, job: JobPosting, text: &str, skill: Option<Value>, summary: Option<Value>) {
        self.insert_job_entry(job, text, RawEmbeddings { skill, summary }).await;
    }

    /// Add or replace a profile with embeddings in any stored form.
    pub async fn insert_profile_raw(&self, profile: UserProfile, skill: Option<Value>, summary: Option<Value>) {
        let mut state = self.state.write().await;
        state.profiles.insert(
            profile.user_id.clone(),
            ProfileEntry { profile, embeddings: RawEmbeddings { skill, summary } },
        );
    }

    async fn insert_job_entry(&self, job: JobPosting, text: &str, embeddings: RawEmbeddings) {
        let mut state = self.state.write().await;
        state.jobs.insert(
            job.id.clone(),
            JobEntry { job, text: text.to_string(), embeddings },
        );
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn upsert_profile(&self, profile: &UserProfile, embeddings: &EmbeddingPair) -> Result<(), MatchError> {
        let mut state = self.state.write().await;
        state.profiles.insert(
            profile.user_id.clone(),
            ProfileEntry { profile: profile.clone(), embeddings: pair_to_raw(embeddings) },
        );
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, MatchError> {
        let state = self.state.read().await;
        Ok(state.profiles.get(user_id).map(|e| e.profile.clone()))
    }

    async fn profile_embeddings(&self, user_id: &str) -> Result<Option<RawEmbeddings>, MatchError> {
        let state = self.state.read().await;
        Ok(state.profiles.get(user_id).map(|e| e.embeddings.clone()))
    }

    async fn job_embeddings(&self, job_ids: &[String]) -> Result<Vec<JobEmbeddingRow>, MatchError> {
        let state = self.state.read().await;
        let mut rows: Vec<JobEmbeddingRow> = job_ids
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|e| is_complete(&e.embeddings))
            .map(|e| JobEmbeddingRow { job_id: e.job.id.clone(), embeddings: e.embeddings.clone() })
            .collect();
        rows.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        rows.dedup_by(|a, b| a.job_id == b.job_id);
        Ok(rows)
    }

    async fn nearest_jobs(&self, query: &CandidateQuery) -> Result<Vec<ScoredJob>, MatchError> {
        let state = self.state.read().await;
        let mut usable = Vec::new();
        for entry in state.jobs.values() {
            let (Some(skill), Some(summary)) = (&entry.embeddings.skill, &entry.embeddings.summary) else {
                continue;
            };
            match (coerce_to_vector(skill), coerce_to_vector(summary)) {
                (Ok(skill), Ok(summary)) => usable.push((entry.job.clone(), skill, summary)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(job_id = %entry.job.id, error = %e, "Skipping job with unreadable embedding");
                }
            }
        }
        Ok(rank_by_combined_distance(query, usable)?)
    }

    async fn jobs_by_ids(&self, job_ids: &[String]) -> Result<Vec<JobPosting>, MatchError> {
        let state = self.state.read().await;
        let mut jobs: Vec<JobPosting> = job_ids
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs.dedup_by(|a, b| a.id == b.id);
        Ok(jobs)
    }

    async fn unrated_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<JobPosting>, MatchError> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|e| !state.feedback.contains_key(&(user_id.to_string(), e.job.id.clone())))
            .take(limit)
            .map(|e| e.job.clone())
            .collect())
    }

    async fn upsert_feedback(&self, user_id: &str, job_id: &str, liked: bool) -> Result<Feedback, MatchError> {
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(job_id) {
            return Err(MatchError::validation("job_id", &format!("Unknown job id: {}", job_id)));
        }
        let feedback = Feedback {
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            liked,
            created_at: Utc::now(),
        };
        state
            .feedback
            .insert((user_id.to_string(), job_id.to_string()), feedback.clone());
        Ok(feedback)
    }

    async fn feedback_for_user(&self, user_id: &str) -> Result<Vec<Feedback>, MatchError> {
        let state = self.state.read().await;
        let mut rows: Vec<Feedback> = state
            .feedback
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        Ok(rows)
    }

    async fn like_counts(&self, job_ids: &[String]) -> Result<HashMap<String, u64>, MatchError> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for f in state.feedback.values().filter(|f| f.liked) {
            if job_ids.contains(&f.job_id) {
                *counts.entry(f.job_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn jobs_missing_embeddings(&self, limit: usize) -> Result<Vec<JobText>, MatchError> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|e| !is_complete(&e.embeddings))
            .take(limit)
            .map(|e| JobText { id: e.job.id.clone(), title: e.job.title.clone(), text: e.text.clone() })
            .collect())
    }

    async fn store_job_embeddings(&self, batch: &[JobEmbeddingUpdate]) -> Result<(), MatchError> {
        let mut state = self.state.write().await;
        // Validate the whole batch before touching anything
        if let Some(missing) = batch.iter().find(|u| !state.jobs.contains_key(&u.job_id)) {
            return Err(MatchError::Storage(format!("Job not found: {}", missing.job_id)));
        }
        for update in batch {
            if let Some(entry) = state.jobs.get_mut(&update.job_id) {
                entry.embeddings = pair_to_raw(&update.embeddings);
            }
        }
        Ok(())
    }
}
