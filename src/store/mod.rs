/// Recommendation store abstraction layer
///
/// Provides the RecommendationStore trait and the typed records it exchanges:
/// user profiles, job postings, feedback and raw stored embeddings.
/// The trait abstraction enables multiple backends: PostgreSQL with pgvector,
/// and an in-memory store for tests and small corpora.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::embedding::EmbeddingPair;
use crate::errors::MatchError;

pub mod memory;
pub mod postgres;

/// Career level estimated from a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CareerLevel {
    Entry,
    Mid,
    Senior,
    Staff,
}

impl fmt::Display for CareerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CareerLevel::Entry => write!(f, "entry"),
            CareerLevel::Mid => write!(f, "mid"),
            CareerLevel::Senior => write!(f, "senior"),
            CareerLevel::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for CareerLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(CareerLevel::Entry),
            "mid" => Ok(CareerLevel::Mid),
            "senior" => Ok(CareerLevel::Senior),
            "staff" => Ok(CareerLevel::Staff),
            other => Err(format!("Unknown career level: {}", other)),
        }
    }
}

/// One position from the candidate's work history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    /// YYYY-MM
    pub start_date: String,
    /// YYYY-MM or "Present"
    pub end_date: String,
    pub duration_months: u32,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

/// Structured profile derived from a resume. Replaced as a whole on re-upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    pub total_experience_years: f64,
    pub career_level: CareerLevel,
    pub category: String,
    pub summary: String,
}

/// Job posting fields needed for ranking prompts and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub location: Option<String>,
    pub compensation: Option<String>,
    pub summary: Option<String>,
    pub posting_url: Option<String>,
}

/// Raw job text awaiting enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct JobText {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// Explicit like/dislike. At most one per (user, job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub user_id: String,
    pub job_id: String,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
}

/// Embeddings exactly as persisted, before coercion.
///
/// A value may be a JSON number array or the bracketed text form of a vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEmbeddings {
    pub skill: Option<serde_json::Value>,
    pub summary: Option<serde_json::Value>,
}

/// Raw stored embeddings of one job posting.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEmbeddingRow {
    pub job_id: String,
    pub embeddings: RawEmbeddings,
}

/// New embeddings for one job posting, written as part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEmbeddingUpdate {
    pub job_id: String,
    pub embeddings: EmbeddingPair,
}

/// Nearest-neighbour query over the job corpus.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub skill: Vec<f64>,
    pub summary: Vec<f64>,
    pub skill_weight: f64,
    pub summary_weight: f64,
    /// Jobs the user already rated
    pub exclude_ids: HashSet<String>,
    pub k: usize,
}

/// A job and its combined distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredJob {
    pub job: JobPosting,
    pub distance: f64,
}

/// Core abstraction for recommendation persistence.
///
/// All implementations must be Send + Sync to support concurrent access.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Insert or fully replace a user's profile together with both embeddings.
    async fn upsert_profile(&self, profile: &UserProfile, embeddings: &EmbeddingPair) -> Result<(), MatchError>;

    /// Retrieve a profile's textual fields.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, MatchError>;

    /// Retrieve a profile's stored embeddings. None when the profile does not exist.
    async fn profile_embeddings(&self, user_id: &str) -> Result<Option<RawEmbeddings>, MatchError>;

    /// Stored embeddings for the given jobs, limited to jobs with both embeddings populated.
    async fn job_embeddings(&self, job_ids: &[String]) -> Result<Vec<JobEmbeddingRow>, MatchError>;

    /// Up to `query.k` jobs with both embeddings, not excluded, ordered by ascending
    /// combined distance, then by id.
    async fn nearest_jobs(&self, query: &CandidateQuery) -> Result<Vec<ScoredJob>, MatchError>;

    /// Job records for the given ids. Unknown ids are left out.
    async fn jobs_by_ids(&self, job_ids: &[String]) -> Result<Vec<JobPosting>, MatchError>;

    /// Up to `limit` jobs the user has not rated, embeddings not required, ordered by id.
    async fn unrated_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<JobPosting>, MatchError>;

    /// Insert or overwrite the feedback for (user, job).
    async fn upsert_feedback(&self, user_id: &str, job_id: &str, liked: bool) -> Result<Feedback, MatchError>;

    /// All feedback rows (likes and dislikes) of a user.
    async fn feedback_for_user(&self, user_id: &str) -> Result<Vec<Feedback>, MatchError>;

    /// Number of likes across all users for each of the given jobs. Jobs without likes are absent.
    async fn like_counts(&self, job_ids: &[String]) -> Result<HashMap<String, u64>, MatchError>;

    /// Up to `limit` jobs missing either embedding, ordered by id.
    async fn jobs_missing_embeddings(&self, limit: usize) -> Result<Vec<JobText>, MatchError>;

    /// Write embeddings for a batch of jobs atomically: all or none.
    async fn store_job_embeddings(&self, batch: &[JobEmbeddingUpdate]) -> Result<(), MatchError>;
}
