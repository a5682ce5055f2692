/// Explicit like/dislike feedback.
///
/// One row per (user, job); a new submission overwrites the previous one. Any rated
/// job is excluded from that user's future retrieval, permanently.

use std::sync::Arc;

use crate::errors::MatchError;
use crate::store::{Feedback, JobPosting, RecommendationStore};

pub struct FeedbackService {
    store: Arc<dyn RecommendationStore>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        FeedbackService { store }
    }

    pub async fn submit_feedback(&self, user_id: &str, job_id: &str, liked: bool) -> Result<Feedback, MatchError> {
        if user_id.trim().is_empty() {
            return Err(MatchError::validation("user_id", "User id cannot be empty"));
        }
        if job_id.trim().is_empty() {
            return Err(MatchError::validation("job_id", "Job id cannot be empty"));
        }

        let feedback = self.store.upsert_feedback(user_id, job_id, liked).await?;
        tracing::info!(user_id, job_id, liked, "Feedback recorded");
        Ok(feedback)
    }

    /// Display records of the jobs a user liked. Empty when there are none.
    pub async fn liked_jobs(&self, user_id: &str) -> Result<Vec<JobPosting>, MatchError> {
        let liked: Vec<String> = self
            .store
            .feedback_for_user(user_id)
            .await?
            .into_iter()
            .filter(|f| f.liked)
            .map(|f| f.job_id)
            .collect();

        if liked.is_empty() {
            return Ok(Vec::new());
        }
        self.store.jobs_by_ids(&liked).await
    }
}
