/// Reads and writes the skill/summary embeddings of profiles and job postings.
///
/// Read path: stored values go through `coerce_to_vector`, since the persisted form
/// (vector column text, JSON array) differs from the in-memory one.
/// Write path: every vector must have the corpus-wide dimension.

use std::sync::Arc;

use super::EmbeddingPair;
use crate::errors::{MatchError, Warning};
use crate::store::{JobEmbeddingUpdate, RecommendationStore, UserProfile};
use crate::vector::coerce_to_vector;

/// Coerced embeddings of a set of jobs, each space collected independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobVectors {
    pub skill: Vec<Vec<f64>>,
    pub summary: Vec<Vec<f64>>,
    pub warnings: Vec<Warning>,
}

#[derive(Clone)]
pub struct EmbeddingStore {
    store: Arc<dyn RecommendationStore>,
    dimension: usize,
}

impl EmbeddingStore {
    pub fn new(store: Arc<dyn RecommendationStore>, dimension: usize) -> Self {
        EmbeddingStore { store, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Base embeddings of a user's profile.
    ///
    /// Fails with `ProfileNotFound` when there is no profile, `EmbeddingsNotReady`
    /// when either vector is missing, `Format` or `DimensionMismatch` when a stored
    /// vector is corrupt.
    pub async fn profile_embeddings(&self, user_id: &str) -> Result<EmbeddingPair, MatchError> {
        let raw = self
            .store
            .profile_embeddings(user_id)
            .await?
            .ok_or_else(|| MatchError::ProfileNotFound { user_id: user_id.to_string() })?;

        let (Some(skill), Some(summary)) = (raw.skill.as_ref(), raw.summary.as_ref()) else {
            return Err(MatchError::EmbeddingsNotReady { user_id: user_id.to_string() });
        };

        let pair = EmbeddingPair {
            skill: coerce_to_vector(skill)?,
            summary: coerce_to_vector(summary)?,
        };
        self.check_dimensions(&pair)?;
        Ok(pair)
    }

    /// Embeddings of the given jobs. Vectors that fail to coerce are skipped with a warning.
    pub async fn job_vectors(&self, job_ids: &[String]) -> Result<JobVectors, MatchError> {
        if job_ids.is_empty() {
            return Ok(JobVectors::default());
        }

        let rows = self.store.job_embeddings(job_ids).await?;
        let mut out = JobVectors::default();

        for row in rows {
            let spaces = [
                (row.embeddings.skill.as_ref(), &mut out.skill),
                (row.embeddings.summary.as_ref(), &mut out.summary),
            ];
            for (raw, target) in spaces {
                let Some(raw) = raw else { continue };
                match coerce_to_vector(raw) {
                    Ok(v) => target.push(v),
                    Err(e) => {
                        tracing::warn!(job_id = %row.job_id, error = %e, "Could not parse job embedding");
                        out.warnings.push(Warning::UnparsableEmbedding {
                            job_id: row.job_id.clone(),
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(out)
    }

    /// Persist a full profile with both embeddings.
    pub async fn write_profile(&self, profile: &UserProfile, pair: &EmbeddingPair) -> Result<(), MatchError> {
        self.check_dimensions(pair)?;
        self.store.upsert_profile(profile, pair).await
    }

    /// Persist embeddings for a batch of jobs in one transaction.
    pub async fn write_job_batch(&self, batch: &[JobEmbeddingUpdate]) -> Result<(), MatchError> {
        for update in batch {
            self.check_dimensions(&update.embeddings)?;
        }
        self.store.store_job_embeddings(batch).await
    }

    fn check_dimensions(&self, pair: &EmbeddingPair) -> Result<(), MatchError> {
        for v in [&pair.skill, &pair.summary] {
            if v.len() != self.dimension {
                return Err(MatchError::DimensionMismatch { expected: self.dimension, actual: v.len() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{CareerLevel, JobPosting};
    use serde_json::json;

    fn profile(user_id: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            skills: vec!["Rust".to_string()],
            experience: Vec::new(),
            total_experience_years: 2.0,
            career_level: CareerLevel::Mid,
            category: "engineer/developer".to_string(),
            summary: "Systems engineer".to_string(),
        }
    }

    fn job(id: &str) -> JobPosting {
        JobPosting {
            id: id.to_string(),
            title: format!("Job {}", id),
            location: None,
            compensation: None,
            summary: None,
            posting_url: None,
        }
    }

    #[tokio::test]
    async fn test_profile_embeddings_states() {
        let memory = Arc::new(MemoryStore::new());
        let store = EmbeddingStore::new(memory.clone(), 3);

        assert!(matches!(
            store.profile_embeddings("nobody").await,
            Err(MatchError::ProfileNotFound { .. })
        ));

        memory.insert_profile_raw(profile("half"), Some(json!("[1,0,0]")), None).await;
        assert!(matches!(
            store.profile_embeddings("half").await,
            Err(MatchError::EmbeddingsNotReady { .. })
        ));

        memory
            .insert_profile_raw(profile("text"), Some(json!("[1,0,0]")), Some(json!([0.0, 1.0, 0.0])))
            .await;
        let pair = store.profile_embeddings("text").await.unwrap();
        assert_eq!(pair.skill, vec![1.0, 0.0, 0.0]);
        assert_eq!(pair.summary, vec![0.0, 1.0, 0.0]);

        memory.insert_profile_raw(profile("bad"), Some(json!("oops")), Some(json!("[1,0,0]"))).await;
        assert!(matches!(store.profile_embeddings("bad").await, Err(MatchError::Format(_))));
    }

    #[tokio::test]
    async fn test_write_rejects_wrong_dimension() {
        let memory = Arc::new(MemoryStore::new());
        let store = EmbeddingStore::new(memory, 3);
        let pair = EmbeddingPair { skill: vec![1.0, 0.0], summary: vec![1.0, 0.0, 0.0] };
        let err = store.write_profile(&profile("u"), &pair).await.unwrap_err();
        assert!(matches!(err, MatchError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_job_vectors_skip_unparsable() {
        let memory = Arc::new(MemoryStore::new());
        memory.insert_job_raw(job("1"), "", Some(json!("[1,0]")), Some(json!("[0,1]"))).await;
        memory.insert_job_raw(job("2"), "", Some(json!("garbage")), Some(json!([1.0, 1.0]))).await;
        let store = EmbeddingStore::new(memory, 2);

        let vectors = store.job_vectors(&["1".to_string(), "2".to_string()]).await.unwrap();
        assert_eq!(vectors.skill, vec![vec![1.0, 0.0]]);
        assert_eq!(vectors.summary.len(), 2);
        assert_eq!(vectors.warnings.len(), 1);
        assert!(matches!(&vectors.warnings[0], Warning::UnparsableEmbedding { job_id, .. } if job_id == "2"));
    }
}
