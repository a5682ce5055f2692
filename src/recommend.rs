/// Recommendation orchestration.
///
/// `Recommender::recommend` runs one user-initiated match request end to end:
///   1. load the profile (`ProfileNotFound`)
///   2. load its base embeddings (`EmbeddingsNotReady`)
///   3. load all feedback; every rated job is excluded
///   4. adjust the query toward liked jobs
///   5. retrieve the candidate pool by combined distance
///   6. empty pool -> `NoCandidates`
///   7. rerank the first `llm_input_limit` candidates against the stated profile
///   8. join the reranked ids back to full job records
///
/// Two alternate modes share the same result type: `llm_only` (unrated jobs straight
/// to the reranker) and `hybrid` (similarity blended with popularity, no LLM).
/// All state is request-scoped.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{MatchMode, RecommendationConfig};
use crate::embedding::store::EmbeddingStore;
use crate::errors::{MatchError, Warning};
use crate::rerank::{CandidateJob, LlmReranker, Reranked};
use crate::search::{CandidateRetriever, HybridScorer, PreferenceAdjuster};
use crate::store::{JobPosting, RecommendationStore, ScoredJob, UserProfile};

/// One recommended job with display fields, score (0 to 100) and reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub job: JobPosting,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Final ordered list plus the data-quality problems tolerated while building it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    pub mode: MatchMode,
    pub results: Vec<RankedResult>,
    pub warnings: Vec<Warning>,
}

/// Adjusted query and exclusion set for one request.
struct PreparedQuery {
    profile: UserProfile,
    skill: Vec<f64>,
    summary: Vec<f64>,
    exclude_ids: HashSet<String>,
    warnings: Vec<Warning>,
}

pub struct Recommender {
    store: Arc<dyn RecommendationStore>,
    embeddings: EmbeddingStore,
    retriever: CandidateRetriever,
    adjuster: PreferenceAdjuster,
    hybrid: HybridScorer,
    reranker: Option<LlmReranker>,
    config: RecommendationConfig,
}

impl Recommender {
    /// Without a reranker, LLM modes fall back to `hybrid`.
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        dimension: usize,
        config: RecommendationConfig,
        reranker: Option<LlmReranker>,
    ) -> Self {
        let embeddings = EmbeddingStore::new(store.clone(), dimension);
        Recommender {
            retriever: CandidateRetriever::new(store.clone(), dimension, &config),
            adjuster: PreferenceAdjuster::new(embeddings.clone(), &config),
            hybrid: HybridScorer::new(config.hybrid_similarity_weight, config.hybrid_popularity_weight),
            store,
            embeddings,
            reranker,
            config,
        }
    }

    /// Mode actually used for `requested`, given whether a reranker is configured.
    pub fn effective_mode(&self, requested: MatchMode) -> MatchMode {
        match requested {
            MatchMode::VectorLlm | MatchMode::LlmOnly if self.reranker.is_none() => {
                tracing::warn!(requested = ?requested, "No completion provider configured, using hybrid mode");
                MatchMode::Hybrid
            }
            other => other,
        }
    }

    /// Recommend jobs using the configured mode.
    pub async fn recommend(&self, user_id: &str, cancel: &CancellationToken) -> Result<Recommendations, MatchError> {
        self.recommend_with_mode(user_id, self.config.mode, cancel).await
    }

    pub async fn recommend_with_mode(
        &self,
        user_id: &str,
        mode: MatchMode,
        cancel: &CancellationToken,
    ) -> Result<Recommendations, MatchError> {
        if user_id.trim().is_empty() {
            return Err(MatchError::validation("user_id", "User id cannot be empty"));
        }

        let mode = self.effective_mode(mode);
        let (results, warnings) = match (mode, self.reranker.as_ref()) {
            (MatchMode::VectorLlm, Some(reranker)) => self.vector_llm(user_id, reranker, cancel).await?,
            (MatchMode::LlmOnly, Some(reranker)) => self.llm_only(user_id, reranker, cancel).await?,
            _ => self.hybrid(user_id).await?,
        };

        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        tracing::info!(
            user_id,
            mode = ?mode,
            results = results.len(),
            warnings = warnings.len(),
            "Recommendations ready"
        );
        Ok(Recommendations { mode, results, warnings })
    }

    /// Steps 1 to 4: profile, base embeddings, feedback, preference adjustment.
    async fn prepare_query(&self, user_id: &str) -> Result<PreparedQuery, MatchError> {
        let profile = self.load_profile(user_id).await?;
        let base = self.embeddings.profile_embeddings(user_id).await?;

        let feedback = self.store.feedback_for_user(user_id).await?;
        let exclude_ids: HashSet<String> = feedback.iter().map(|f| f.job_id.clone()).collect();
        let liked_ids: Vec<String> = feedback.iter().filter(|f| f.liked).map(|f| f.job_id.clone()).collect();

        let adjusted = self.adjuster.adjust(&base, &liked_ids).await?;

        tracing::debug!(
            user_id,
            rated = exclude_ids.len(),
            liked = liked_ids.len(),
            "Prepared match query"
        );

        Ok(PreparedQuery {
            profile,
            skill: adjusted.skill,
            summary: adjusted.summary,
            exclude_ids,
            warnings: adjusted.warnings,
        })
    }

    async fn load_profile(&self, user_id: &str) -> Result<UserProfile, MatchError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| MatchError::ProfileNotFound { user_id: user_id.to_string() })
    }

    /// Steps 5 and 6.
    async fn candidate_pool(&self, user_id: &str, query: &PreparedQuery) -> Result<Vec<ScoredJob>, MatchError> {
        let pool = self
            .retriever
            .retrieve(&query.skill, &query.summary, &query.exclude_ids, self.config.candidate_pool_size)
            .await?;
        if pool.is_empty() {
            return Err(MatchError::NoCandidates { user_id: user_id.to_string() });
        }
        Ok(pool)
    }

    async fn vector_llm(
        &self,
        user_id: &str,
        reranker: &LlmReranker,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RankedResult>, Vec<Warning>), MatchError> {
        let query = self.prepare_query(user_id).await?;
        let pool = self.candidate_pool(user_id, &query).await?;

        let shortlist: Vec<JobPosting> = pool
            .into_iter()
            .take(self.config.llm_input_limit)
            .map(|s| s.job)
            .collect();
        let candidates: Vec<CandidateJob> = shortlist.iter().map(CandidateJob::from).collect();

        // Uses the stated profile; adjusted vectors only steer retrieval
        let reranked = reranker
            .rerank(&query.profile, &candidates, self.config.max_results, cancel)
            .await?;

        let mut warnings = query.warnings;
        let results = join_results(reranked, &shortlist, &mut warnings);
        Ok((results, warnings))
    }

    async fn llm_only(
        &self,
        user_id: &str,
        reranker: &LlmReranker,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RankedResult>, Vec<Warning>), MatchError> {
        let profile = self.load_profile(user_id).await?;
        let unrated = self.store.unrated_jobs(user_id, self.config.llm_only_batch_size).await?;
        if unrated.is_empty() {
            return Err(MatchError::NoCandidates { user_id: user_id.to_string() });
        }

        let candidates: Vec<CandidateJob> = unrated.iter().map(CandidateJob::from).collect();
        let reranked = reranker
            .rerank(&profile, &candidates, self.config.max_results, cancel)
            .await?;

        let mut warnings = Vec::new();
        let results = join_results(reranked, &unrated, &mut warnings);
        Ok((results, warnings))
    }

    async fn hybrid(&self, user_id: &str) -> Result<(Vec<RankedResult>, Vec<Warning>), MatchError> {
        let query = self.prepare_query(user_id).await?;
        let pool = self.candidate_pool(user_id, &query).await?;

        let ids: Vec<String> = pool.iter().map(|s| s.job.id.clone()).collect();
        let like_counts = self.store.like_counts(&ids).await?;

        let results = self
            .hybrid
            .rank(pool, &like_counts, self.config.max_results)
            .into_iter()
            .map(|hit| RankedResult {
                job: hit.scored.job,
                score: hit.score * 100.0,
                reason: None,
            })
            .collect();
        Ok((results, query.warnings))
    }
}

/// Step 8: attach full records to reranked ids, keeping reranker order.
fn join_results(reranked: Reranked, records: &[JobPosting], warnings: &mut Vec<Warning>) -> Vec<RankedResult> {
    warnings.extend(reranked.warnings);
    let by_id: HashMap<&str, &JobPosting> = records.iter().map(|j| (j.id.as_str(), j)).collect();

    reranked
        .jobs
        .into_iter()
        .filter_map(|r| match by_id.get(r.id.as_str()) {
            Some(job) => Some(RankedResult { job: (*job).clone(), score: r.score, reason: r.reason }),
            None => {
                tracing::warn!(job_id = %r.id, "Reranked job has no matching record");
                warnings.push(Warning::MissingJobRecord { job_id: r.id });
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::RerankedJob;

    fn job(id: &str) -> JobPosting {
        JobPosting {
            id: id.to_string(),
            title: format!("Job {}", id),
            location: None,
            compensation: None,
            summary: None,
            posting_url: Some(format!("https://jobs.example/{}", id)),
        }
    }

    #[test]
    fn test_join_keeps_order_and_reports_missing() {
        let reranked = Reranked {
            jobs: vec![
                RerankedJob { id: "2".into(), score: 90.0, reason: Some("fits".into()) },
                RerankedJob { id: "9".into(), score: 80.0, reason: None },
                RerankedJob { id: "1".into(), score: 70.0, reason: None },
            ],
            warnings: Vec::new(),
        };
        let mut warnings = Vec::new();
        let results = join_results(reranked, &[job("1"), job("2")], &mut warnings);

        let ids: Vec<&str> = results.iter().map(|r| r.job.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(results[0].job.posting_url.as_deref(), Some("https://jobs.example/2"));
        assert_eq!(warnings, vec![Warning::MissingJobRecord { job_id: "9".into() }]);
    }

    #[test]
    fn test_ranked_result_serializes_flat() {
        let result = RankedResult { job: job("1"), score: 75.0, reason: None };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], "1");
        assert_eq!(json["score"], 75.0);
        assert!(json.get("reason").is_none());
    }
}
