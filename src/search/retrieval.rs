/// Candidate retrieval by combined skill/summary distance.
///
/// The combined distance of a job is
///   summary_weight * L2(job.summary, query.summary) + skill_weight * L2(job.skill, query.skill)
/// and candidates come back in ascending order (closest first), ties broken by job id.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RecommendationConfig;
use crate::errors::MatchError;
use crate::store::{CandidateQuery, JobPosting, RecommendationStore, ScoredJob};
use crate::vector::{l2_distance, VectorError};

/// Rank jobs against a query in process.
///
/// Backends that cannot push the distance into their query engine use this. Jobs in
/// `query.exclude_ids` are skipped. Any job whose vectors disagree in length with the
/// query fails the whole ranking.
pub fn rank_by_combined_distance<I>(query: &CandidateQuery, jobs: I) -> Result<Vec<ScoredJob>, VectorError>
where
    I: IntoIterator<Item = (JobPosting, Vec<f64>, Vec<f64>)>,
{
    let mut scored = Vec::new();
    for (job, skill, summary) in jobs {
        if query.exclude_ids.contains(&job.id) {
            continue;
        }
        let distance = query.summary_weight * l2_distance(&query.summary, &summary)?
            + query.skill_weight * l2_distance(&query.skill, &skill)?;
        scored.push(ScoredJob { job, distance });
    }

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.job.id.cmp(&b.job.id))
    });
    scored.truncate(query.k);
    Ok(scored)
}

/// Fetches the nearest unrated jobs for an adjusted query pair.
pub struct CandidateRetriever {
    store: Arc<dyn RecommendationStore>,
    dimension: usize,
    skill_weight: f64,
    summary_weight: f64,
}

impl CandidateRetriever {
    pub fn new(store: Arc<dyn RecommendationStore>, dimension: usize, config: &RecommendationConfig) -> Self {
        CandidateRetriever {
            store,
            dimension,
            skill_weight: config.skill_weight,
            summary_weight: config.summary_weight,
        }
    }

    /// Up to `k` jobs ordered by ascending combined distance, excluding `exclude_ids`.
    pub async fn retrieve(
        &self,
        skill: &[f64],
        summary: &[f64],
        exclude_ids: &HashSet<String>,
        k: usize,
    ) -> Result<Vec<ScoredJob>, MatchError> {
        for v in [skill, summary] {
            if v.len() != self.dimension {
                return Err(MatchError::DimensionMismatch { expected: self.dimension, actual: v.len() });
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = CandidateQuery {
            skill: skill.to_vec(),
            summary: summary.to_vec(),
            skill_weight: self.skill_weight,
            summary_weight: self.summary_weight,
            exclude_ids: exclude_ids.clone(),
            k,
        };

        let candidates = self.store.nearest_jobs(&query).await?;
        tracing::debug!(
            k,
            excluded = exclude_ids.len(),
            returned = candidates.len(),
            "Candidate retrieval complete"
        );
        Ok(candidates)
    }
}
