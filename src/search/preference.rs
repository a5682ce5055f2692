/// Preference adjustment: steer the profile query toward jobs the user liked.
///
/// Per embedding space, liked-job vectors are averaged and normalized, then blended
/// with the profile vector as `profile_weight * base + liked_weight * liked_avg`
/// and normalized again. With no usable liked vectors the base is returned unchanged.

use crate::config::RecommendationConfig;
use crate::embedding::store::EmbeddingStore;
use crate::embedding::EmbeddingPair;
use crate::errors::{MatchError, Warning};
use crate::vector::{average_vectors, weighted_combine};

/// Query vectors after adjustment, with any degradation warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedQuery {
    pub skill: Vec<f64>,
    pub summary: Vec<f64>,
    pub warnings: Vec<Warning>,
}

/// Blend a base vector with the average of liked vectors.
pub fn blend(
    base: &[f64],
    liked: &[Vec<f64>],
    profile_weight: f64,
    liked_weight: f64,
) -> Result<(Vec<f64>, Vec<Warning>), MatchError> {
    let averaged = average_vectors(liked);
    match averaged.vector {
        None => Ok((base.to_vec(), averaged.warnings)),
        Some(avg) => {
            let combined = weighted_combine(base, &avg, profile_weight, liked_weight)?;
            Ok((combined, averaged.warnings))
        }
    }
}

pub struct PreferenceAdjuster {
    embeddings: EmbeddingStore,
    profile_weight: f64,
    liked_weight: f64,
}

impl PreferenceAdjuster {
    pub fn new(embeddings: EmbeddingStore, config: &RecommendationConfig) -> Self {
        PreferenceAdjuster {
            embeddings,
            profile_weight: config.profile_weight,
            liked_weight: config.liked_jobs_weight,
        }
    }

    pub async fn adjust(&self, base: &EmbeddingPair, liked_job_ids: &[String]) -> Result<AdjustedQuery, MatchError> {
        if liked_job_ids.is_empty() {
            return Ok(AdjustedQuery {
                skill: base.skill.clone(),
                summary: base.summary.clone(),
                warnings: Vec::new(),
            });
        }

        let liked = self.embeddings.job_vectors(liked_job_ids).await?;
        let mut warnings = liked.warnings;

        let (skill, skill_warnings) = blend(&base.skill, &liked.skill, self.profile_weight, self.liked_weight)?;
        let (summary, summary_warnings) =
            blend(&base.summary, &liked.summary, self.profile_weight, self.liked_weight)?;
        warnings.extend(skill_warnings);
        warnings.extend(summary_warnings);

        tracing::debug!(
            liked = liked_job_ids.len(),
            skill_vectors = liked.skill.len(),
            summary_vectors = liked.summary.len(),
            "Adjusted query toward liked jobs"
        );

        Ok(AdjustedQuery { skill, summary, warnings })
    }
}
