/// Hybrid scoring: vector similarity blended with popularity.
///
/// Both dimensions are min-max normalized across the candidate set before weighting:
///   1. Similarity: combined distance inverted, so the closest candidate scores 1.0.
///      All-equal distances score 1.0 each.
///   2. Popularity: like count across all users. All-equal counts score 0.0 each,
///      so popularity never breaks a tie it cannot observe.
///
/// Pure functions, no I/O.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::store::ScoredJob;

/// A candidate with its hybrid score in [0, 1].
#[derive(Debug, Clone)]
pub struct HybridHit {
    pub scored: ScoredJob,
    pub likes: u64,
    pub score: f64,
}

/// Min-max normalization where an all-equal slice maps to `flat`.
pub fn min_max(values: &[f64], flat: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![flat; values.len()];
    }
    values.iter().map(|&v| (v - min) / (max - min)).collect()
}

pub struct HybridScorer {
    similarity_weight: f64,
    popularity_weight: f64,
}

impl HybridScorer {
    pub fn new(similarity_weight: f64, popularity_weight: f64) -> Self {
        HybridScorer { similarity_weight, popularity_weight }
    }

    /// Score and sort candidates (best first), keeping at most `limit`.
    ///
    /// Scores are divided by the weight sum, so they stay in [0, 1] for any weights.
    pub fn rank(&self, candidates: Vec<ScoredJob>, like_counts: &HashMap<String, u64>, limit: usize) -> Vec<HybridHit> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let distances: Vec<f64> = candidates.iter().map(|c| c.distance).collect();
        let likes: Vec<u64> = candidates
            .iter()
            .map(|c| like_counts.get(&c.job.id).copied().unwrap_or(0))
            .collect();
        let likes_f: Vec<f64> = likes.iter().map(|&l| l as f64).collect();

        let similarity: Vec<f64> = min_max(&distances, 0.0).into_iter().map(|d| 1.0 - d).collect();
        let popularity = min_max(&likes_f, 0.0);

        let weight_sum = self.similarity_weight + self.popularity_weight;

        let mut hits: Vec<HybridHit> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, scored)| {
                let raw = self.similarity_weight * similarity[i] + self.popularity_weight * popularity[i];
                let score = if weight_sum > 0.0 { raw / weight_sum } else { 0.0 };
                HybridHit { scored, likes: likes[i], score }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.scored.job.id.cmp(&b.scored.job.id))
        });
        hits.truncate(limit);
        hits
    }
}
