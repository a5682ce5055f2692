/// Profile ingestion.
///
/// A structured profile (produced upstream from a resume) is stored together with
/// its two embeddings. Skills text and summary text are embedded concurrently and
/// the profile row is replaced as a whole, never partially updated.

use std::sync::Arc;

use crate::embedding::store::EmbeddingStore;
use crate::embedding::{embed_pair, skills_text, EmbeddingPair, EmbeddingProvider};
use crate::errors::MatchError;
use crate::retry::RetryPolicy;
use crate::store::{RecommendationStore, UserProfile};

pub struct ProfileService {
    store: Arc<dyn RecommendationStore>,
    embeddings: EmbeddingStore,
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

fn validate(profile: &UserProfile) -> Result<(), MatchError> {
    if profile.user_id.trim().is_empty() {
        return Err(MatchError::validation("user_id", "User id cannot be empty"));
    }
    if profile.summary.trim().is_empty() {
        return Err(MatchError::validation("summary", "Profile summary cannot be empty"));
    }
    if profile.skills.iter().all(|s| s.trim().is_empty()) {
        return Err(MatchError::validation("skills", "Profile needs at least one skill"));
    }
    if !profile.total_experience_years.is_finite() || profile.total_experience_years < 0.0 {
        return Err(MatchError::validation(
            "total_experience_years",
            "Experience years must be a non-negative number",
        ));
    }
    Ok(())
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        provider: Arc<dyn EmbeddingProvider>,
        dimension: usize,
        retry: RetryPolicy,
    ) -> Self {
        ProfileService {
            embeddings: EmbeddingStore::new(store.clone(), dimension),
            store,
            provider,
            retry,
        }
    }

    /// Embed and store a profile, replacing any previous one for the same user.
    pub async fn save_profile(&self, profile: &UserProfile) -> Result<EmbeddingPair, MatchError> {
        validate(profile)?;

        let pair = embed_pair(
            self.provider.as_ref(),
            self.retry,
            &skills_text(&profile.skills),
            &profile.summary,
        )
        .await?;

        self.embeddings.write_profile(profile, &pair).await?;
        tracing::info!(
            user_id = %profile.user_id,
            skills = profile.skills.len(),
            model = self.provider.model_name(),
            "Profile stored with embeddings"
        );
        Ok(pair)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, MatchError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| MatchError::ProfileNotFound { user_id: user_id.to_string() })
    }
}
