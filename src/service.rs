/// Upward-facing match operation.
///
/// `MatchService::get_recommendations` is what a presentation layer calls. It never
/// fails: every error is folded into `MatchOutcome::Unavailable` with a stable reason
/// code, a message and, where one helps, a hint for the user.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::MatchMode;
use crate::errors::{MatchError, Warning};
use crate::inflight::InFlightMatches;
use crate::recommend::{RankedResult, Recommender};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Ranked {
        mode: MatchMode,
        results: Vec<RankedResult>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<Warning>,
    },
    Unavailable {
        reason: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<&'static str>,
    },
}

impl MatchOutcome {
    pub fn is_ranked(&self) -> bool {
        matches!(self, MatchOutcome::Ranked { .. })
    }
}

/// Map a failed request to its user-facing outcome.
pub fn error_to_outcome(err: &MatchError) -> MatchOutcome {
    let hint = match err {
        MatchError::ProfileNotFound { .. } => Some("Upload a resume to create a profile first"),
        MatchError::EmbeddingsNotReady { .. } => Some("Your profile is still being processed, try again shortly"),
        MatchError::NoCandidates { .. } => {
            Some("No relevant jobs found. Try broadening your profile or rating more jobs")
        }
        MatchError::UpstreamProvider(_) => Some("A matching service is unavailable, try again later"),
        MatchError::Cancelled => Some("Superseded by a newer request"),
        _ => None,
    };

    MatchOutcome::Unavailable {
        reason: err.reason_code(),
        message: err.to_string(),
        hint,
    }
}

pub struct MatchService {
    recommender: Recommender,
    in_flight: InFlightMatches,
}

impl MatchService {
    pub fn new(recommender: Recommender) -> Self {
        MatchService { recommender, in_flight: InFlightMatches::new() }
    }

    /// Recommendations for `user_id` in the configured mode.
    ///
    /// A newer call for the same user cancels this one, which then reports `cancelled`.
    pub async fn get_recommendations(&self, user_id: &str) -> MatchOutcome {
        self.run(user_id, None).await
    }

    /// Same as `get_recommendations` with an explicit mode.
    pub async fn get_recommendations_with_mode(&self, user_id: &str, mode: MatchMode) -> MatchOutcome {
        self.run(user_id, Some(mode)).await
    }

    async fn run(&self, user_id: &str, mode: Option<MatchMode>) -> MatchOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("match", %request_id, user_id);

        async {
            let ticket = self.in_flight.begin(user_id);
            let result = self.recommend(user_id, mode, ticket.token()).await;
            self.in_flight.finish(&ticket);

            match result {
                Ok(recs) => MatchOutcome::Ranked {
                    mode: recs.mode,
                    results: recs.results,
                    warnings: recs.warnings,
                },
                Err(e) => {
                    if e.is_business_state() || matches!(e, MatchError::Cancelled) {
                        tracing::info!(reason = e.reason_code(), "No recommendations available");
                    } else {
                        tracing::error!(error = %e, reason = e.reason_code(), "Match request failed");
                    }
                    error_to_outcome(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn recommend(
        &self,
        user_id: &str,
        mode: Option<MatchMode>,
        token: &CancellationToken,
    ) -> Result<crate::recommend::Recommendations, MatchError> {
        match mode {
            Some(mode) => self.recommender.recommend_with_mode(user_id, mode, token).await,
            None => self.recommender.recommend(user_id, token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_states_carry_hints() {
        let outcome = error_to_outcome(&MatchError::NoCandidates { user_id: "u".into() });
        match outcome {
            MatchOutcome::Unavailable { reason, hint, .. } => {
                assert_eq!(reason, "no_candidates");
                assert!(hint.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = error_to_outcome(&MatchError::LlmParseFailure("bad json".into()));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "llm_parse_failure");
        assert!(json.get("hint").is_none());

        let ranked = MatchOutcome::Ranked { mode: MatchMode::Hybrid, results: Vec::new(), warnings: Vec::new() };
        let json = serde_json::to_value(&ranked).unwrap();
        assert_eq!(json["status"], "ranked");
        assert_eq!(json["mode"], "hybrid");
        assert!(json.get("warnings").is_none());
    }
}
