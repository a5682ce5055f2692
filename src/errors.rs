/// Domain-specific error types for jobmatch
///
/// Every failure the recommendation core can produce maps onto one variant here.
/// Expected business states (missing profile, embeddings not ready, nothing left to
/// recommend) are ordinary variants so callers can branch on them; see
/// `MatchError::is_business_state`.

use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Profile not found for user {user_id}")]
    ProfileNotFound {
        user_id: String
    },

    #[error("Embeddings not ready for user {user_id}")]
    EmbeddingsNotReady {
        user_id: String
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("Vector format error: {0}")]
    Format(String),

    #[error("No candidate jobs for user {user_id}")]
    NoCandidates {
        user_id: String
    },

    #[error("Could not parse LLM response: {0}")]
    LlmParseFailure(String),

    #[error("Upstream provider error: {0}")]
    UpstreamProvider(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for MatchError {
    fn from(e: sqlx::Error) -> Self {
        MatchError::Storage(e.to_string())
    }
}

impl From<crate::vector::VectorError> for MatchError {
    fn from(e: crate::vector::VectorError) -> Self {
        match e {
            crate::vector::VectorError::DimensionMismatch { expected, actual } => {
                MatchError::DimensionMismatch { expected, actual }
            }
            crate::vector::VectorError::Format(msg) => MatchError::Format(msg),
        }
    }
}

impl From<crate::embedding::EmbeddingError> for MatchError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        MatchError::UpstreamProvider(e.to_string())
    }
}

impl From<crate::completion::CompletionError> for MatchError {
    fn from(e: crate::completion::CompletionError) -> Self {
        MatchError::UpstreamProvider(e.to_string())
    }
}

impl MatchError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use jobmatch::errors::MatchError;
    /// let err = MatchError::validation("user_id", "User id cannot be empty");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        MatchError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Stable machine-readable reason code for presentation layers.
    pub fn reason_code(&self) -> &'static str {
        match self {
            MatchError::ProfileNotFound { .. } => "profile_not_found",
            MatchError::EmbeddingsNotReady { .. } => "embeddings_not_ready",
            MatchError::DimensionMismatch { .. } => "dimension_mismatch",
            MatchError::Format(_) => "format_error",
            MatchError::NoCandidates { .. } => "no_candidates",
            MatchError::LlmParseFailure(_) => "llm_parse_failure",
            MatchError::UpstreamProvider(_) => "upstream_provider_error",
            MatchError::Validation { .. } => "validation_error",
            MatchError::Cancelled => "cancelled",
            MatchError::Config(_) => "config_error",
            MatchError::Storage(_) => "storage_error",
            MatchError::Internal(_) => "internal_error",
        }
    }

    /// True for expected outcomes that are not faults of the system.
    pub fn is_business_state(&self) -> bool {
        matches!(
            self,
            MatchError::ProfileNotFound { .. }
                | MatchError::EmbeddingsNotReady { .. }
                | MatchError::NoCandidates { .. }
        )
    }
}

/// A tolerated data-quality problem, reported next to a successful result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A vector was left out of an average because its length differed from the rest.
    MismatchedLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
    /// A stored embedding could not be coerced into a vector.
    UnparsableEmbedding {
        job_id: String,
        detail: String,
    },
    /// The LLM returned an id that was not among the candidates it was given.
    UnknownRerankId {
        id: String,
    },
    /// A reranked id could not be joined back to a full job record.
    MissingJobRecord {
        job_id: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MismatchedLength { index, expected, actual } => write!(
                f,
                "skipped vector {} with mismatched length (expected {}, got {})",
                index, expected, actual
            ),
            Warning::UnparsableEmbedding { job_id, detail } => {
                write!(f, "could not parse embedding for job {}: {}", job_id, detail)
            }
            Warning::UnknownRerankId { id } => {
                write!(f, "LLM returned job id {} which was not in the candidate set", id)
            }
            Warning::MissingJobRecord { job_id } => {
                write!(f, "reranked job {} has no matching job record", job_id)
            }
        }
    }
}
