/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: jobmatch.toml (in working directory)
/// 3. Environment variables: prefixed JOBMATCH_ (e.g., JOBMATCH_LOG_LEVEL=debug,
///    JOBMATCH_RECOMMENDATION__SKILL_WEIGHT=0.5 for nested keys)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::MatchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    /// PostgreSQL connection string (pgvector extension required)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub recommendation: RecommendationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/jobmatch".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            database_url: default_database_url(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            recommendation: RecommendationConfig::default(),
            retry: RetryConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name. Only "openai" (and OpenAI-compatible endpoints) is supported.
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    /// Corpus-wide vector length; every stored embedding must have it.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: "openai".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

/// Chat completion provider settings (reranking and job analysis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible base URL (OpenRouter by default)
    pub base_url: String,
    pub rerank_model: String,
    pub analysis_model: String,
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            openai_api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            rerank_model: "google/gemini-2.5-flash".to_string(),
            analysis_model: "google/gemini-2.5-flash".to_string(),
            temperature: 0.3,
        }
    }
}

/// How candidates are turned into the final list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Vector retrieval followed by LLM re-ranking (primary path)
    VectorLlm,
    /// Unrated jobs sent straight to the LLM, no vector retrieval
    LlmOnly,
    /// Vector retrieval blended with popularity, no LLM
    Hybrid,
}

/// Tunable weights and pool sizes for the recommendation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Weight of skill-space distance in the combined distance
    pub skill_weight: f64,
    /// Weight of summary-space distance in the combined distance
    pub summary_weight: f64,
    /// Weight of the stated profile when blending in liked jobs
    pub profile_weight: f64,
    /// Weight of the liked-jobs average when blending
    pub liked_jobs_weight: f64,
    /// Jobs pulled by vector retrieval
    pub candidate_pool_size: usize,
    /// Jobs handed to the reranker
    pub llm_input_limit: usize,
    /// Jobs shown to the user
    pub max_results: usize,
    /// Unrated jobs fetched in llm_only mode
    pub llm_only_batch_size: usize,
    pub hybrid_similarity_weight: f64,
    pub hybrid_popularity_weight: f64,
    pub mode: MatchMode,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        RecommendationConfig {
            skill_weight: 0.4,
            summary_weight: 0.6,
            profile_weight: 0.7,
            liked_jobs_weight: 0.3,
            candidate_pool_size: 50,
            llm_input_limit: 30,
            max_results: 7,
            llm_only_batch_size: 30,
            hybrid_similarity_weight: 0.7,
            hybrid_popularity_weight: 0.3,
            mode: MatchMode::VectorLlm,
        }
    }
}

/// Bounded exponential backoff for upstream provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Offline job enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Postings per batch (one transaction per batch)
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    /// Pause after each committed batch
    pub batch_delay_ms: u64,
    /// Delays before each full re-run after a run with failures
    pub rerun_delays_ms: Vec<u64>,
    /// Job text longer than this is truncated before analysis
    pub max_job_text_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        EnrichmentConfig {
            batch_size: 8,
            max_concurrent_batches: 5,
            batch_delay_ms: 250,
            rerun_delays_ms: vec![2_500, 10_000, 20_000],
            max_job_text_chars: 12_000,
        }
    }
}

impl EnrichmentConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: JOBMATCH_LOG_LEVEL=debug overrides log_level in jobmatch.toml
    pub fn load() -> Result<Config, MatchError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("jobmatch.toml"))
            .merge(Env::prefixed("JOBMATCH_").split("__"))
            .extract()
            .map_err(|e| MatchError::Config(format!("Failed to load config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), MatchError> {
        let rec = &self.recommendation;
        let weights = [
            ("skill_weight", rec.skill_weight),
            ("summary_weight", rec.summary_weight),
            ("profile_weight", rec.profile_weight),
            ("liked_jobs_weight", rec.liked_jobs_weight),
            ("hybrid_similarity_weight", rec.hybrid_similarity_weight),
            ("hybrid_popularity_weight", rec.hybrid_popularity_weight),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(MatchError::Config(format!("{} must be a non-negative number, got {}", name, w)));
            }
        }
        let sizes = [
            ("candidate_pool_size", rec.candidate_pool_size),
            ("llm_input_limit", rec.llm_input_limit),
            ("max_results", rec.max_results),
            ("llm_only_batch_size", rec.llm_only_batch_size),
            ("embedding.dimension", self.embedding.dimension),
            ("enrichment.batch_size", self.enrichment.batch_size),
            ("enrichment.max_concurrent_batches", self.enrichment.max_concurrent_batches),
        ];
        for (name, n) in sizes {
            if n == 0 {
                return Err(MatchError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(MatchError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, None);
        assert_eq!(config.recommendation.skill_weight, 0.4);
        assert_eq!(config.recommendation.summary_weight, 0.6);
        assert_eq!(config.recommendation.candidate_pool_size, 50);
        assert_eq!(config.recommendation.llm_input_limit, 30);
        assert_eq!(config.recommendation.max_results, 7);
        assert_eq!(config.recommendation.mode, MatchMode::VectorLlm);
        assert_eq!(config.enrichment.batch_size, 8);
        assert_eq!(config.enrichment.max_concurrent_batches, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_negative_weight() {
        let mut config = Config::default();
        config.recommendation.liked_jobs_weight = -0.1;
        assert!(matches!(config.validate(), Err(MatchError::Config(_))));
    }

    #[test]
    fn test_config_env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "jobmatch.toml",
                "log_level = \"debug\"\n[recommendation]\nskill_weight = 0.9\nmode = \"hybrid\"\n",
            )?;
            jail.set_env("JOBMATCH_RECOMMENDATION__SUMMARY_WEIGHT", "0.1");
            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.recommendation.skill_weight, 0.9);
            assert_eq!(config.recommendation.summary_weight, 0.1);
            assert_eq!(config.recommendation.mode, MatchMode::Hybrid);
            assert_eq!(config.recommendation.max_results, 7);
            Ok(())
        });
    }
}
