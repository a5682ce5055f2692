use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use jobmatch::completion::openai::OpenAICompletionProvider;
use jobmatch::completion::CompletionProvider;
use jobmatch::config::{Config, MatchMode};
use jobmatch::embedding::openai::OpenAIEmbeddingProvider;
use jobmatch::embedding::EmbeddingProvider;
use jobmatch::enrichment::{Enricher, JobAnalyzer};
use jobmatch::feedback::FeedbackService;
use jobmatch::logging;
use jobmatch::profile::ProfileService;
use jobmatch::recommend::Recommender;
use jobmatch::rerank::LlmReranker;
use jobmatch::retry::RetryPolicy;
use jobmatch::service::MatchService;
use jobmatch::store::postgres::PostgresStore;
use jobmatch::store::{RecommendationStore, UserProfile};

#[derive(Parser)]
#[command(name = "jobmatch", version, about = "Hybrid vector + LLM job recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skip automatic database migration on startup
    #[arg(long)]
    skip_migrate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit
    Migrate,
    /// Recommend jobs for a user and print them as JSON
    Recommend {
        #[arg(long)]
        user: String,
        /// Override the configured match mode
        #[arg(long, value_enum)]
        mode: Option<MatchMode>,
    },
    /// Like or dislike a job
    Feedback {
        #[arg(long)]
        user: String,
        #[arg(long)]
        job: String,
        #[arg(long, action = ArgAction::Set)]
        liked: bool,
    },
    /// Store a structured profile (JSON file) and compute its embeddings
    Profile {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Compute embeddings for every job posting that is missing them
    Enrich,
    /// List the jobs a user liked
    Liked {
        #[arg(long)]
        user: String,
    },
}

fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbeddingProvider::new(&config.embedding)?)),
        other => anyhow::bail!("Unknown embedding provider '{}'. Supported: openai", other),
    }
}

fn create_completion_provider(config: &Config, model: &str) -> Result<Arc<dyn CompletionProvider>> {
    Ok(Arc::new(OpenAICompletionProvider::new(&config.completion, model)?))
}

/// Reranker if a completion key is configured. Without one, recommendations use hybrid mode.
fn create_reranker(config: &Config) -> Option<LlmReranker> {
    match create_completion_provider(config, &config.completion.rerank_model) {
        Ok(provider) => Some(LlmReranker::new(provider, RetryPolicy::from(&config.retry))),
        Err(e) => {
            tracing::warn!(error = %e, "Completion provider unavailable, LLM re-ranking disabled");
            None
        }
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{pos}/{len}] enriching job postings [{elapsed_precise} / {eta_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let config = Config::load()?;

    // 3. Initialize logging before any other output; stdout carries results only
    logging::init_logging(&config);

    let run_migrations = !cli.skip_migrate || matches!(cli.command, Commands::Migrate);
    let store: Arc<dyn RecommendationStore> = Arc::new(PostgresStore::new(&config.database_url, run_migrations).await?);
    let dimension = config.embedding.dimension;

    match cli.command {
        Commands::Migrate => {
            println!("Migrations completed successfully.");
        }

        Commands::Recommend { user, mode } => {
            let recommender = Recommender::new(
                store,
                dimension,
                config.recommendation.clone(),
                create_reranker(&config),
            );
            let service = MatchService::new(recommender);
            let outcome = match mode {
                Some(mode) => service.get_recommendations_with_mode(&user, mode).await,
                None => service.get_recommendations(&user).await,
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Feedback { user, job, liked } => {
            let feedback = FeedbackService::new(store).submit_feedback(&user, &job, liked).await?;
            println!("{}", serde_json::to_string_pretty(&feedback)?);
        }

        Commands::Profile { user, file } => {
            let raw = std::fs::read_to_string(&file)?;
            let mut profile: UserProfile = serde_json::from_str(&raw)?;
            profile.user_id = user;

            let service = ProfileService::new(
                store,
                create_embedding_provider(&config)?,
                dimension,
                RetryPolicy::from(&config.retry),
            );
            service.save_profile(&profile).await?;
            println!("Stored profile for {}", profile.user_id);
        }

        Commands::Enrich => {
            let retry = RetryPolicy::from(&config.retry);
            let analyzer = JobAnalyzer::new(
                create_completion_provider(&config, &config.completion.analysis_model)?,
                create_embedding_provider(&config)?,
                retry,
                config.enrichment.max_job_text_chars,
            );
            let enricher = Enricher::new(store, dimension, Arc::new(analyzer), config.enrichment.clone());
            let report = enricher.run(&progress_bar()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Liked { user } => {
            let jobs = FeedbackService::new(store).liked_jobs(&user).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
    }

    Ok(())
}
