/// Batch enrichment of job postings missing embeddings.
///
/// Postings are chunked into batches of `batch_size`. At most `max_concurrent_batches`
/// batches are in flight (semaphore permits), and within a batch every posting is
/// analyzed concurrently. A batch is written in one transaction after all of its
/// postings succeed, followed by a fixed pause while the permit is still held.
/// A failed batch leaves already-committed batches untouched.
///
/// After a run with failures the whole run is repeated after each configured delay.
/// Each re-run only sees postings that are still missing embeddings.

use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::JobAnalyzer;
use crate::config::EnrichmentConfig;
use crate::embedding::store::EmbeddingStore;
use crate::errors::MatchError;
use crate::store::{JobText, RecommendationStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    /// Full runs performed, including re-runs
    pub runs: usize,
    /// Postings whose embeddings were written
    pub enriched: usize,
    /// Batches that failed in the last run
    pub failed_batches: usize,
    /// Postings still missing embeddings afterwards
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct RunOutcome {
    enriched: usize,
    failed_batches: usize,
}

#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn RecommendationStore>,
    embeddings: EmbeddingStore,
    analyzer: Arc<JobAnalyzer>,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        dimension: usize,
        analyzer: Arc<JobAnalyzer>,
        config: EnrichmentConfig,
    ) -> Self {
        Enricher {
            embeddings: EmbeddingStore::new(store.clone(), dimension),
            store,
            analyzer,
            config,
        }
    }

    /// Enrich every posting missing embeddings, re-running after failures.
    pub async fn run(&self, progress: &ProgressBar) -> Result<EnrichmentReport, MatchError> {
        let mut report = EnrichmentReport::default();
        let mut rerun_delays = self.config.rerun_delays_ms.iter();

        loop {
            report.runs += 1;
            let failure = match self.run_once(progress).await {
                Ok(outcome) => {
                    report.enriched += outcome.enriched;
                    report.failed_batches = outcome.failed_batches;
                    (outcome.failed_batches > 0).then(|| {
                        MatchError::Internal(format!("{} batches failed", outcome.failed_batches))
                    })
                }
                Err(e) => Some(e),
            };

            let Some(error) = failure else { break };
            match rerun_delays.next() {
                Some(&delay_ms) => {
                    tracing::warn!(run = report.runs, delay_ms, error = %error, "Enrichment run incomplete, re-running");
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                None => {
                    if report.failed_batches == 0 {
                        // The run itself failed (e.g. the store was unreachable)
                        return Err(error);
                    }
                    tracing::error!(runs = report.runs, error = %error, "Enrichment gave up with failed batches");
                    break;
                }
            }
        }

        report.remaining = self.store.jobs_missing_embeddings(usize::MAX).await?.len();
        progress.finish_and_clear();
        tracing::info!(
            runs = report.runs,
            enriched = report.enriched,
            failed_batches = report.failed_batches,
            remaining = report.remaining,
            "Enrichment finished"
        );
        Ok(report)
    }

    async fn run_once(&self, progress: &ProgressBar) -> Result<RunOutcome, MatchError> {
        let jobs = self.store.jobs_missing_embeddings(usize::MAX).await?;
        if jobs.is_empty() {
            tracing::info!("All job postings have embeddings");
            return Ok(RunOutcome::default());
        }

        tracing::info!(total = jobs.len(), batch_size = self.config.batch_size, "Enriching job postings");
        progress.set_length(jobs.len() as u64);
        progress.set_position(0);

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let mut batches = JoinSet::new();

        for batch in jobs.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let permits = Arc::clone(&permits);
            let this = self.clone();
            let progress = progress.clone();

            batches.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| MatchError::Internal(format!("Batch limiter closed: {}", e)))?;
                let first_id = batch.first().map(|j| j.id.clone()).unwrap_or_default();
                match this.process_batch(batch).await {
                    Ok(written) => {
                        progress.inc(written as u64);
                        Ok(written)
                    }
                    Err(e) => {
                        tracing::warn!(first_job_id = %first_id, error = %e, "Enrichment batch failed");
                        Err(e)
                    }
                }
            });
        }

        let mut outcome = RunOutcome::default();
        while let Some(joined) = batches.join_next().await {
            match joined {
                Ok(Ok(written)) => outcome.enriched += written,
                Ok(Err(_)) => outcome.failed_batches += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Enrichment batch task panicked");
                    outcome.failed_batches += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Enrich all postings of one batch concurrently, then write them atomically.
    async fn process_batch(&self, batch: Vec<JobText>) -> Result<usize, MatchError> {
        let mut tasks = JoinSet::new();
        for job in batch {
            let analyzer = Arc::clone(&self.analyzer);
            tasks.spawn(async move { analyzer.enrich(&job).await });
        }

        let mut updates = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let update = joined.map_err(|e| MatchError::Internal(format!("Enrichment task failed: {}", e)))??;
            updates.push(update);
        }
        updates.sort_by(|a, b| a.job_id.cmp(&b.job_id));

        self.embeddings.write_job_batch(&updates).await?;
        tracing::debug!(
            job_ids = ?updates.iter().map(|u| u.job_id.as_str()).collect::<Vec<_>>(),
            "Committed enrichment batch"
        );

        tokio::time::sleep(self.config.batch_delay()).await;
        Ok(updates.len())
    }
}
