/// PostgreSQL-backed implementation of RecommendationStore
///
/// Uses sqlx with PgPool for connection pooling and pgvector for the embedding columns.
/// Embeddings are read back as `::text` and coerced, so the read path does not depend
/// on how the column was populated.
/// Supports optional migration execution on startup.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Row,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::embedding::EmbeddingPair;
use crate::errors::MatchError;
use crate::store::{
    CandidateQuery, Experience, Feedback, JobEmbeddingRow, JobEmbeddingUpdate, JobPosting, JobText, RawEmbeddings,
    RecommendationStore, ScoredJob, UserProfile,
};
use crate::vector::narrow;

const JOB_COLUMNS: &str = "id, title, location, compensation, summary, posting_url";

/// PostgreSQL-backed recommendation store using sqlx connection pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgresStore, connecting to the PostgreSQL database at database_url.
    ///
    /// If run_migrations is true, automatically runs pending migrations on startup.
    pub async fn new(database_url: &str, run_migrations: bool) -> Result<Self, MatchError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| MatchError::Storage(format!("Failed to connect to database: {}", e)))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| MatchError::Storage(format!("Migration failed: {}", e)))?;
        }

        Ok(PostgresStore { pool })
    }

    /// Return the underlying PgPool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_vector(v: &[f64]) -> Vector {
    Vector::from(narrow(v))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Stored vector text into the raw form accepted by `coerce_to_vector`.
fn raw_embedding(row: &PgRow, column: &str) -> Result<Option<serde_json::Value>, MatchError> {
    let text: Option<String> = row.try_get(column)?;
    Ok(text.map(serde_json::Value::String))
}

fn row_to_job(row: &PgRow) -> Result<JobPosting, MatchError> {
    Ok(JobPosting {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        location: row.try_get("location")?,
        compensation: row.try_get("compensation")?,
        summary: row.try_get("summary")?,
        posting_url: row.try_get("posting_url")?,
    })
}

/// Experience is stored as a JSON array. Older rows keyed by position are accepted too.
fn parse_experience(value: serde_json::Value) -> Result<Vec<Experience>, MatchError> {
    let items = match value {
        serde_json::Value::Object(map) => serde_json::Value::Array(map.into_iter().map(|(_, v)| v).collect()),
        other => other,
    };
    serde_json::from_value(items).map_err(|e| MatchError::Storage(format!("Invalid experience JSON: {}", e)))
}

fn row_to_profile(row: &PgRow) -> Result<UserProfile, MatchError> {
    let career_level: String = row.try_get("career_level")?;
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        skills: row.try_get("skills")?,
        experience: parse_experience(row.try_get("experience")?)?,
        total_experience_years: row.try_get("total_experience_years")?,
        career_level: career_level.parse().map_err(MatchError::Storage)?,
        category: row.try_get("category")?,
        summary: row.try_get("summary")?,
    })
}

fn row_to_feedback(row: &PgRow) -> Result<Feedback, MatchError> {
    Ok(Feedback {
        user_id: row.try_get("user_id")?,
        job_id: row.try_get("job_id")?,
        liked: row.try_get("liked")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecommendationStore for PostgresStore {
    async fn upsert_profile(&self, profile: &UserProfile, embeddings: &EmbeddingPair) -> Result<(), MatchError> {
        let experience = serde_json::to_value(&profile.experience)
            .map_err(|e| MatchError::Storage(format!("Failed to encode experience: {}", e)))?;

        sqlx::query(
            "INSERT INTO user_profile \
             (user_id, skills, experience, total_experience_years, career_level, category, summary, \
              skill_embedding, summary_embedding, updated_at) \
             VALUES ($1, $2, $3, $4::numeric, $5, $6, $7, $8, $9, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET \
               skills = EXCLUDED.skills, \
               experience = EXCLUDED.experience, \
               total_experience_years = EXCLUDED.total_experience_years, \
               career_level = EXCLUDED.career_level, \
               category = EXCLUDED.category, \
               summary = EXCLUDED.summary, \
               skill_embedding = EXCLUDED.skill_embedding, \
               summary_embedding = EXCLUDED.summary_embedding, \
               updated_at = NOW()",
        )
        .bind(&profile.user_id)
        .bind(&profile.skills)
        .bind(&experience)
        .bind(profile.total_experience_years)
        .bind(profile.career_level.to_string())
        .bind(&profile.category)
        .bind(&profile.summary)
        .bind(to_vector(&embeddings.skill))
        .bind(to_vector(&embeddings.summary))
        .execute(&self.pool)
        .await
        .map_err(|e| MatchError::Storage(format!("Failed to store profile: {}", e)))?;

        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, MatchError> {
        let row = sqlx::query(
            "SELECT user_id, skills, experience, total_experience_years::float8 AS total_experience_years, \
             career_level, category, summary \
             FROM user_profile WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn profile_embeddings(&self, user_id: &str) -> Result<Option<RawEmbeddings>, MatchError> {
        let row = sqlx::query(
            "SELECT skill_embedding::text AS skill_embedding, summary_embedding::text AS summary_embedding \
             FROM user_profile WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(RawEmbeddings {
                skill: raw_embedding(&row, "skill_embedding")?,
                summary: raw_embedding(&row, "summary_embedding")?,
            })),
        }
    }

    async fn job_embeddings(&self, job_ids: &[String]) -> Result<Vec<JobEmbeddingRow>, MatchError> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, skill_embedding::text AS skill_embedding, summary_embedding::text AS summary_embedding \
             FROM job_postings \
             WHERE id = ANY($1) AND skill_embedding IS NOT NULL AND summary_embedding IS NOT NULL \
             ORDER BY id",
        )
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<JobEmbeddingRow, MatchError> {
                Ok(JobEmbeddingRow {
                    job_id: row.try_get("id")?,
                    embeddings: RawEmbeddings {
                        skill: raw_embedding(row, "skill_embedding")?,
                        summary: raw_embedding(row, "summary_embedding")?,
                    },
                })
            })
            .collect()
    }

    async fn nearest_jobs(&self, query: &CandidateQuery) -> Result<Vec<ScoredJob>, MatchError> {
        let exclude: Vec<String> = query.exclude_ids.iter().cloned().collect();

        let sql = format!(
            "SELECT {JOB_COLUMNS}, \
               ($1 * (summary_embedding <-> $2) + $3 * (skill_embedding <-> $4))::float8 AS distance \
             FROM job_postings \
             WHERE summary_embedding IS NOT NULL AND skill_embedding IS NOT NULL \
               AND NOT (id = ANY($5)) \
             ORDER BY distance ASC, id ASC \
             LIMIT $6"
        );

        let rows = sqlx::query(&sql)
            .bind(query.summary_weight)
            .bind(to_vector(&query.summary))
            .bind(query.skill_weight)
            .bind(to_vector(&query.skill))
            .bind(&exclude)
            .bind(limit_param(query.k))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MatchError::Storage(format!("Nearest job query failed: {}", e)))?;

        rows.iter()
            .map(|row| -> Result<ScoredJob, MatchError> {
                Ok(ScoredJob {
                    job: row_to_job(row)?,
                    distance: row.try_get("distance")?,
                })
            })
            .collect()
    }

    async fn jobs_by_ids(&self, job_ids: &[String]) -> Result<Vec<JobPosting>, MatchError> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {JOB_COLUMNS} FROM job_postings WHERE id = ANY($1) ORDER BY id");
        let rows = sqlx::query(&sql).bind(job_ids).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn unrated_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<JobPosting>, MatchError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM job_postings \
             WHERE id NOT IN (SELECT job_id FROM user_job_feedback WHERE user_id = $1) \
             ORDER BY id LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn upsert_feedback(&self, user_id: &str, job_id: &str, liked: bool) -> Result<Feedback, MatchError> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO user_job_feedback (user_id, job_id, liked, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, job_id) DO UPDATE SET liked = EXCLUDED.liked, created_at = EXCLUDED.created_at \
             RETURNING user_id, job_id, liked, created_at",
        )
        .bind(user_id)
        .bind(job_id)
        .bind(liked)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let unknown_job = e
                .as_database_error()
                .map(|db| db.is_foreign_key_violation())
                .unwrap_or(false);
            if unknown_job {
                MatchError::validation("job_id", &format!("Unknown job id: {}", job_id))
            } else {
                MatchError::Storage(format!("Failed to store feedback: {}", e))
            }
        })?;

        row_to_feedback(&row)
    }

    async fn feedback_for_user(&self, user_id: &str) -> Result<Vec<Feedback>, MatchError> {
        let rows = sqlx::query(
            "SELECT user_id, job_id, liked, created_at FROM user_job_feedback \
             WHERE user_id = $1 ORDER BY created_at, job_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }

    async fn like_counts(&self, job_ids: &[String]) -> Result<HashMap<String, u64>, MatchError> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT job_id, COUNT(*) AS likes FROM user_job_feedback \
             WHERE liked AND job_id = ANY($1) GROUP BY job_id",
        )
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            let job_id: String = row.try_get("job_id")?;
            let likes: i64 = row.try_get("likes")?;
            counts.insert(job_id, likes.max(0) as u64);
        }
        Ok(counts)
    }

    async fn jobs_missing_embeddings(&self, limit: usize) -> Result<Vec<JobText>, MatchError> {
        let rows = sqlx::query(
            "SELECT id, title, text FROM job_postings \
             WHERE skill_embedding IS NULL OR summary_embedding IS NULL \
             ORDER BY id LIMIT $1",
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<JobText, MatchError> {
                Ok(JobText {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    text: row.try_get("text")?,
                })
            })
            .collect()
    }

    async fn store_job_embeddings(&self, batch: &[JobEmbeddingUpdate]) -> Result<(), MatchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MatchError::Storage(format!("Failed to begin transaction: {}", e)))?;

        for update in batch {
            let result = sqlx::query(
                "UPDATE job_postings SET skill_embedding = $1, summary_embedding = $2 WHERE id = $3",
            )
            .bind(to_vector(&update.embeddings.skill))
            .bind(to_vector(&update.embeddings.summary))
            .bind(&update.job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| MatchError::Storage(format!("Failed to store embeddings for job {}: {}", update.job_id, e)))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the batch
                return Err(MatchError::Storage(format!("Job not found: {}", update.job_id)));
            }
        }

        tx.commit()
            .await
            .map_err(|e| MatchError::Storage(format!("Failed to commit embedding batch: {}", e)))?;

        tracing::debug!(jobs = batch.len(), "Stored job embedding batch");
        Ok(())
    }
}
