//! Repository for the `translation_jobs` table.

use giga_core::status::{ChunkStatus, JobStatus};
use giga_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobWithCounts};

/// Column list for `translation_jobs` queries.
const COLUMNS: &str = "id, status, source_text, target_lang, error, created_at, updated_at";

/// Provides creation, lookup and status writes for translation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a job and all of its chunks in one transaction.
    ///
    /// Chunks are created `queued` with `chunk_index` following the order
    /// of `input.chunks`. Returns the job row and the chunk ids in index
    /// order. Nothing is written if any insert fails.
    pub async fn create_with_chunks(
        pool: &PgPool,
        input: &CreateJob,
    ) -> Result<(Job, Vec<DbId>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO translation_jobs (id, status, source_text, target_lang) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(input.id)
            .bind(JobStatus::Queued.as_str())
            .bind(&input.source_text)
            .bind(&input.target_lang)
            .fetch_one(&mut *tx)
            .await?;

        let mut chunk_ids = Vec::with_capacity(input.chunks.len());
        for (index, text) in input.chunks.iter().enumerate() {
            let chunk_id = new_id();
            sqlx::query(
                "INSERT INTO translation_chunks \
                     (id, job_id, chunk_index, source_text, status, max_attempts) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(chunk_id)
            .bind(job.id)
            .bind(index as i32)
            .bind(text)
            .bind(ChunkStatus::Queued.as_str())
            .bind(input.max_attempts)
            .execute(&mut *tx)
            .await?;
            chunk_ids.push(chunk_id);
        }

        tx.commit().await?;
        Ok((job, chunk_ids))
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM translation_jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job together with its chunk counts.
    ///
    /// `failed_chunks` counts every chunk currently in `failed`, whether or
    /// not it still has attempts left.
    pub async fn find_with_counts(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<JobWithCounts>, sqlx::Error> {
        sqlx::query_as::<_, JobWithCounts>(
            "SELECT \
                 j.id, j.status, j.target_lang, j.error, j.created_at, j.updated_at, \
                 COUNT(c.id) AS total_chunks, \
                 COUNT(c.id) FILTER (WHERE c.status = 'done') AS completed_chunks, \
                 COUNT(c.id) FILTER (WHERE c.status = 'failed') AS failed_chunks, \
                 COUNT(c.id) FILTER (WHERE c.status IN ('queued', 'running')) AS active_chunks \
             FROM translation_jobs j \
             LEFT JOIN translation_chunks c ON c.job_id = j.id \
             WHERE j.id = $1 \
             GROUP BY j.id",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Write a recomputed status and error, bumping `updated_at`.
    ///
    /// Returns `false` if the job does not exist.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE translation_jobs \
             SET status = $2, error = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
