//! Repository for the `translation_chunks` table.
//!
//! Transitions are last-writer-wins single-row updates. The queue hands a
//! chunk id to one worker per pop, so concurrent writers on the same row
//! only occur after a redundant delivery; the `done` guard below makes
//! those harmless.

use std::time::Duration;

use giga_core::status::{ChunkAggregate, ChunkStatus};
use giga_core::types::DbId;
use sqlx::PgPool;

use crate::models::chunk::{Chunk, ChunkBacklog, ChunkWork, FailedAttempt, RecoveredChunk};

/// Column list for `translation_chunks` queries.
const COLUMNS: &str = "\
    id, job_id, chunk_index, source_text, translated_text, status, \
    attempts, max_attempts, last_error, started_at, finished_at, updated_at";

/// `last_error` written on chunks reclaimed from a vanished worker.
pub const RECOVERED_ERROR: &str = "Recovered after worker interruption";

/// Provides lookups and state transitions for translation chunks.
pub struct ChunkRepo;

impl ChunkRepo {
    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find a chunk by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Chunk>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM translation_chunks WHERE id = $1");
        sqlx::query_as::<_, Chunk>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a chunk joined with its job's `target_lang`.
    pub async fn find_work(pool: &PgPool, id: DbId) -> Result<Option<ChunkWork>, sqlx::Error> {
        sqlx::query_as::<_, ChunkWork>(
            "SELECT c.id, c.job_id, c.chunk_index, c.source_text, c.status, \
                    c.attempts, c.max_attempts, j.target_lang \
             FROM translation_chunks c \
             JOIN translation_jobs j ON j.id = c.job_id \
             WHERE c.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List a job's chunks in `chunk_index` order.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Chunk>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM translation_chunks WHERE job_id = $1 ORDER BY chunk_index"
        );
        sqlx::query_as::<_, Chunk>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Store-wide count of `queued` and `running` chunks.
    pub async fn backlog(pool: &PgPool) -> Result<ChunkBacklog, sqlx::Error> {
        sqlx::query_as::<_, ChunkBacklog>(
            "SELECT \
                 COUNT(*) FILTER (WHERE status = $1) AS queued, \
                 COUNT(*) FILTER (WHERE status = $2) AS running \
             FROM translation_chunks",
        )
        .bind(ChunkStatus::Queued.as_str())
        .bind(ChunkStatus::Running.as_str())
        .fetch_one(pool)
        .await
    }

    /// Chunk counts used to derive the job status.
    pub async fn aggregate_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<ChunkAggregate, sqlx::Error> {
        let (total, done, permanently_failed, active): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*), \
                 COUNT(*) FILTER (WHERE status = 'done'), \
                 COUNT(*) FILTER (WHERE status = 'failed' AND attempts >= max_attempts), \
                 COUNT(*) FILTER (WHERE status IN ('queued', 'running')) \
             FROM translation_chunks \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(pool)
        .await?;

        Ok(ChunkAggregate {
            total,
            done,
            permanently_failed,
            active,
        })
    }

    /// Translated texts in `chunk_index` order. Chunks without a
    /// translation yield `None`.
    pub async fn translations_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<Option<String>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<String>>(
            "SELECT translated_text FROM translation_chunks \
             WHERE job_id = $1 ORDER BY chunk_index",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    /// Ids of every `queued` chunk, oldest job first, then `chunk_index`.
    pub async fn list_queued_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT c.id FROM translation_chunks c \
             JOIN translation_jobs j ON j.id = c.job_id \
             WHERE c.status = $1 \
             ORDER BY j.created_at, c.job_id, c.chunk_index",
        )
        .bind(ChunkStatus::Queued.as_str())
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// `queued -> running`: increment `attempts` and stamp `started_at`.
    ///
    /// Does nothing for a chunk that is already terminal (`done`, or
    /// `failed` with no attempts left) and returns `None` in that case.
    pub async fn mark_running(pool: &PgPool, id: DbId) -> Result<Option<Chunk>, sqlx::Error> {
        let query = format!(
            "UPDATE translation_chunks \
             SET status = $2, attempts = attempts + 1, started_at = NOW(), \
                 finished_at = NULL, updated_at = NOW() \
             WHERE id = $1 \
               AND status <> $3 \
               AND NOT (status = $4 AND attempts >= max_attempts) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Chunk>(&query)
            .bind(id)
            .bind(ChunkStatus::Running.as_str())
            .bind(ChunkStatus::Done.as_str())
            .bind(ChunkStatus::Failed.as_str())
            .fetch_optional(pool)
            .await
    }

    /// `running -> done`: write the translation and `finished_at`.
    ///
    /// `translated_text` is written at most once: returns `false` without
    /// touching the row if the chunk is already `done`.
    pub async fn mark_done(
        pool: &PgPool,
        id: DbId,
        translated_text: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE translation_chunks \
             SET status = $2, translated_text = $3, finished_at = NOW(), \
                 last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status <> $2",
        )
        .bind(id)
        .bind(ChunkStatus::Done.as_str())
        .bind(translated_text)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `running -> failed`: record the error and read back the attempt
    /// counters used for the retry decision.
    ///
    /// Returns `None` if the chunk is already `done` (a redundant attempt
    /// lost the race) or does not exist.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<Option<FailedAttempt>, sqlx::Error> {
        sqlx::query_as::<_, FailedAttempt>(
            "UPDATE translation_chunks \
             SET status = $2, last_error = $3, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status <> $4 \
             RETURNING job_id, attempts, max_attempts",
        )
        .bind(id)
        .bind(ChunkStatus::Failed.as_str())
        .bind(error)
        .bind(ChunkStatus::Done.as_str())
        .fetch_optional(pool)
        .await
    }

    /// `failed -> queued`: clear `started_at` so the chunk can be picked up
    /// again.
    pub async fn requeue(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE translation_chunks \
             SET status = $2, started_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(ChunkStatus::Queued.as_str())
        .bind(ChunkStatus::Failed.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Reclaim every `running` chunk whose `started_at` is older than
    /// `stale_after`.
    ///
    /// A chunk with attempts left goes back to `queued`; one that has used
    /// its last attempt becomes `failed`. Both get [`RECOVERED_ERROR`].
    /// A single conditional `UPDATE ... RETURNING`, so concurrent sweeps
    /// from several processes each reclaim a disjoint set of rows.
    pub async fn recover_stale(
        pool: &PgPool,
        stale_after: Duration,
    ) -> Result<Vec<RecoveredChunk>, sqlx::Error> {
        sqlx::query_as::<_, RecoveredChunk>(
            "UPDATE translation_chunks \
             SET status = CASE WHEN attempts >= max_attempts THEN $5 ELSE $1 END, \
                 started_at = CASE WHEN attempts >= max_attempts THEN started_at END, \
                 finished_at = CASE WHEN attempts >= max_attempts THEN NOW() END, \
                 last_error = $2, updated_at = NOW() \
             WHERE status = $3 \
               AND started_at < NOW() - make_interval(secs => $4) \
             RETURNING id, job_id, status, attempts",
        )
        .bind(ChunkStatus::Queued.as_str())
        .bind(RECOVERED_ERROR)
        .bind(ChunkStatus::Running.as_str())
        .bind(stale_after.as_secs_f64())
        .bind(ChunkStatus::Failed.as_str())
        .fetch_all(pool)
        .await
    }

    /// `failed -> queued` for chunks that still have attempts left but sat
    /// untouched for longer than `idle_for`: their worker stopped between
    /// recording the failure and requeueing.
    pub async fn reclaim_failed(
        pool: &PgPool,
        idle_for: Duration,
    ) -> Result<Vec<RecoveredChunk>, sqlx::Error> {
        sqlx::query_as::<_, RecoveredChunk>(
            "UPDATE translation_chunks \
             SET status = $1, started_at = NULL, updated_at = NOW() \
             WHERE status = $2 \
               AND attempts < max_attempts \
               AND updated_at < NOW() - make_interval(secs => $3) \
             RETURNING id, job_id, status, attempts",
        )
        .bind(ChunkStatus::Queued.as_str())
        .bind(ChunkStatus::Failed.as_str())
        .bind(idle_for.as_secs_f64())
        .fetch_all(pool)
        .await
    }

    /// `queued` chunks not updated for longer than `idle_for`, oldest first.
    pub async fn list_idle_queued(
        pool: &PgPool,
        idle_for: Duration,
    ) -> Result<Vec<RecoveredChunk>, sqlx::Error> {
        sqlx::query_as::<_, RecoveredChunk>(
            "SELECT id, job_id, status, attempts FROM translation_chunks \
             WHERE status = $1 \
               AND updated_at < NOW() - make_interval(secs => $2) \
             ORDER BY updated_at, chunk_index",
        )
        .bind(ChunkStatus::Queued.as_str())
        .bind(idle_for.as_secs_f64())
        .fetch_all(pool)
        .await
    }
}
