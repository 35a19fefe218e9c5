use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use giga_core::chunking::{TextSplitter, DEFAULT_CHUNK_SIZE};
use giga_core::error::CoreError;
use giga_core::job_events::JobEvent;
use giga_core::status::{derive_job_status, ChunkAggregate, ChunkStatus, JobStatus};
use giga_core::types::{new_id, DbId};
use giga_core::validation::{validate_chunk_size, validate_source_text, validate_target_lang};
use giga_db::models::job::{CreateJob, JobWithCounts};
use giga_db::repositories::{ChunkRepo, JobRepo};
use giga_queue::WorkQueue;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::PipelineError;

/// Default staleness window for `running` chunks.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Default per-chunk attempt ceiling.
const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Tunables fixed when the service is built.
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// A `running` chunk older than this is presumed abandoned.
    pub stale_after: Duration,
    /// `max_attempts` written on every new chunk.
    pub max_attempts: i32,
    /// Chunk size used when the caller does not pass one.
    pub default_chunk_size: usize,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A job plus its reassembled translation, present only once it is `done`.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job: JobWithCounts,
    pub text: Option<String>,
}

/// What one [`JobService::recover_stale_chunks`] sweep reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Stale `running` chunks put back in the queue.
    pub stale_requeued: usize,
    /// Stale `running` chunks that had used their last attempt.
    pub stale_failed: usize,
    /// Retryable `failed` chunks nobody requeued.
    pub failed_requeued: usize,
    /// `queued` chunks that had lost their queue entry.
    pub orphans_enqueued: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.stale_requeued + self.stale_failed + self.failed_requeued + self.orphans_enqueued
    }
}

/// Outcome of [`JobService::recalculate_job_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub error: Option<&'static str>,
    pub counts: ChunkAggregate,
}

/// Orchestrates job creation, status derivation and stale recovery.
#[derive(Clone)]
pub struct JobService {
    pool: PgPool,
    queue: Arc<dyn WorkQueue>,
    splitter: Arc<dyn TextSplitter>,
    config: JobServiceConfig,
}

impl JobService {
    pub fn new(
        pool: PgPool,
        queue: Arc<dyn WorkQueue>,
        splitter: Arc<dyn TextSplitter>,
        config: JobServiceConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            splitter,
            config,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    pub fn config(&self) -> &JobServiceConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Split `text`, persist the job with its chunks, and enqueue every
    /// chunk in index order.
    ///
    /// Nothing is persisted when validation fails. If enqueueing fails part
    /// way, the job exists with its chunks `queued` and the error is
    /// returned; [`requeue_pending`](Self::requeue_pending) picks them up.
    pub async fn create_job(
        &self,
        text: &str,
        target_lang: &str,
        chunk_size: Option<usize>,
    ) -> Result<DbId, PipelineError> {
        validate_source_text(text)?;
        validate_target_lang(target_lang)?;
        if let Some(size) = chunk_size {
            validate_chunk_size(size)?;
        }

        let size = chunk_size.unwrap_or(self.config.default_chunk_size);
        let mut chunks = self.splitter.split(text, size);
        if chunks.is_empty() {
            chunks.push(String::new());
        }

        let input = CreateJob {
            id: new_id(),
            source_text: text.to_string(),
            target_lang: target_lang.to_string(),
            chunks,
            max_attempts: self.config.max_attempts,
        };
        let (job, chunk_ids) = JobRepo::create_with_chunks(&self.pool, &input).await?;

        for chunk_id in &chunk_ids {
            self.queue.enqueue(*chunk_id).await?;
        }

        self.queue
            .publish(job.id, &JobEvent::JobCreated { status: job.status })
            .await?;

        tracing::info!(
            job_id = %job.id,
            target_lang = %job.target_lang,
            chunk_count = chunk_ids.len(),
            "Translation job created",
        );

        Ok(job.id)
    }

    /// Derive the job status from its chunks, persist it, and publish a
    /// `job_status` event. Repeated calls without intervening chunk
    /// transitions yield the same snapshot.
    pub async fn recalculate_job_status(
        &self,
        job_id: DbId,
    ) -> Result<StatusSnapshot, PipelineError> {
        let counts = ChunkRepo::aggregate_for_job(&self.pool, job_id).await?;
        let derived = derive_job_status(&counts);

        let updated =
            JobRepo::update_status(&self.pool, job_id, derived.status, derived.error).await?;
        if !updated {
            return Err(CoreError::NotFound {
                entity: "TranslationJob",
                id: job_id,
            }
            .into());
        }

        self.queue
            .publish(
                job_id,
                &JobEvent::JobStatus {
                    status: derived.status,
                    error: derived.error.map(str::to_string),
                    counts,
                },
            )
            .await?;

        tracing::debug!(
            %job_id,
            status = %derived.status,
            total = counts.total,
            done = counts.done,
            active = counts.active,
            "Job status recalculated",
        );

        Ok(StatusSnapshot {
            status: derived.status,
            error: derived.error,
            counts,
        })
    }

    /// Reclaim chunks a vanished worker left behind, then recompute the
    /// affected jobs. Three passes, all bounded by the staleness window:
    ///
    /// 1. `running` chunks past the window go back to `queued`, or to
    ///    `failed` when that run was their last attempt.
    /// 2. `failed` chunks with attempts left that were never requeued go
    ///    back to `queued`.
    /// 3. `queued` chunks idle past the window with no queue entry are
    ///    enqueued again.
    pub async fn recover_stale_chunks(&self) -> Result<RecoveryReport, PipelineError> {
        let stale_after = self.config.stale_after;
        let mut report = RecoveryReport::default();
        let mut jobs = HashSet::new();

        for chunk in ChunkRepo::recover_stale(&self.pool, stale_after).await? {
            jobs.insert(chunk.job_id);
            if chunk.status == ChunkStatus::Failed {
                report.stale_failed += 1;
                self.queue
                    .publish(
                        chunk.job_id,
                        &JobEvent::ChunkFailed {
                            chunk_id: chunk.id,
                            attempts: chunk.attempts,
                        },
                    )
                    .await?;
            } else {
                report.stale_requeued += 1;
                self.queue.enqueue(chunk.id).await?;
            }
        }

        for chunk in ChunkRepo::reclaim_failed(&self.pool, stale_after).await? {
            jobs.insert(chunk.job_id);
            report.failed_requeued += 1;
            self.queue.enqueue(chunk.id).await?;
        }

        let idle = ChunkRepo::list_idle_queued(&self.pool, stale_after).await?;
        if !idle.is_empty() {
            let ids: Vec<DbId> = idle.iter().map(|c| c.id).collect();
            for chunk_id in self.queue.not_enqueued(&ids).await? {
                report.orphans_enqueued += 1;
                self.queue.enqueue(chunk_id).await?;
            }
        }

        for job_id in jobs {
            self.recalculate_job_status(job_id).await?;
        }

        if report.total() > 0 {
            tracing::warn!(
                stale_requeued = report.stale_requeued,
                stale_failed = report.stale_failed,
                failed_requeued = report.failed_requeued,
                orphans_enqueued = report.orphans_enqueued,
                stale_after_secs = stale_after.as_secs(),
                "Recovered abandoned chunks",
            );
        }
        Ok(report)
    }

    /// Enqueue every chunk the store holds as `queued`.
    ///
    /// Rebuilds a volatile queue after a restart. May produce redundant
    /// deliveries on a durable queue, which workers tolerate.
    pub async fn requeue_pending(&self) -> Result<usize, PipelineError> {
        let pending = ChunkRepo::list_queued_ids(&self.pool).await?;
        for chunk_id in &pending {
            self.queue.enqueue(*chunk_id).await?;
        }
        if !pending.is_empty() {
            tracing::info!(requeued = pending.len(), "Requeued pending chunks");
        }
        Ok(pending.len())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Fetch a job with its chunk counts.
    pub async fn get_job(&self, job_id: DbId) -> Result<JobWithCounts, PipelineError> {
        JobRepo::find_with_counts(&self.pool, job_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "TranslationJob",
                    id: job_id,
                }
                .into()
            })
    }

    /// Fetch a job and, when it is `done`, its chunk translations joined
    /// in `chunk_index` order.
    pub async fn get_job_result(&self, job_id: DbId) -> Result<JobResult, PipelineError> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Done {
            return Ok(JobResult { job, text: None });
        }

        let text: String = ChunkRepo::translations_for_job(&self.pool, job_id)
            .await?
            .into_iter()
            .flatten()
            .collect();
        Ok(JobResult {
            job,
            text: Some(text),
        })
    }
}
