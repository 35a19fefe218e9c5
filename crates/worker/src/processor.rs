//! One attempt on one chunk.
//!
//! ```text
//! queued --dequeue--> running --ok--> done
//!                        |
//!                        +--err, attempts < max--> queued (re-enqueued)
//!                        +--err, attempts >= max--> failed (terminal)
//! ```
//!
//! Redundant deliveries are absorbed here: a chunk that is already
//! terminal when it is picked up, or that another attempt finished first,
//! is skipped without touching the store.

use std::sync::Arc;

use giga_core::job_events::JobEvent;
use giga_core::status::{is_terminal, should_retry};
use giga_core::translator::Translator;
use giga_core::types::DbId;
use giga_db::repositories::ChunkRepo;
use giga_pipeline::{JobService, PipelineError};

/// What [`ChunkWorker::process_chunk`] did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Unknown, already terminal, or finished by a concurrent attempt.
    Skipped,
    Done,
    /// Failed and went back to the queue.
    Retried { attempts: i32 },
    /// Failed with no attempts left.
    Failed { attempts: i32 },
}

/// Runs chunk attempts against the store, queue and translator.
pub struct ChunkWorker {
    service: JobService,
    translator: Arc<dyn Translator>,
}

impl ChunkWorker {
    pub fn new(service: JobService, translator: Arc<dyn Translator>) -> Self {
        Self {
            service,
            translator,
        }
    }

    pub fn service(&self) -> &JobService {
        &self.service
    }

    /// Process one delivery of `chunk_id`.
    ///
    /// Translation failures are recorded on the chunk and never returned;
    /// only store and queue failures surface as `Err`.
    pub async fn process_chunk(&self, chunk_id: DbId) -> Result<ChunkOutcome, PipelineError> {
        let pool = self.service.pool();

        let Some(work) = ChunkRepo::find_work(pool, chunk_id).await? else {
            tracing::warn!(%chunk_id, "Dequeued unknown chunk, dropping");
            return Ok(ChunkOutcome::Skipped);
        };
        if is_terminal(work.status, work.attempts, work.max_attempts) {
            tracing::debug!(%chunk_id, status = %work.status, "Chunk already terminal, skipping");
            return Ok(ChunkOutcome::Skipped);
        }

        let Some(running) = ChunkRepo::mark_running(pool, chunk_id).await? else {
            tracing::debug!(%chunk_id, "Chunk became terminal before it started, skipping");
            return Ok(ChunkOutcome::Skipped);
        };
        self.service.recalculate_job_status(work.job_id).await?;

        tracing::debug!(
            %chunk_id,
            job_id = %work.job_id,
            chunk_index = work.chunk_index,
            attempt = running.attempts,
            "Translating chunk",
        );

        let outcome = match self
            .translator
            .translate(&work.source_text, &work.target_lang)
            .await
        {
            Ok(translated) => self.complete(chunk_id, work.job_id, &translated).await?,
            Err(e) => self.fail(chunk_id, work.job_id, &e.to_string()).await?,
        };

        self.service.recalculate_job_status(work.job_id).await?;
        Ok(outcome)
    }

    async fn complete(
        &self,
        chunk_id: DbId,
        job_id: DbId,
        translated: &str,
    ) -> Result<ChunkOutcome, PipelineError> {
        if !ChunkRepo::mark_done(self.service.pool(), chunk_id, translated).await? {
            tracing::debug!(%chunk_id, "Chunk finished by another attempt");
            return Ok(ChunkOutcome::Skipped);
        }

        self.service
            .queue()
            .publish(job_id, &JobEvent::ChunkDone { chunk_id })
            .await?;
        tracing::info!(%chunk_id, %job_id, "Chunk translated");
        Ok(ChunkOutcome::Done)
    }

    async fn fail(
        &self,
        chunk_id: DbId,
        job_id: DbId,
        error: &str,
    ) -> Result<ChunkOutcome, PipelineError> {
        let pool = self.service.pool();
        let queue = self.service.queue();

        let Some(failed) = ChunkRepo::mark_failed(pool, chunk_id, error).await? else {
            tracing::debug!(%chunk_id, "Chunk finished by another attempt");
            return Ok(ChunkOutcome::Skipped);
        };
        let attempts = failed.attempts;

        if should_retry(attempts, failed.max_attempts) {
            ChunkRepo::requeue(pool, chunk_id).await?;
            queue.enqueue(chunk_id).await?;
            queue
                .publish(job_id, &JobEvent::ChunkRetry { chunk_id, attempts })
                .await?;
            tracing::warn!(
                %chunk_id,
                %job_id,
                attempts,
                max_attempts = failed.max_attempts,
                error,
                "Chunk attempt failed, requeued",
            );
            Ok(ChunkOutcome::Retried { attempts })
        } else {
            queue
                .publish(job_id, &JobEvent::ChunkFailed { chunk_id, attempts })
                .await?;
            tracing::error!(
                %chunk_id,
                %job_id,
                attempts,
                error,
                "Chunk exceeded retry limit",
            );
            Ok(ChunkOutcome::Failed { attempts })
        }
    }
}
