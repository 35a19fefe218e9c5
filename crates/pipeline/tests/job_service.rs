//! Integration tests for `JobService` against a real database and the
//! in-memory work queue.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{FutureExt, StreamExt};
use giga_core::chunking::{LengthSplitter, TokenBudgetSplitter};
use giga_core::error::CoreError;
use giga_core::job_events::JobEvent;
use giga_core::status::{ChunkStatus, JobStatus, RETRY_LIMIT_EXCEEDED};
use giga_core::types::{new_id, DbId};
use giga_db::repositories::ChunkRepo;
use giga_pipeline::{JobService, JobServiceConfig, PipelineError};
use giga_queue::{MemoryWorkQueue, WorkQueue};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_service(pool: PgPool) -> (JobService, Arc<MemoryWorkQueue>) {
    let queue = Arc::new(MemoryWorkQueue::new());
    let service = JobService::new(
        pool,
        queue.clone(),
        Arc::new(LengthSplitter),
        JobServiceConfig::default(),
    );
    (service, queue)
}

async fn drain(queue: &MemoryWorkQueue) -> Vec<DbId> {
    let mut ids = Vec::new();
    while let Some(id) = queue.dequeue(Duration::ZERO).await.unwrap() {
        ids.push(id);
    }
    ids
}

async fn chunk_ids(pool: &PgPool, job_id: DbId) -> Vec<DbId> {
    ChunkRepo::list_by_job(pool, job_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect()
}

async fn job_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM translation_jobs")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// create_job
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_job_splits_and_enqueues_in_order(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());

    let job_id = service.create_job("abcdefg", "fr", Some(3)).await.unwrap();

    let chunks = ChunkRepo::list_by_job(&pool, job_id).await.unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.source_text.as_str()).collect();
    assert_eq!(texts, vec!["abc", "def", "g"]);
    assert!(chunks.iter().all(|c| c.status == ChunkStatus::Queued));
    assert!(chunks.iter().all(|c| c.attempts == 0 && c.max_attempts == 3));

    let queued = drain(&queue).await;
    assert_eq!(queued, chunks.iter().map(|c| c.id).collect::<Vec<_>>());

    let job = service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.total_chunks, 3);
    assert_eq!(job.completed_chunks, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_job_uses_default_chunk_size(pool: PgPool) {
    let (service, _queue) = build_service(pool.clone());
    let text = "x".repeat(500);

    let job_id = service.create_job(&text, "de", None).await.unwrap();

    let chunks = ChunkRepo::list_by_job(&pool, job_id).await.unwrap();
    let lens: Vec<usize> = chunks.iter().map(|c| c.source_text.len()).collect();
    assert_eq!(lens, vec![240, 240, 20]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_empty_text_creates_single_empty_chunk(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());

    let job_id = service.create_job("", "fr", None).await.unwrap();

    let chunks = ChunkRepo::list_by_job(&pool, job_id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source_text, "");
    assert_eq!(drain(&queue).await.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_invalid_input_creates_nothing(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());

    assert_matches!(
        service.create_job("hello", "  ", None).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        service.create_job("hello", "fr", Some(0)).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );

    assert_eq!(job_count(&pool).await, 0);
    assert!(queue.is_empty().await);
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_job_is_not_found(pool: PgPool) {
    let (service, _queue) = build_service(pool);
    let missing = new_id();

    assert_matches!(
        service.get_job(missing).await,
        Err(PipelineError::Core(CoreError::NotFound { id, .. })) if id == missing
    );
    assert_matches!(
        service.get_job_result(missing).await,
        Err(PipelineError::Core(CoreError::NotFound { .. }))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_result_is_ordered_concatenation_once_done(pool: PgPool) {
    let (service, _queue) = build_service(pool.clone());
    let job_id = service.create_job("aabbcc", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;

    let pending = service.get_job_result(job_id).await.unwrap();
    assert!(pending.text.is_none());

    // Finish out of order; reassembly follows chunk_index.
    for (id, text) in [(ids[2], "CC"), (ids[0], "AA"), (ids[1], "BB")] {
        ChunkRepo::mark_running(&pool, id).await.unwrap();
        ChunkRepo::mark_done(&pool, id, text).await.unwrap();
    }
    let snapshot = service.recalculate_job_status(job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Done);

    let result = service.get_job_result(job_id).await.unwrap();
    assert_eq!(result.job.status, JobStatus::Done);
    assert_eq!(result.job.completed_chunks, 3);
    assert_eq!(result.text.as_deref(), Some("AABBCC"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_token_budget_result_keeps_paragraph_breaks(pool: PgPool) {
    let service = JobService::new(
        pool.clone(),
        Arc::new(MemoryWorkQueue::new()),
        Arc::new(TokenBudgetSplitter),
        JobServiceConfig::default(),
    );
    let text = "one two\n\nthree four\n\nfive six";
    let job_id = service.create_job(text, "fr", Some(3)).await.unwrap();

    // Identity translation of each chunk.
    let chunks = ChunkRepo::list_by_job(&pool, job_id).await.unwrap();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        ChunkRepo::mark_running(&pool, chunk.id).await.unwrap();
        ChunkRepo::mark_done(&pool, chunk.id, &chunk.source_text)
            .await
            .unwrap();
    }
    service.recalculate_job_status(job_id).await.unwrap();

    let result = service.get_job_result(job_id).await.unwrap();
    assert_eq!(result.text.as_deref(), Some(text));
}

// ---------------------------------------------------------------------------
// recalculate_job_status
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_recalculate_is_idempotent_and_publishes(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("abcd", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;
    ChunkRepo::mark_running(&pool, ids[0]).await.unwrap();
    ChunkRepo::mark_done(&pool, ids[0], "AB").await.unwrap();

    let mut events = queue.subscribe(job_id).await.unwrap();

    let first = service.recalculate_job_status(job_id).await.unwrap();
    let second = service.recalculate_job_status(job_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.status, JobStatus::Running);
    assert_eq!(first.counts.total, 2);
    assert_eq!(first.counts.done, 1);
    assert_eq!(first.counts.active, 1);

    let event = events.next().await.unwrap();
    assert_matches!(
        event,
        JobEvent::JobStatus { status: JobStatus::Running, error: None, counts } if counts.done == 1
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_exhausted_chunk_fails_job_eagerly(pool: PgPool) {
    let (service, _queue) = build_service(pool.clone());
    let job_id = service.create_job("abcd", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;

    for attempt in 1..=3 {
        ChunkRepo::mark_running(&pool, ids[0]).await.unwrap();
        let failed = ChunkRepo::mark_failed(&pool, ids[0], "boom")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.attempts, attempt);
        if attempt < 3 {
            assert!(ChunkRepo::requeue(&pool, ids[0]).await.unwrap());
        }
    }

    // The other chunk is still queued, but one permanent failure is enough.
    let snapshot = service.recalculate_job_status(job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error, Some(RETRY_LIMIT_EXCEEDED));

    let job = service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(RETRY_LIMIT_EXCEEDED));
    assert_eq!(job.failed_chunks, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_recalculate_unknown_job_is_not_found(pool: PgPool) {
    let (service, _queue) = build_service(pool);
    assert_matches!(
        service.recalculate_job_status(new_id()).await,
        Err(PipelineError::Core(CoreError::NotFound { .. }))
    );
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_recover_stale_chunks_requeues_once(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("abcd", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;
    drain(&queue).await;

    ChunkRepo::mark_running(&pool, ids[0]).await.unwrap();
    ChunkRepo::mark_running(&pool, ids[1]).await.unwrap();
    sqlx::query(
        "UPDATE translation_chunks SET started_at = NOW() - INTERVAL '5 minutes' WHERE id = $1",
    )
    .bind(ids[0])
    .execute(&pool)
    .await
    .unwrap();

    let report = service.recover_stale_chunks().await.unwrap();
    assert_eq!(report.stale_requeued, 1);
    assert_eq!(report.total(), 1);
    assert_eq!(drain(&queue).await, vec![ids[0]]);

    let chunk = ChunkRepo::find_by_id(&pool, ids[0]).await.unwrap().unwrap();
    assert_eq!(chunk.status, ChunkStatus::Queued);
    assert!(chunk.started_at.is_none());

    assert_eq!(service.recover_stale_chunks().await.unwrap().total(), 0);
    assert!(queue.is_empty().await);
}

async fn backdate(pool: &PgPool, chunk_id: DbId, column: &str) {
    let query = format!(
        "UPDATE translation_chunks SET {column} = NOW() - INTERVAL '5 minutes' WHERE id = $1"
    );
    sqlx::query(&query)
        .bind(chunk_id)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_chunk_that_keeps_crashing_its_worker_fails_at_the_limit(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("ab", "fr", Some(2)).await.unwrap();
    let chunk_id = chunk_ids(&pool, job_id).await[0];
    let mut events = queue.subscribe(job_id).await.unwrap();
    let max_attempts = service.config().max_attempts;

    // Every attempt is picked up and then abandoned mid-run.
    let mut deliveries = drain(&queue).await.len();
    for _ in 0..max_attempts {
        assert!(ChunkRepo::mark_running(&pool, chunk_id).await.unwrap().is_some());
        backdate(&pool, chunk_id, "started_at").await;
        service.recover_stale_chunks().await.unwrap();
        deliveries += drain(&queue).await.len();
    }

    let chunk = ChunkRepo::find_by_id(&pool, chunk_id).await.unwrap().unwrap();
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert_eq!(chunk.attempts, max_attempts);
    // One delivery at creation plus one per non-final reclaim.
    assert_eq!(deliveries, max_attempts as usize);
    assert!(ChunkRepo::mark_running(&pool, chunk_id).await.unwrap().is_none());

    let job = service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(RETRY_LIMIT_EXCEEDED));

    let mut saw_chunk_failed = false;
    while let Some(Some(event)) = events.next().now_or_never() {
        if matches!(event, JobEvent::ChunkFailed { attempts, .. } if attempts == max_attempts) {
            saw_chunk_failed = true;
        }
    }
    assert!(saw_chunk_failed);

    // Nothing left to reclaim.
    assert_eq!(service.recover_stale_chunks().await.unwrap().total(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_recover_requeues_failed_chunk_left_by_crashed_worker(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("ab", "fr", Some(2)).await.unwrap();
    let chunk_id = chunk_ids(&pool, job_id).await[0];
    drain(&queue).await;

    // Failure recorded, then the worker died before requeueing.
    ChunkRepo::mark_running(&pool, chunk_id).await.unwrap();
    ChunkRepo::mark_failed(&pool, chunk_id, "boom").await.unwrap();
    service.recalculate_job_status(job_id).await.unwrap();

    // Inside the window the worker may still be about to requeue.
    assert_eq!(service.recover_stale_chunks().await.unwrap().total(), 0);

    backdate(&pool, chunk_id, "updated_at").await;
    let report = service.recover_stale_chunks().await.unwrap();
    assert_eq!(report.failed_requeued, 1);
    assert_eq!(drain(&queue).await, vec![chunk_id]);

    let chunk = ChunkRepo::find_by_id(&pool, chunk_id).await.unwrap().unwrap();
    assert_eq!(chunk.status, ChunkStatus::Queued);
    assert_eq!(chunk.attempts, 1);
    // A queued chunk counts as active work again.
    let job = service.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_recover_enqueues_queued_chunk_missing_from_queue(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("abcd", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;

    // Lose the first chunk's queue entry; the second is still waiting.
    assert_eq!(queue.dequeue(Duration::ZERO).await.unwrap(), Some(ids[0]));
    backdate(&pool, ids[0], "updated_at").await;
    backdate(&pool, ids[1], "updated_at").await;

    let report = service.recover_stale_chunks().await.unwrap();
    assert_eq!(report.orphans_enqueued, 1);
    assert_eq!(report.total(), 1);
    assert_eq!(drain(&queue).await, vec![ids[1], ids[0]]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_requeue_pending_rebuilds_queue(pool: PgPool) {
    let (service, queue) = build_service(pool.clone());
    let job_id = service.create_job("abcdef", "fr", Some(2)).await.unwrap();
    let ids = chunk_ids(&pool, job_id).await;
    drain(&queue).await;

    ChunkRepo::mark_running(&pool, ids[0]).await.unwrap();

    assert_eq!(service.requeue_pending().await.unwrap(), 2);
    assert_eq!(drain(&queue).await, vec![ids[1], ids[2]]);
}
