//! Integration tests for `PgWorkQueue` against a real database.
//!
//! Covers the table FIFO (`SKIP LOCKED` pops, ordering, timeouts), the
//! `LISTEN/NOTIFY` wake-up, and `pg_notify` event fan-out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use giga_core::job_events::JobEvent;
use giga_core::status::{ChunkAggregate, JobStatus};
use giga_core::types::{new_id, DbId};
use giga_db::models::job::CreateJob;
use giga_db::repositories::JobRepo;
use giga_queue::{PgWorkQueue, WorkQueue};
use sqlx::PgPool;
use tokio::time::{timeout, Instant};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert a job with `n` chunks; queue rows reference real chunk ids.
async fn seed_chunks(pool: &PgPool, n: usize) -> (DbId, Vec<DbId>) {
    let chunks: Vec<String> = (0..n).map(|i| format!("chunk {i}")).collect();
    let input = CreateJob {
        id: new_id(),
        source_text: chunks.concat(),
        target_lang: "fr".to_string(),
        chunks,
        max_attempts: 3,
    };
    let (job, ids) = JobRepo::create_with_chunks(pool, &input).await.unwrap();
    (job.id, ids)
}

fn status_event(status: JobStatus) -> JobEvent {
    JobEvent::JobStatus {
        status,
        error: None,
        counts: ChunkAggregate::default(),
    }
}

// ---------------------------------------------------------------------------
// FIFO
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn dequeues_in_enqueue_order(pool: PgPool) {
    let queue = PgWorkQueue::connect(pool.clone()).await.unwrap();
    let (_, ids) = seed_chunks(&pool, 3).await;

    for id in ids.iter().rev() {
        queue.enqueue(*id).await.unwrap();
    }
    assert_eq!(queue.depth().await.unwrap(), 3);

    for id in ids.iter().rev() {
        let popped = queue.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(popped, Some(*id));
    }
    assert_eq!(queue.depth().await.unwrap(), 0);

    queue.shutdown().await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_dequeue_returns_none_after_timeout(pool: PgPool) {
    let queue = PgWorkQueue::connect(pool)
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(50));

    let started = Instant::now();
    let popped = queue.dequeue(Duration::from_millis(300)).await.unwrap();

    assert_eq!(popped, None);
    assert!(started.elapsed() >= Duration::from_millis(300));
    queue.shutdown().await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_consumers_receive_each_item_exactly_once(pool: PgPool) {
    let queue = Arc::new(PgWorkQueue::connect(pool.clone()).await.unwrap());
    let (_, ids) = seed_chunks(&pool, 20).await;
    for id in &ids {
        queue.enqueue(*id).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(id) = queue.dequeue(Duration::from_millis(300)).await.unwrap() {
                got.push(id);
            }
            got
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.extend(handle.await.unwrap());
    }
    assert_eq!(seen.len(), ids.len(), "an item was delivered twice or lost");
    let unique: HashSet<DbId> = seen.into_iter().collect();
    assert_eq!(unique, ids.iter().copied().collect::<HashSet<_>>());
    assert_eq!(queue.depth().await.unwrap(), 0);

    queue.shutdown().await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn idle_consumer_wakes_on_notify_before_the_poll(pool: PgPool) {
    // A poll this long would fail the test; only the notification can wake it.
    let queue = Arc::new(
        PgWorkQueue::connect(pool.clone())
            .await
            .unwrap()
            .with_poll_interval(Duration::from_secs(60)),
    );
    let (_, ids) = seed_chunks(&pool, 1).await;

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let started = Instant::now();
            let popped = queue.dequeue(Duration::from_secs(30)).await.unwrap();
            (popped, started.elapsed())
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Insert from another queue instance, as a separate producer would.
    let producer = PgWorkQueue::connect(pool).await.unwrap();
    producer.enqueue(ids[0]).await.unwrap();

    let (popped, waited) = timeout(Duration::from_secs(10), consumer)
        .await
        .expect("consumer was not woken")
        .unwrap();
    assert_eq!(popped, Some(ids[0]));
    assert!(waited < Duration::from_secs(10));

    producer.shutdown().await;
    queue.shutdown().await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn not_enqueued_lists_ids_without_a_queue_row(pool: PgPool) {
    let queue = PgWorkQueue::connect(pool.clone()).await.unwrap();
    let (_, ids) = seed_chunks(&pool, 3).await;
    queue.enqueue(ids[1]).await.unwrap();

    let missing = queue.not_enqueued(&ids).await.unwrap();
    assert_eq!(missing, vec![ids[0], ids[2]]);
    assert!(queue.not_enqueued(&[]).await.unwrap().is_empty());

    queue.shutdown().await;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn events_fan_out_across_queue_instances(pool: PgPool) {
    let publisher = PgWorkQueue::connect(pool.clone()).await.unwrap();
    let listener = PgWorkQueue::connect(pool).await.unwrap();
    let job_id = new_id();
    let other_job = new_id();

    let mut first = listener.subscribe(job_id).await.unwrap();
    let mut second = listener.subscribe(job_id).await.unwrap();
    let mut unrelated = listener.subscribe(other_job).await.unwrap();

    let event = status_event(JobStatus::Running);
    publisher.publish(job_id, &event).await.unwrap();

    let wait = Duration::from_secs(5);
    assert_eq!(timeout(wait, first.next()).await.unwrap(), Some(event.clone()));
    assert_eq!(timeout(wait, second.next()).await.unwrap(), Some(event));
    assert!(unrelated.next().now_or_never().is_none());

    publisher.shutdown().await;
    listener.shutdown().await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn shutdown_ends_open_event_streams(pool: PgPool) {
    let queue = PgWorkQueue::connect(pool).await.unwrap();
    let mut events = queue.subscribe(new_id()).await.unwrap();

    queue.shutdown().await;

    let next = timeout(Duration::from_secs(5), events.next())
        .await
        .expect("stream stayed open after shutdown");
    assert_eq!(next, None);
}
