//! Work queue and per-job event channel.
//!
//! This crate provides:
//!
//! - [`WorkQueue`]: the FIFO of chunk ids plus the per-job publish /
//!   subscribe primitive, as a trait so the job service and workers can be
//!   handed either backend.
//! - [`PgWorkQueue`]: FIFO in a Postgres table, woken by `LISTEN/NOTIFY`.
//!   Events fan out through `pg_notify`, so producers and listeners can live
//!   in different processes.
//! - [`MemoryWorkQueue`]: in-process FIFO for tests and single-process
//!   deployments.
//! - [`JobEventBus`]: per-job `tokio::sync::broadcast` fan-out shared by
//!   both backends.
//!
//! Delivery is at-least-once: a chunk id may be handed out more than once
//! over time. Events are fire-and-forget with no replay.

pub mod bus;
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use giga_core::job_events::JobEvent;
use giga_core::types::DbId;

pub use bus::JobEventBus;
pub use memory::MemoryWorkQueue;
pub use postgres::PgWorkQueue;

/// Live stream of events for one job. Ends when the queue shuts down.
pub type EventStream = BoxStream<'static, JobEvent>;

/// Errors raised by a queue backend.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Chunk delivery and job notification.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a chunk id to the tail of the FIFO.
    async fn enqueue(&self, chunk_id: DbId) -> Result<(), QueueError>;

    /// Pop the head of the FIFO, waiting up to `timeout` for work.
    ///
    /// Returns `Ok(None)` when the timeout elapses with the queue empty.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError>;

    /// The subset of `chunk_ids` with no entry waiting in the FIFO, in input
    /// order.
    async fn not_enqueued(&self, chunk_ids: &[DbId]) -> Result<Vec<DbId>, QueueError>;

    /// Publish an event to the job's current subscribers.
    async fn publish(&self, job_id: DbId, event: &JobEvent) -> Result<(), QueueError>;

    /// Subscribe to events published for `job_id` from now on.
    async fn subscribe(&self, job_id: DbId) -> Result<EventStream, QueueError>;

    /// Release background resources and end every open event stream.
    async fn shutdown(&self) {}
}
