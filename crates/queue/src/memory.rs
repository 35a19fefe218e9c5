//! In-process work queue.
//!
//! A `VecDeque` FIFO guarded by a mutex, with a [`Notify`] to park idle
//! consumers. Contents do not survive a restart; rebuild from the store with
//! `JobService::requeue_pending` when using this backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use giga_core::job_events::JobEvent;
use giga_core::types::DbId;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::bus::JobEventBus;
use crate::{EventStream, QueueError, WorkQueue};

/// FIFO and event bus living entirely in this process.
#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<VecDeque<DbId>>,
    available: Notify,
    bus: JobEventBus,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunk ids waiting.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, chunk_id: DbId) -> Result<(), QueueError> {
        self.items.lock().await.push_back(chunk_id);
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so an enqueue between the
            // check and the wait is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(chunk_id) = self.items.lock().await.pop_front() {
                return Ok(Some(chunk_id));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn not_enqueued(&self, chunk_ids: &[DbId]) -> Result<Vec<DbId>, QueueError> {
        let items = self.items.lock().await;
        Ok(chunk_ids
            .iter()
            .copied()
            .filter(|id| !items.contains(id))
            .collect())
    }

    async fn publish(&self, job_id: DbId, event: &JobEvent) -> Result<(), QueueError> {
        self.bus.publish(job_id, event.clone()).await;
        Ok(())
    }

    async fn subscribe(&self, job_id: DbId) -> Result<EventStream, QueueError> {
        Ok(self.bus.subscribe_stream(job_id).await)
    }

    async fn shutdown(&self) {
        self.bus.close_all().await;
    }
}
