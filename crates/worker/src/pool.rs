//! Concurrent dequeue loops sharing one [`ChunkWorker`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::processor::ChunkWorker;

/// Pause after an infrastructure error before the loop dequeues again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A fixed number of independent worker loops.
pub struct WorkerPool {
    worker: Arc<ChunkWorker>,
    concurrency: usize,
    dequeue_timeout: Duration,
}

impl WorkerPool {
    pub fn new(worker: Arc<ChunkWorker>, concurrency: usize, dequeue_timeout: Duration) -> Self {
        Self {
            worker,
            concurrency: concurrency.max(1),
            dequeue_timeout,
        }
    }

    /// Spawn the loops. Each stops after its current chunk once `cancel`
    /// fires; a chunk in flight is never interrupted.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            concurrency = self.concurrency,
            dequeue_timeout_secs = self.dequeue_timeout.as_secs(),
            "Starting worker pool",
        );

        (0..self.concurrency)
            .map(|index| {
                tokio::spawn(run_loop(
                    index,
                    Arc::clone(&self.worker),
                    self.dequeue_timeout,
                    cancel.clone(),
                ))
            })
            .collect()
    }
}

async fn run_loop(
    index: usize,
    worker: Arc<ChunkWorker>,
    dequeue_timeout: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(worker = index, "Worker loop started");
    let queue = Arc::clone(worker.service().queue());

    // The dequeue itself is not raced against `cancel`: a pop that commits
    // must reach `process_chunk`. The timeout bounds shutdown latency.
    while !cancel.is_cancelled() {
        let chunk_id = match queue.dequeue(dequeue_timeout).await {
            Ok(Some(chunk_id)) => chunk_id,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(worker = index, error = %e, "Dequeue failed");
                pause(&cancel).await;
                continue;
            }
        };

        if let Err(e) = worker.process_chunk(chunk_id).await {
            tracing::error!(worker = index, %chunk_id, error = %e, "Chunk processing failed");
            pause(&cancel).await;
        }
    }

    tracing::debug!(worker = index, "Worker loop stopped");
}

async fn pause(cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
    }
}
