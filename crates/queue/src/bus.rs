//! In-process per-job event fan-out backed by `tokio::sync::broadcast`.
//!
//! [`JobEventBus`] keeps one broadcast channel per job that currently has
//! subscribers. Channels are created lazily on subscribe and dropped once a
//! publish finds nobody listening. Designed to be shared via `Arc`.

use std::collections::HashMap;

use futures::StreamExt;
use giga_core::job_events::JobEvent;
use giga_core::types::DbId;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::EventStream;

/// Default buffer capacity for each job's broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Per-job fan-out hub.
pub struct JobEventBus {
    channels: RwLock<HashMap<DbId, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl JobEventBus {
    /// Create a bus whose per-job channels buffer `capacity` events.
    ///
    /// A subscriber that falls further behind skips the oldest events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Deliver `event` to everyone currently subscribed to `job_id`.
    ///
    /// Events for jobs without subscribers are dropped.
    pub async fn publish(&self, job_id: DbId, event: JobEvent) {
        let delivered = match self.channels.read().await.get(&job_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => return,
        };

        if !delivered {
            // Every receiver is gone; forget the channel unless someone
            // subscribed in the meantime.
            let mut channels = self.channels.write().await;
            if channels
                .get(&job_id)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(&job_id);
            }
        }
    }

    /// Subscribe to future events for `job_id`.
    pub async fn subscribe(&self, job_id: DbId) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe and adapt the receiver into an [`EventStream`].
    ///
    /// Lagged gaps are logged and skipped.
    pub async fn subscribe_stream(&self, job_id: DbId) -> EventStream {
        let receiver = self.subscribe(job_id).await;
        BroadcastStream::new(receiver)
            .filter_map(move |item| async move {
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(%job_id, skipped, "Job event subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }

    /// Number of jobs with a live channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Drop every channel, ending all subscriber streams.
    pub async fn close_all(&self) {
        self.channels.write().await.clear();
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
