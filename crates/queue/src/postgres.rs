//! Postgres-backed work queue.
//!
//! The FIFO is the `translation_chunk_queue` table. Consumers pop the head
//! with `DELETE ... FOR UPDATE SKIP LOCKED`, so concurrent workers in any
//! number of processes never receive the same row from one pop. An insert
//! trigger fires `pg_notify('translation_chunks', ...)`; a single background
//! listener turns those into wake-ups for idle consumers, with a fallback
//! poll in case a notification is lost across a reconnect.
//!
//! Job events are published with `pg_notify` on one shared channel and the
//! same listener fans them out to per-job subscribers through a
//! [`JobEventBus`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use giga_core::job_events::JobEvent;
use giga_core::types::DbId;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgListener, PgNotification};
use sqlx::PgPool;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::JobEventBus;
use crate::{EventStream, QueueError, WorkQueue};

/// Notification channel fired by the queue insert trigger.
pub const CHUNK_CHANNEL: &str = "translation_chunks";

/// Notification channel carrying [`EventEnvelope`]s for every job.
pub const EVENT_CHANNEL: &str = "translation_job_events";

/// Upper bound on how long an idle consumer waits before re-checking the
/// table without a notification.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause before the listener retries after a connection error.
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wire payload on [`EVENT_CHANNEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventEnvelope {
    job_id: DbId,
    event: JobEvent,
}

/// Work queue stored in Postgres.
pub struct PgWorkQueue {
    pool: PgPool,
    wakeup: Arc<Notify>,
    bus: Arc<JobEventBus>,
    poll_interval: Duration,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PgWorkQueue {
    /// Connect the notification listener and start its background task.
    pub async fn connect(pool: PgPool) -> Result<Self, QueueError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen_all([CHUNK_CHANNEL, EVENT_CHANNEL]).await?;

        let wakeup = Arc::new(Notify::new());
        let bus = Arc::new(JobEventBus::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_listener(
            listener,
            Arc::clone(&wakeup),
            Arc::clone(&bus),
            cancel.clone(),
        ));

        tracing::info!("Postgres work queue listener started");

        Ok(Self {
            pool,
            wakeup,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel,
            listener: Mutex::new(Some(handle)),
        })
    }

    /// Override the fallback poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of chunk ids waiting in the table.
    pub async fn depth(&self) -> Result<i64, QueueError> {
        let depth = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM translation_chunk_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(depth)
    }

    async fn try_pop(&self) -> Result<Option<DbId>, QueueError> {
        let popped = sqlx::query_scalar::<_, DbId>(
            "DELETE FROM translation_chunk_queue \
             WHERE id = ( \
                 SELECT id FROM translation_chunk_queue \
                 ORDER BY id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING chunk_id",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(popped)
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, chunk_id: DbId) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO translation_chunk_queue (chunk_id) VALUES ($1)")
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(chunk_id) = self.try_pop().await? {
                return Ok(Some(chunk_id));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.poll_interval);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn not_enqueued(&self, chunk_ids: &[DbId]) -> Result<Vec<DbId>, QueueError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let missing = sqlx::query_scalar::<_, DbId>(
            "SELECT c.chunk_id \
             FROM unnest($1::uuid[]) WITH ORDINALITY AS c(chunk_id, ord) \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM translation_chunk_queue q WHERE q.chunk_id = c.chunk_id \
             ) \
             ORDER BY c.ord",
        )
        .bind(chunk_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(missing)
    }

    async fn publish(&self, job_id: DbId, event: &JobEvent) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&EventEnvelope {
            job_id,
            event: event.clone(),
        })?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(EVENT_CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, job_id: DbId) -> Result<EventStream, QueueError> {
        Ok(self.bus.subscribe_stream(job_id).await)
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.listener.lock().await.take() {
            let _ = handle.await;
        }
        self.bus.close_all().await;
        tracing::info!("Postgres work queue listener stopped");
    }
}

// ---------------------------------------------------------------------------
// Listener task
// ---------------------------------------------------------------------------

async fn run_listener(
    mut listener: PgListener,
    wakeup: Arc<Notify>,
    bus: Arc<JobEventBus>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = listener.recv() => match received {
                Ok(notification) => dispatch(&notification, &wakeup, &bus).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Queue listener lost its connection, retrying");
                    tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                    // Notifications sent while disconnected are gone; let
                    // idle consumers re-check the table.
                    wakeup.notify_waiters();
                }
            },
        }
    }
}

async fn dispatch(notification: &PgNotification, wakeup: &Notify, bus: &JobEventBus) {
    match notification.channel() {
        CHUNK_CHANNEL => wakeup.notify_waiters(),
        EVENT_CHANNEL => match serde_json::from_str::<EventEnvelope>(notification.payload()) {
            Ok(envelope) => bus.publish(envelope.job_id, envelope.event).await,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed job event notification");
            }
        },
        other => tracing::debug!(channel = other, "Ignoring notification on unknown channel"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giga_core::status::JobStatus;
    use giga_core::types::new_id;

    #[test]
    fn envelope_round_trips() {
        let job_id = new_id();
        let payload = serde_json::to_string(&EventEnvelope {
            job_id,
            event: JobEvent::JobCreated {
                status: JobStatus::Queued,
            },
        })
        .unwrap();

        let back: EventEnvelope = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.job_id, job_id);
        assert_eq!(back.event.event_type(), "job_created");
    }
}
