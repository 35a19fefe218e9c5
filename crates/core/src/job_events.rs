//! Per-job notification events.
//!
//! Published on the job's channel after every chunk transition and status
//! recompute. Delivery is fire-and-forget; listeners that need ground truth
//! query the job directly.

use serde::{Deserialize, Serialize};

use crate::status::{ChunkAggregate, JobStatus};
use crate::types::DbId;

/// Job was persisted and its chunks enqueued.
pub const EVENT_JOB_CREATED: &str = "job_created";

/// Job status was recomputed.
pub const EVENT_JOB_STATUS: &str = "job_status";

/// A chunk finished successfully.
pub const EVENT_CHUNK_DONE: &str = "chunk_done";

/// A chunk attempt failed and the chunk went back to the queue.
pub const EVENT_CHUNK_RETRY: &str = "chunk_retry";

/// A chunk exhausted its attempts.
pub const EVENT_CHUNK_FAILED: &str = "chunk_failed";

/// Event envelope, serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobCreated {
        status: JobStatus,
    },
    JobStatus {
        status: JobStatus,
        error: Option<String>,
        #[serde(flatten)]
        counts: ChunkAggregate,
    },
    ChunkDone {
        chunk_id: DbId,
    },
    ChunkRetry {
        chunk_id: DbId,
        attempts: i32,
    },
    ChunkFailed {
        chunk_id: DbId,
        attempts: i32,
    },
}

impl JobEvent {
    /// The wire name carried in the `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobCreated { .. } => EVENT_JOB_CREATED,
            JobEvent::JobStatus { .. } => EVENT_JOB_STATUS,
            JobEvent::ChunkDone { .. } => EVENT_CHUNK_DONE,
            JobEvent::ChunkRetry { .. } => EVENT_CHUNK_RETRY,
            JobEvent::ChunkFailed { .. } => EVENT_CHUNK_FAILED,
        }
    }
}
