//! Job and chunk status enums plus the job status derivation rule.
//!
//! Statuses are persisted as lowercase text (`queued`, `running`, `failed`,
//! `done`) guarded by a `CHECK` constraint, so each enum round-trips through
//! its string form rather than a numeric lookup id.

use serde::{Deserialize, Serialize};

/// Stable job-level error written when any chunk runs out of attempts.
pub const RETRY_LIMIT_EXCEEDED: &str = "One or more chunks exceeded retry limit";

/// A status string that does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status value: {0}")]
pub struct UnknownStatus(pub String);

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Return the persisted text form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $val ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $val => Ok(Self::$variant), )+
                    other => Err(UnknownStatus(other.to_string())),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

define_status_enum! {
    /// Derived job status, recomputed from its chunks after every transition.
    JobStatus {
        Queued = "queued",
        Running = "running",
        Failed = "failed",
        Done = "done",
    }
}

define_status_enum! {
    /// Per-chunk execution status.
    ChunkStatus {
        Queued = "queued",
        Running = "running",
        Failed = "failed",
        Done = "done",
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Chunk counts for one job, as read by the status recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAggregate {
    pub total: i64,
    pub done: i64,
    /// Chunks in `failed` with `attempts >= max_attempts`.
    pub permanently_failed: i64,
    /// Chunks in `queued` or `running`.
    pub active: i64,
}

/// Outcome of [`derive_job_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedStatus {
    pub status: JobStatus,
    pub error: Option<&'static str>,
}

/// Derive a job's status from its chunk aggregate.
///
/// Failure is eager: a single permanently failed chunk fails the job even
/// while other chunks are still in flight.
pub fn derive_job_status(agg: &ChunkAggregate) -> DerivedStatus {
    if agg.permanently_failed > 0 {
        DerivedStatus {
            status: JobStatus::Failed,
            error: Some(RETRY_LIMIT_EXCEEDED),
        }
    } else if agg.done == agg.total {
        DerivedStatus {
            status: JobStatus::Done,
            error: None,
        }
    } else if agg.active > 0 {
        DerivedStatus {
            status: JobStatus::Running,
            error: None,
        }
    } else {
        DerivedStatus {
            status: JobStatus::Queued,
            error: None,
        }
    }
}

/// Whether a chunk can no longer transition: `done`, or `failed` with its
/// attempts exhausted.
pub fn is_terminal(status: ChunkStatus, attempts: i32, max_attempts: i32) -> bool {
    match status {
        ChunkStatus::Done => true,
        ChunkStatus::Failed => attempts >= max_attempts,
        ChunkStatus::Queued | ChunkStatus::Running => false,
    }
}

/// Whether a failed attempt should go back to the queue.
pub fn should_retry(attempts: i32, max_attempts: i32) -> bool {
    attempts < max_attempts
}
