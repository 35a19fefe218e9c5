//! Translation chunk entity and worker-facing projections.

use giga_core::status::ChunkStatus;
use giga_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `translation_chunks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chunk {
    pub id: DbId,
    pub job_id: DbId,
    pub chunk_index: i32,
    pub source_text: String,
    pub translated_text: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ChunkStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// A chunk joined with its job's target language: everything a worker
/// needs to run one attempt.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkWork {
    pub id: DbId,
    pub job_id: DbId,
    pub chunk_index: i32,
    pub source_text: String,
    #[sqlx(try_from = "String")]
    pub status: ChunkStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub target_lang: String,
}

/// Attempt bookkeeping read back from a `running -> failed` transition.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct FailedAttempt {
    pub job_id: DbId,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Chunks waiting for or holding a worker, across all jobs.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct ChunkBacklog {
    pub queued: i64,
    pub running: i64,
}

/// A chunk touched by the recovery sweep, with the status it was left in.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct RecoveredChunk {
    pub id: DbId,
    pub job_id: DbId,
    #[sqlx(try_from = "String")]
    pub status: ChunkStatus,
    pub attempts: i32,
}
