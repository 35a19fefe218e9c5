//! Translation job entity and read projections.

use giga_core::status::JobStatus;
use giga_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `translation_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub source_text: String,
    pub target_lang: String,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A job joined with its chunk counts, as returned by status queries.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobWithCounts {
    pub id: DbId,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub target_lang: String,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub total_chunks: i64,
    pub completed_chunks: i64,
    pub failed_chunks: i64,
    pub active_chunks: i64,
}

/// Input for [`JobRepo::create_with_chunks`](crate::repositories::JobRepo::create_with_chunks).
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub id: DbId,
    pub source_text: String,
    pub target_lang: String,
    /// Chunk texts in index order. Must not be empty.
    pub chunks: Vec<String>,
    pub max_attempts: i32,
}
