use giga_core::error::CoreError;
use giga_queue::QueueError;

/// Errors returned by [`JobService`](crate::JobService) operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Validation or lookup failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
