//! Translation worker: pulls chunk ids off the work queue, runs one
//! translation attempt per delivery, and records the outcome.
//!
//! Exposed as a library so integration tests can drive [`ChunkWorker`]
//! and [`WorkerPool`] directly.

pub mod config;
pub mod pool;
pub mod processor;
pub mod recovery;
pub mod translator;

pub use pool::WorkerPool;
pub use processor::{ChunkOutcome, ChunkWorker};
