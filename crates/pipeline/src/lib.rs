//! Job service: creates translation jobs, derives their status from chunk
//! state, answers read queries, and reclaims chunks from vanished workers.
//!
//! [`JobService`] holds the store pool, the [`WorkQueue`](giga_queue::WorkQueue)
//! and the [`TextSplitter`](giga_core::chunking::TextSplitter) it was built
//! with. Both the worker pool and the HTTP layer share one instance.

pub mod error;
pub mod service;

pub use error::PipelineError;
pub use service::{JobResult, JobService, JobServiceConfig, RecoveryReport, StatusSnapshot};
