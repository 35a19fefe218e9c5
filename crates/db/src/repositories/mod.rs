//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Every chunk transition is a
//! single-row atomic `UPDATE`; only job creation uses a transaction.

pub mod chunk_repo;
pub mod job_repo;

pub use chunk_repo::ChunkRepo;
pub use job_repo::JobRepo;
