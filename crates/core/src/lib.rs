//! Domain types and pure logic for the chunked translation pipeline.
//!
//! Zero internal dependencies: everything here is shared by the store,
//! queue, job service, worker and HTTP crates.

pub mod chunking;
pub mod error;
pub mod job_events;
pub mod status;
pub mod translator;
pub mod types;
pub mod validation;
