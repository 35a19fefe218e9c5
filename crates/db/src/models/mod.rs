//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the projections and inputs its repository needs.

pub mod chunk;
pub mod job;
