use std::sync::Arc;

use giga_pipeline::JobService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool and the job service are handle types.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: giga_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Job creation, queries, and the per-job event channel.
    pub jobs: JobService,
}
