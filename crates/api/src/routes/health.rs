use axum::extract::State;
use axum::{routing::get, Json, Router};
use giga_db::models::chunk::ChunkBacklog;
use giga_db::repositories::ChunkRepo;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Chunks waiting for or held by workers; absent when the store is down.
    pub backlog: Option<ChunkBacklog>,
}

/// GET /health
///
/// Service and database health plus the translation backlog.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backlog = match ChunkRepo::backlog(&state.pool).await {
        Ok(backlog) => Some(backlog),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not read the chunk backlog");
            None
        }
    };
    let db_healthy = backlog.is_some();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        backlog,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
