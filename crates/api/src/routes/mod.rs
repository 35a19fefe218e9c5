pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                     create (POST)
/// /jobs/{id}                status and chunk counts
/// /jobs/{id}/result         reassembled text (202 until done)
/// /jobs/{id}/events         server-sent events: snapshot, then live events
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}
