//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use giga_core::job_events::JobEvent;
use giga_core::status::JobStatus;
use giga_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// SSE event name of the first frame on every stream.
pub const EVENT_SNAPSHOT: &str = "snapshot";

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub text: String,
    pub target_lang: String,
    /// Overrides the configured default chunk size.
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CreatedJob {
    pub id: DbId,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Split, persist and enqueue a translation job. Returns 201 with its id.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let id = state
        .jobs
        .create_job(&input.text, &input.target_lang, input.chunk_size)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedJob { id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{id}/result
///
/// 200 with `text` once the job is `done`; 202 with `text: null` before.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let result = state.jobs.get_job_result(job_id).await?;
    let status = if result.text.is_some() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(DataResponse { data: result })))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/events
///
/// Server-sent events. The first frame (`snapshot`) carries the job as
/// currently stored; live events follow, named by their `type`. The stream
/// closes after a terminal `job_status`.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // Subscribe before reading the snapshot so nothing falls in between.
    let mut events = state.jobs.queue().subscribe(job_id).await?;
    let job = state.jobs.get_job(job_id).await?;

    tracing::debug!(%job_id, status = %job.status, "Job event stream opened");

    let stream = async_stream::stream! {
        let finished = is_finished(job.status);
        yield Event::default().event(EVENT_SNAPSHOT).json_data(&job);
        if finished {
            return;
        }

        while let Some(event) = events.next().await {
            let last = matches!(
                &event,
                JobEvent::JobStatus { status, .. } if is_finished(*status)
            );
            yield Event::default().event(event.event_type()).json_data(&event);
            if last {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn is_finished(status: JobStatus) -> bool {
    matches!(status, JobStatus::Done | JobStatus::Failed)
}
