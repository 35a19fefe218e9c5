#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use giga_api::config::{ServerConfig, SplitterKind};
use giga_api::router::build_app_router;
use giga_api::state::AppState;
use giga_core::types::DbId;
use giga_pipeline::{JobService, JobServiceConfig};
use giga_queue::{MemoryWorkQueue, WorkQueue};
use giga_worker::translator::UppercaseTranslator;
use giga_worker::{ChunkOutcome, ChunkWorker};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        splitter: SplitterKind::Length,
    }
}

/// Router plus the pieces tests drive directly.
pub struct TestApp {
    pub app: Router,
    pub jobs: JobService,
    pub queue: Arc<MemoryWorkQueue>,
}

impl TestApp {
    /// Run every queued chunk through an instant uppercase translator.
    pub async fn process_all(&self) -> Vec<ChunkOutcome> {
        let worker = ChunkWorker::new(
            self.jobs.clone(),
            Arc::new(UppercaseTranslator::with_delay(Duration::ZERO)),
        );
        let mut outcomes = Vec::new();
        while let Some(chunk_id) = self.queue.dequeue(Duration::ZERO).await.unwrap() {
            outcomes.push(worker.process_chunk(chunk_id).await.unwrap());
        }
        outcomes
    }
}

/// Build the full application stack over the in-memory queue, using the
/// same router builder as `main.rs`.
pub fn build_test_harness(pool: PgPool) -> TestApp {
    let config = test_config();
    let queue = Arc::new(MemoryWorkQueue::new());
    let jobs = JobService::new(
        pool.clone(),
        queue.clone(),
        config.splitter.build(),
        JobServiceConfig::default(),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        jobs: jobs.clone(),
    };

    TestApp {
        app: build_app_router(state, &config),
        jobs,
        queue,
    }
}

/// Build the full application router with all middleware layers.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_harness(pool).app
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST a job and return its id.
pub async fn create_job(app: Router, text: &str, target_lang: &str) -> DbId {
    let response = post_json(
        app,
        "/api/v1/jobs",
        serde_json::json!({ "text": text, "target_lang": target_lang }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["id"].as_str().unwrap().parse().unwrap()
}
