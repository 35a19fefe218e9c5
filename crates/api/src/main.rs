use std::sync::Arc;
use std::time::Duration;

use giga_api::config::{ServerConfig, SplitterKind};
use giga_api::router::build_app_router;
use giga_api::state::AppState;
use giga_core::chunking::DEFAULT_TOKEN_BUDGET;
use giga_core::translator::Translator;
use giga_pipeline::JobService;
use giga_queue::{MemoryWorkQueue, PgWorkQueue, WorkQueue};
use giga_worker::config::{QueueBackend, WorkerConfig};
use giga_worker::translator::{ChatTranslator, UppercaseTranslator};
use giga_worker::{recovery, ChunkWorker, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "giga_api=debug,giga_pipeline=debug,giga_queue=info,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let mut worker_config = WorkerConfig::from_env();
    if config.splitter == SplitterKind::TokenBudget && std::env::var("DEFAULT_CHUNK_SIZE").is_err()
    {
        worker_config.default_chunk_size = DEFAULT_TOKEN_BUDGET;
    }
    tracing::info!(
        host = %config.host,
        port = config.port,
        splitter = ?config.splitter,
        queue_backend = ?worker_config.queue_backend,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = giga_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    giga_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    giga_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Work queue and job service ---
    let queue: Arc<dyn WorkQueue> = match worker_config.queue_backend {
        QueueBackend::Postgres => Arc::new(
            PgWorkQueue::connect(pool.clone())
                .await
                .expect("Failed to start Postgres work queue"),
        ),
        QueueBackend::Memory => Arc::new(MemoryWorkQueue::new()),
    };

    let jobs = JobService::new(
        pool.clone(),
        Arc::clone(&queue),
        config.splitter.build(),
        worker_config.job_service_config(),
    );

    // --- Embedded workers (in-memory queue only) ---
    let cancel = CancellationToken::new();
    let mut background = Vec::new();
    if worker_config.queue_backend == QueueBackend::Memory {
        let requeued = jobs
            .requeue_pending()
            .await
            .expect("Failed to rebuild in-memory queue");
        recovery::sweep_once(&jobs).await;
        tracing::info!(requeued, "In-memory queue rebuilt; running embedded workers");

        let translator: Arc<dyn Translator> = match &worker_config.llm {
            Some(llm) => {
                Arc::new(ChatTranslator::from_config(llm).expect("Failed to build LLM client"))
            }
            None => Arc::new(UppercaseTranslator::new()),
        };
        let worker = Arc::new(ChunkWorker::new(jobs.clone(), translator));
        background.extend(
            WorkerPool::new(
                worker,
                worker_config.concurrency,
                worker_config.dequeue_timeout,
            )
            .start(cancel.clone()),
        );
        background.push(tokio::spawn(recovery::run(
            jobs.clone(),
            worker_config.recovery_interval,
            cancel.clone(),
        )));
    }

    // --- App state and router ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        jobs,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(%addr, "Server listening");

    // Open event streams only end once the queue closes its subscribers,
    // so the queue shuts down before the server waits on connections.
    let shutdown_queue = Arc::clone(&queue);
    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_cancel.cancel();
            shutdown_queue.shutdown().await;
        })
        .await
        .expect("Server error");

    // --- Shutdown ---
    let drain = async {
        for handle in background {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(30), drain)
        .await
        .is_err()
    {
        tracing::warn!("Embedded workers did not stop in time");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
