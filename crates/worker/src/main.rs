use std::sync::Arc;
use std::time::Duration;

use giga_core::chunking::LengthSplitter;
use giga_core::translator::Translator;
use giga_pipeline::JobService;
use giga_queue::{MemoryWorkQueue, PgWorkQueue, WorkQueue};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use giga_worker::config::{QueueBackend, WorkerConfig};
use giga_worker::translator::{ChatTranslator, UppercaseTranslator};
use giga_worker::{recovery, ChunkWorker, WorkerPool};

/// How long shutdown waits for in-flight chunks to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "giga_worker=debug,giga_pipeline=debug,giga_queue=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        queue_backend = ?config.queue_backend,
        stale_after_secs = config.stale_after.as_secs(),
        "Loaded worker configuration"
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

    // --- Work queue ---
    let queue: Arc<dyn WorkQueue> = match config.queue_backend {
        QueueBackend::Postgres => Arc::new(
            PgWorkQueue::connect(pool.clone())
                .await
                .expect("Failed to start Postgres work queue"),
        ),
        QueueBackend::Memory => Arc::new(MemoryWorkQueue::new()),
    };

    let service = JobService::new(
        pool.clone(),
        Arc::clone(&queue),
        Arc::new(LengthSplitter),
        config.job_service_config(),
    );

    if config.queue_backend == QueueBackend::Memory {
        let requeued = service
            .requeue_pending()
            .await
            .expect("Failed to rebuild in-memory queue");
        tracing::info!(requeued, "In-memory queue rebuilt from store");
    }

    // --- Startup recovery ---
    recovery::sweep_once(&service).await;

    // --- Translator ---
    let translator: Arc<dyn Translator> = match &config.llm {
        Some(llm) => {
            tracing::info!(model = %llm.model, endpoint = %llm.endpoint(), "Using LLM translator");
            Arc::new(ChatTranslator::from_config(llm).expect("Failed to build LLM client"))
        }
        None => {
            tracing::warn!("LLM_BASE_URL not set, using the demo uppercase translator");
            Arc::new(UppercaseTranslator::new())
        }
    };

    // --- Worker pool and sweeper ---
    let cancel = CancellationToken::new();
    let worker = Arc::new(ChunkWorker::new(service.clone(), translator));
    let worker_handles =
        WorkerPool::new(worker, config.concurrency, config.dequeue_timeout).start(cancel.clone());
    let sweeper_handle = tokio::spawn(recovery::run(
        service.clone(),
        config.recovery_interval,
        cancel.clone(),
    ));

    tracing::info!("Worker started");

    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Worker loops did not stop in time; remaining chunks will be recovered");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;

    queue.shutdown().await;
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
