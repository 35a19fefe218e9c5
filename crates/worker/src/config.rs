use std::str::FromStr;
use std::time::Duration;

use giga_core::chunking::DEFAULT_CHUNK_SIZE;
use giga_pipeline::JobServiceConfig;

use crate::translator::llm::LlmConfig;

/// Staleness window when neither `WORKER_STALE_SECONDS` nor an LLM is set.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Slack added over the slowest model call when the window is derived.
const STALE_MARGIN: Duration = Duration::from_secs(30);

/// Which [`WorkQueue`](giga_queue::WorkQueue) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// `translation_chunk_queue` table with `LISTEN/NOTIFY` wake-ups.
    Postgres,
    /// In-process FIFO, rebuilt from the store at startup.
    Memory,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown queue backend '{other}'")),
        }
    }
}

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent dequeue loops.
    pub concurrency: usize,
    /// Upper bound on a single blocking dequeue.
    pub dequeue_timeout: Duration,
    /// `running` chunks older than this are reclaimed.
    pub stale_after: Duration,
    /// Period of the recovery sweep.
    pub recovery_interval: Duration,
    /// Attempt ceiling written on new chunks.
    pub max_attempts: i32,
    /// Chunk size used when a job does not specify one.
    pub default_chunk_size: usize,
    pub queue_backend: QueueBackend,
    /// Present when `LLM_BASE_URL` is set; otherwise the demo translator runs.
    pub llm: Option<LlmConfig>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default    |
    /// |--------------------------|------------|
    /// | `WORKER_CONCURRENCY`     | `4`        |
    /// | `DEQUEUE_TIMEOUT_SECS`   | `5`        |
    /// | `WORKER_STALE_SECONDS`   | see below  |
    /// | `RECOVERY_INTERVAL_SECS` | `15`       |
    /// | `CHUNK_MAX_ATTEMPTS`     | `3`        |
    /// | `DEFAULT_CHUNK_SIZE`     | `240`      |
    /// | `QUEUE_BACKEND`          | `postgres` |
    ///
    /// Without `WORKER_STALE_SECONDS` the window is 30s, or the slowest
    /// possible model call plus 30s when an LLM is configured. An explicit
    /// window shorter than that call is rejected.
    ///
    /// Panics on unparseable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let concurrency: usize = env_or("WORKER_CONCURRENCY", 4);
        let dequeue_timeout_secs: u64 = env_or("DEQUEUE_TIMEOUT_SECS", 5);
        let llm = LlmConfig::from_env();
        let stale_after = match std::env::var("WORKER_STALE_SECONDS") {
            Ok(_) => Duration::from_secs(env_or("WORKER_STALE_SECONDS", 0)),
            Err(_) => default_stale_after(llm.as_ref()),
        };
        let recovery_interval_secs: u64 = env_or("RECOVERY_INTERVAL_SECS", 15);
        let max_attempts: i32 = env_or("CHUNK_MAX_ATTEMPTS", 3);
        let default_chunk_size: usize = env_or("DEFAULT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE);
        let queue_backend: QueueBackend = env_or("QUEUE_BACKEND", QueueBackend::Postgres);

        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");
        assert!(max_attempts > 0, "CHUNK_MAX_ATTEMPTS must be at least 1");
        if let Err(msg) = check_stale_window(stale_after, llm.as_ref()) {
            panic!("{msg}");
        }

        Self {
            concurrency,
            dequeue_timeout: Duration::from_secs(dequeue_timeout_secs),
            stale_after,
            recovery_interval: Duration::from_secs(recovery_interval_secs),
            max_attempts,
            default_chunk_size,
            queue_backend,
            llm,
        }
    }

    /// The job service settings this worker process runs with.
    pub fn job_service_config(&self) -> JobServiceConfig {
        JobServiceConfig {
            stale_after: self.stale_after,
            max_attempts: self.max_attempts,
            default_chunk_size: self.default_chunk_size,
        }
    }
}

/// Window used when `WORKER_STALE_SECONDS` is unset.
pub fn default_stale_after(llm: Option<&LlmConfig>) -> Duration {
    llm.map_or(DEFAULT_STALE_AFTER, |llm| {
        llm.max_attempt_duration()
            .saturating_add(STALE_MARGIN)
            .max(DEFAULT_STALE_AFTER)
    })
}

/// A live attempt must never look stale: the window has to outlast the
/// slowest legitimate model call.
pub fn check_stale_window(stale_after: Duration, llm: Option<&LlmConfig>) -> Result<(), String> {
    if stale_after.is_zero() {
        return Err("WORKER_STALE_SECONDS must be at least 1".to_string());
    }
    match llm {
        Some(llm) if stale_after <= llm.max_attempt_duration() => Err(format!(
            "WORKER_STALE_SECONDS ({}s) must exceed the longest model call ({}s = \
             LLM_TIMEOUT_SECS x (LLM_MAX_RETRIES + 1) plus back-off)",
            stale_after.as_secs(),
            llm.max_attempt_duration().as_secs(),
        )),
        _ => Ok(()),
    }
}

/// Read and parse `key`, falling back to `default` when unset.
pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
