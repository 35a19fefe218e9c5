use std::str::FromStr;
use std::sync::Arc;

use giga_core::chunking::{LengthSplitter, TextSplitter, TokenBudgetSplitter};

/// Which [`TextSplitter`] new jobs are chunked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterKind {
    /// Fixed-width character slices; `chunk_size` counts characters.
    Length,
    /// Paragraph/sentence packing; `chunk_size` is a token budget.
    TokenBudget,
}

impl SplitterKind {
    pub fn build(self) -> Arc<dyn TextSplitter> {
        match self {
            Self::Length => Arc::new(LengthSplitter),
            Self::TokenBudget => Arc::new(TokenBudgetSplitter),
        }
    }
}

impl FromStr for SplitterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "length" => Ok(Self::Length),
            "token" | "tokens" | "token_budget" => Ok(Self::TokenBudget),
            other => Err(format!("unknown splitter '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Job and queue
/// settings are shared with the worker and come from
/// [`WorkerConfig`](giga_worker::config::WorkerConfig).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Event streams are
    /// exempt.
    pub request_timeout_secs: u64,
    /// Splitter for new jobs (default: `length`).
    pub splitter: SplitterKind,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `CHUNK_SPLITTER`       | `length`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let splitter: SplitterKind = std::env::var("CHUNK_SPLITTER")
            .unwrap_or_else(|_| "length".into())
            .parse()
            .unwrap_or_else(|e| panic!("CHUNK_SPLITTER: {e}"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            splitter,
        }
    }
}
