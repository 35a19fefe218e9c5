//! Chat-completions client with timeout, bounded retries and back-off.
//!
//! [`LlmClient::post_json`] retries on HTTP 429, 5xx, timeouts and
//! connection errors. The delay before a retry honours `Retry-After`
//! (delta-seconds or HTTP date) and otherwise grows exponentially from
//! [`DEFAULT_BASE_BACKOFF`] up to [`DEFAULT_MAX_BACKOFF`] plus random
//! jitter. Every attempt is logged with its size, duration and request id;
//! payload contents never are.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use giga_core::translator::{TranslateError, Translator};
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::config::env_or;

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// First back-off step.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Back-off ceiling before jitter.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Longest wait honoured from a `Retry-After` header.
pub const RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

/// Jitter never exceeds this, whatever the delay.
const MAX_JITTER: Duration = Duration::from_secs(1);

/// Share of the delay used as the jitter range.
const JITTER_RATIO: f64 = 0.3;

const SYSTEM_PROMPT: &str = "You are a professional translator. Keep meaning and style accurate.";

/// Headers checked, in order, for a provider request id.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "request-id", "x-amzn-requestid"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Model endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl LlmConfig {
    /// Load from the environment. Returns `None` when `LLM_BASE_URL` is
    /// unset.
    ///
    /// | Env Var            | Default    |
    /// |--------------------|------------|
    /// | `LLM_BASE_URL`     | (none)     |
    /// | `LLM_API_KEY`      | (none)     |
    /// | `LLM_MODEL`        | `GigaChat` |
    /// | `LLM_TIMEOUT_SECS` | `45`       |
    /// | `LLM_MAX_RETRIES`  | `5`        |
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("LLM_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "GigaChat".into());
        let timeout_secs: u64 = env_or("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs());
        let max_retries: u32 = env_or("LLM_MAX_RETRIES", DEFAULT_MAX_RETRIES);

        Some(Self {
            base_url,
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        })
    }

    /// Longest one translation can legitimately run: every try hitting the
    /// timeout, plus the longest wait before each retry.
    pub fn max_attempt_duration(&self) -> Duration {
        let tries = self.max_retries.saturating_add(1);
        let waits = (DEFAULT_MAX_BACKOFF + MAX_JITTER).saturating_mul(self.max_retries);
        self.timeout.saturating_mul(tries).saturating_add(waits)
    }

    /// Full chat-completions URL.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Network, DNS, TLS or timeout failure.
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("LLM request failed with status {status} (request id {request_id})")]
    HttpStatus {
        status: u16,
        request_id: String,
        body: String,
    },

    #[error("LLM returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("LLM response does not contain translated text")]
    EmptyCompletion,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A successful exchange.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub request_id: String,
    pub status: u16,
    pub duration: Duration,
    pub body: String,
}

/// POSTs JSON payloads to one model endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.endpoint(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        })
    }

    /// Override the back-off schedule.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    /// POST `payload`, retrying transient failures up to `max_retries`
    /// times.
    pub async fn post_json(&self, payload: &serde_json::Value) -> Result<LlmResponse, LlmError> {
        let body = serde_json::to_string(payload)?;
        let input_bytes = body.len();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let started = Instant::now();

            let mut request = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        input_bytes,
                        output_bytes = 0,
                        error = %e,
                        "LLM request error",
                    );
                    if !is_retriable_error(&e) || attempt > self.max_retries {
                        return Err(e.into());
                    }
                    let delay = backoff_with_jitter(attempt, self.base_backoff, self.max_backoff);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            let request_id = request_id(response.headers());
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            let text = response.text().await?;
            let duration = started.elapsed();

            if status.is_success() {
                tracing::info!(
                    attempt,
                    %request_id,
                    status = status.as_u16(),
                    duration_ms = duration.as_millis() as u64,
                    input_bytes,
                    output_bytes = text.len(),
                    "LLM request",
                );
                return Ok(LlmResponse {
                    request_id,
                    status: status.as_u16(),
                    duration,
                    body: text,
                });
            }

            tracing::warn!(
                attempt,
                %request_id,
                status = status.as_u16(),
                duration_ms = duration.as_millis() as u64,
                input_bytes,
                output_bytes = text.len(),
                "LLM request",
            );

            if !is_retriable_status(status) || attempt > self.max_retries {
                return Err(LlmError::HttpStatus {
                    status: status.as_u16(),
                    request_id,
                    body: text,
                });
            }

            let delay = match retry_after {
                Some(wait) => wait.min(self.max_backoff),
                None => backoff_with_jitter(attempt, self.base_backoff, self.max_backoff),
            };
            tracing::warn!(
                attempt,
                %request_id,
                status = status.as_u16(),
                retry_in_ms = delay.as_millis() as u64,
                "LLM retry scheduled",
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Translates chunks with a chat-completions model.
pub struct ChatTranslator {
    client: LlmClient,
    model: String,
}

impl ChatTranslator {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::new(LlmClient::new(config)?, config.model.clone()))
    }

    async fn complete(&self, source_text: &str, target_lang: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Translate to {target_lang}:\n\n{source_text}"),
                },
            ],
            "temperature": 0.2,
        });

        let response = self.client.post_json(&payload).await?;
        let completion: ChatCompletion = serde_json::from_str(&response.body)?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[async_trait]
impl Translator for ChatTranslator {
    async fn translate(
        &self,
        source_text: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        // Nothing to translate; the model would only echo noise back.
        if source_text.trim().is_empty() {
            return Ok(source_text.to_string());
        }
        // The completion is trimmed, so the chunk's trailing separator is
        // carried over here.
        let body = source_text.trim_end();
        let trailing = &source_text[body.len()..];
        let translated = self
            .complete(body, target_lang)
            .await
            .map_err(|e| TranslateError::new(e.to_string()))?;
        Ok(format!("{translated}{trailing}"))
    }
}

// ---------------------------------------------------------------------------
// Retry helpers
// ---------------------------------------------------------------------------

fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retriable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn request_id(headers: &HeaderMap) -> String {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date relative to
/// `now`. Dates in the past yield zero; anything longer than
/// [`RETRY_AFTER_CAP`] yields the cap.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_nan() || secs < 0.0 {
            return None;
        }
        return Some(
            Duration::try_from_secs_f64(secs).map_or(RETRY_AFTER_CAP, |d| d.min(RETRY_AFTER_CAP)),
        );
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO).min(RETRY_AFTER_CAP))
}

/// Exponential delay for `attempt` (1-based), capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// [`backoff_delay`] plus up to 30% (at most one second) of random jitter.
pub fn backoff_with_jitter(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = backoff_delay(attempt, base, max);
    let range = delay.mul_f64(JITTER_RATIO).min(MAX_JITTER);
    let range_ms = range.as_millis() as u64;
    if range_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..range_ms))
}
