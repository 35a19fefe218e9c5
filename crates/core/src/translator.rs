//! The translation seam.
//!
//! The worker treats a translator as an opaque, possibly slow, possibly
//! failing function. Any `Err` sends the chunk down the retry path; the
//! error text becomes the chunk's `last_error`.

use async_trait::async_trait;

/// A failed translation attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TranslateError(pub String);

impl TranslateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Translates one chunk of source text into `target_lang`.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, source_text: &str, target_lang: &str)
        -> Result<String, TranslateError>;
}
