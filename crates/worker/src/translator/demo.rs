use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use giga_core::translator::{TranslateError, Translator};
use tokio::sync::Mutex;

/// Marker that makes the first attempt on a chunk fail.
pub const FAIL_ONCE_MARKER: &str = "[fail-once]";

/// Simulated latency of one translation.
const DEFAULT_DELAY: Duration = Duration::from_millis(250);

/// Upper-cases the text and appends ` [<lang>]`, keeping any trailing
/// whitespace after the tag.
///
/// Chunks containing [`FAIL_ONCE_MARKER`] alternate: an attempt fails, the
/// next one on the same text succeeds with the marker stripped. Texts are
/// only remembered between those two attempts.
pub struct UppercaseTranslator {
    delay: Duration,
    pending_retry: Mutex<HashSet<String>>,
}

impl UppercaseTranslator {
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            pending_retry: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for UppercaseTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for UppercaseTranslator {
    async fn translate(
        &self,
        source_text: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if source_text.contains(FAIL_ONCE_MARKER) {
            let mut pending = self.pending_retry.lock().await;
            if !pending.remove(source_text) {
                pending.insert(source_text.to_string());
                return Err(TranslateError::new(
                    "Injected chunk failure for retry validation",
                ));
            }
        }

        let body = source_text.trim_end();
        let trailing = &source_text[body.len()..];
        let text = body.replace(FAIL_ONCE_MARKER, "");
        Ok(format!("{} [{target_lang}]{trailing}", text.to_uppercase()))
    }
}
