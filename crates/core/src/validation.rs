//! Input checks applied before a job is created.

use crate::error::CoreError;

/// Longest accepted `target_lang` value.
pub const MAX_TARGET_LANG_LEN: usize = 32;

/// Largest accepted `chunk_size`.
pub const MAX_CHUNK_SIZE: usize = 100_000;

/// Longest accepted source text, in characters.
pub const MAX_SOURCE_CHARS: usize = 1_000_000;

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate a target language tag: non-blank and at most
/// [`MAX_TARGET_LANG_LEN`] characters.
pub fn validate_target_lang(target_lang: &str) -> Result<(), CoreError> {
    if target_lang.trim().is_empty() {
        return Err(CoreError::Validation(
            "target_lang must not be blank".to_string(),
        ));
    }
    let len = target_lang.chars().count();
    if len > MAX_TARGET_LANG_LEN {
        return Err(CoreError::Validation(format!(
            "target_lang must be at most {MAX_TARGET_LANG_LEN} characters, got {len}"
        )));
    }
    Ok(())
}

/// Validate an explicit chunk size: between 1 and [`MAX_CHUNK_SIZE`].
pub fn validate_chunk_size(chunk_size: usize) -> Result<(), CoreError> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(CoreError::Validation(format!(
            "chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {chunk_size}"
        )));
    }
    Ok(())
}

/// Validate the source text length. Empty text is accepted.
pub fn validate_source_text(text: &str) -> Result<(), CoreError> {
    let len = text.chars().count();
    if len > MAX_SOURCE_CHARS {
        return Err(CoreError::Validation(format!(
            "text must be at most {MAX_SOURCE_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
