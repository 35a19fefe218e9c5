//! Text splitting: turns a job's source text into ordered chunks.
//!
//! [`LengthSplitter`] is the default (fixed-width character slices).
//! [`TokenBudgetSplitter`] keeps paragraphs together under an approximate
//! token budget, falling back to sentence blocks for oversized paragraphs.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default chunk width in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 240;

/// Default token budget per chunk for [`TokenBudgetSplitter`].
pub const DEFAULT_TOKEN_BUDGET: usize = 1400;

/// Weight of a word in the token estimate.
const TOKENS_PER_WORD: f64 = 1.25;

/// Weight of a punctuation mark in the token estimate.
const TOKENS_PER_PUNCTUATION: f64 = 0.5;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}_'-]+").expect("valid regex"));

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\s\p{L}\p{N}_]").expect("valid regex"));

const PARAGRAPH_SEPARATOR: &str = "\n\n";

const SENTENCE_SEPARATOR: &str = " ";

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Splitter trait
// ---------------------------------------------------------------------------

/// Splits source text into an ordered sequence of chunks.
///
/// Implementations are pure. Callers substitute a single empty chunk when
/// the result is empty.
pub trait TextSplitter: Send + Sync {
    fn split(&self, text: &str, chunk_size: usize) -> Vec<String>;
}

/// Fixed-width slicing by characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthSplitter;

impl TextSplitter for LengthSplitter {
    fn split(&self, text: &str, chunk_size: usize) -> Vec<String> {
        split_into_chunks(text, chunk_size)
    }
}

/// Paragraph/sentence-aware splitting; `chunk_size` is a token budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudgetSplitter;

impl TextSplitter for TokenBudgetSplitter {
    fn split(&self, text: &str, chunk_size: usize) -> Vec<String> {
        split_by_token_budget(text, chunk_size)
    }
}

// ---------------------------------------------------------------------------
// Length-bounded slicing
// ---------------------------------------------------------------------------

/// Slice `text` into consecutive pieces of at most `chunk_size` characters.
///
/// Never returns an empty vector: empty input yields a single empty chunk.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let width = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<String> = chars
        .chunks(width)
        .map(|piece| piece.iter().collect())
        .collect();

    if chunks.is_empty() {
        vec![String::new()]
    } else {
        chunks
    }
}

// ---------------------------------------------------------------------------
// Token-budget splitting
// ---------------------------------------------------------------------------

/// Rough token estimate: words weigh 1.25, punctuation marks 0.5.
pub fn count_approx_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let words = WORD_RE.find_iter(text).count() as f64;
    let punctuation = PUNCTUATION_RE.find_iter(text).count() as f64;
    (words * TOKENS_PER_WORD + punctuation * TOKENS_PER_PUNCTUATION).ceil() as usize
}

fn normalize_paragraph(paragraph: &str) -> String {
    WHITESPACE_RE.replace_all(paragraph, " ").trim().to_string()
}

/// Split after sentence terminators (`.`, `!`, `?`, `…`) followed by whitespace.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for ws in WHITESPACE_RE.find_iter(paragraph) {
        let ends_sentence = paragraph[..ws.start()]
            .chars()
            .next_back()
            .is_some_and(|c| matches!(c, '.' | '!' | '?' | '…'));
        if ends_sentence {
            sentences.push(&paragraph[start..ws.start()]);
            start = ws.end();
        }
    }
    sentences.push(&paragraph[start..]);
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Group paragraphs into chunks whose estimated token count stays under
/// `token_budget`.
///
/// A paragraph larger than the budget is emitted on its own, broken into
/// sentence blocks. Every chunk but the last keeps the separator that
/// followed it (`"\n\n"` between paragraphs, `" "` between sentences), so
/// concatenating the chunks yields the normalized text. Returns an empty
/// vector for blank input.
pub fn split_by_token_budget(text: &str, token_budget: usize) -> Vec<String> {
    let paragraphs: Vec<String> = PARAGRAPH_BREAK_RE
        .split(text)
        .map(normalize_paragraph)
        .filter(|p| !p.is_empty())
        .collect();

    // (chunk, separator that follows it)
    let mut pieces: Vec<(String, &'static str)> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;

    for paragraph in paragraphs {
        let p_tokens = count_approx_tokens(&paragraph);

        if p_tokens > token_budget {
            if !current.is_empty() {
                pieces.push((current.join(PARAGRAPH_SEPARATOR), PARAGRAPH_SEPARATOR));
                current.clear();
                current_tokens = 0;
            }

            let mut block: Vec<&str> = Vec::new();
            let mut block_tokens = 0;
            for sentence in split_sentences(&paragraph) {
                let s_tokens = count_approx_tokens(sentence);
                if block_tokens + s_tokens > token_budget && !block.is_empty() {
                    pieces.push((block.join(SENTENCE_SEPARATOR), SENTENCE_SEPARATOR));
                    block = vec![sentence];
                    block_tokens = s_tokens;
                } else {
                    block.push(sentence);
                    block_tokens += s_tokens;
                }
            }
            if !block.is_empty() {
                pieces.push((block.join(SENTENCE_SEPARATOR), PARAGRAPH_SEPARATOR));
            }
            continue;
        }

        if current_tokens + p_tokens > token_budget && !current.is_empty() {
            pieces.push((current.join(PARAGRAPH_SEPARATOR), PARAGRAPH_SEPARATOR));
            current.clear();
            current_tokens = 0;
        }

        current.push(paragraph);
        current_tokens += p_tokens;
    }

    if !current.is_empty() {
        pieces.push((current.join(PARAGRAPH_SEPARATOR), PARAGRAPH_SEPARATOR));
    }

    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (mut chunk, separator))| {
            if i < last {
                chunk.push_str(separator);
            }
            chunk
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_split_slices_by_width() {
        assert_eq!(split_into_chunks("abcdefg", 3), vec!["abc", "def", "g"]);
    }

    #[test]
    fn length_split_empty_text_yields_one_empty_chunk() {
        assert_eq!(split_into_chunks("", 240), vec![String::new()]);
    }

    #[test]
    fn length_split_counts_characters_not_bytes() {
        let chunks = split_into_chunks("привет", 4);
        assert_eq!(chunks, vec!["прив", "ет"]);
    }

    #[test]
    fn length_split_concatenation_restores_text() {
        let text = "The quick brown fox jumps over the lazy dog.";
        for size in [1, 5, 7, 100] {
            assert_eq!(split_into_chunks(text, size).concat(), text);
        }
    }

    #[test]
    fn zero_width_is_treated_as_one() {
        assert_eq!(split_into_chunks("ab", 0), vec!["a", "b"]);
    }

    #[test]
    fn token_estimate() {
        assert_eq!(count_approx_tokens(""), 0);
        // 2 words * 1.25 + 1 punctuation * 0.5 = 3.0
        assert_eq!(count_approx_tokens("Hello world!"), 3);
        // 1 word -> 1.25 -> ceil 2
        assert_eq!(count_approx_tokens("word"), 2);
    }

    #[test]
    fn paragraphs_are_grouped_under_budget() {
        let text = "one two\n\nthree four\n\nfive six";
        // Each paragraph is 3 tokens (2 * 1.25 = 2.5 -> ceil 3).
        let chunks = split_by_token_budget(text, 6);
        assert_eq!(chunks, vec!["one two\n\nthree four\n\n", "five six"]);
    }

    #[test]
    fn token_chunks_concatenate_back_to_paragraphs() {
        let text = "one two\n\nthree four\n\n\nfive six. seven eight. nine ten\n\neleven";
        let chunks = split_by_token_budget(text, 6);
        assert!(chunks.len() > 2);
        assert_eq!(
            chunks.concat(),
            "one two\n\nthree four\n\nfive six. seven eight. nine ten\n\neleven"
        );
        assert!(!chunks.last().unwrap().ends_with(char::is_whitespace));
    }

    #[test]
    fn paragraph_whitespace_is_normalized() {
        let chunks = split_by_token_budget("  a\tb \n c  ", 100);
        assert_eq!(chunks, vec!["a b c"]);
    }

    #[test]
    fn oversized_paragraph_breaks_on_sentences() {
        let text = "Alpha beta gamma. Delta epsilon zeta! Eta theta iota?";
        let chunks = split_by_token_budget(text, 6);
        assert_eq!(
            chunks,
            vec!["Alpha beta gamma. ", "Delta epsilon zeta! ", "Eta theta iota?"]
        );
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(split_by_token_budget("\n\n   \n\n", 10).is_empty());
    }

    #[test]
    fn splitters_dispatch_through_trait() {
        let splitter: &dyn TextSplitter = &LengthSplitter;
        assert_eq!(splitter.split("abcd", 2), vec!["ab", "cd"]);
        let splitter: &dyn TextSplitter = &TokenBudgetSplitter;
        assert_eq!(splitter.split("a b", 100), vec!["a b"]);
    }
}
