//! [`Translator`](giga_core::translator::Translator) implementations.
//!
//! - [`UppercaseTranslator`]: offline stand-in used when no model endpoint
//!   is configured.
//! - [`ChatTranslator`]: calls an OpenAI-compatible chat-completions
//!   endpoint through [`LlmClient`].

pub mod demo;
pub mod llm;

pub use demo::UppercaseTranslator;
pub use llm::{ChatTranslator, LlmClient, LlmConfig, LlmError};
