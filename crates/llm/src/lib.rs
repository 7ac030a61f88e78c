//! Chat model backends and prompt assembly
//!
//! A primary OpenAI-compatible backend with an optional Gemini-style
//! fallback. Generation failure across the whole chain is fatal to the
//! session; there is no degraded reply.

pub mod backend;
pub mod prompt;

pub use backend::{ChatBackend, ChatClient, GeminiBackend, LlmConfig, OpenAiCompatBackend};
pub use prompt::{build_messages, PromptInputs, SYSTEM_PROMPT_CAP};

use thiserror::Error;

/// LLM errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("all backends failed: {0}")]
    AllBackendsFailed(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for opsvoice_core::Error {
    fn from(err: LlmError) -> Self {
        opsvoice_core::Error::backend("llm", err.to_string())
    }
}
