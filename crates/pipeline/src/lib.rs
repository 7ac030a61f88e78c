//! Session coordination and pipeline stages
//!
//! One user utterance flows through transcription, context fetch, retrieval,
//! generation, and synthesis under a single coordinator that fans out the
//! independent stages, enforces per-stage timeouts, and streams progress
//! events to the caller.

pub mod context;
pub mod coordinator;
pub mod session;
pub mod stt;
pub mod tts;

pub use context::ProfileContextSource;
pub use coordinator::{CoordinatorConfig, SessionCoordinator, SessionInput, StageBackends};
pub use session::{Session, SessionRegistry};
pub use stt::{WhisperTranscriber, FALLBACK_TRANSCRIPT};
pub use tts::{sanitize_text, strip_markdown, DeepgramSynthesizer, MAX_TTS_CHARS};

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session limit reached ({0} active)")]
    SessionLimitReached(usize),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}
