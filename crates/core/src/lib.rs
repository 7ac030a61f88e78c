//! Core traits and types for the opsvoice pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Stage traits for pluggable backends (STT, context, retrieval, LLM, TTS)
//! - Stream event envelope emitted to callers during a session
//! - Voice configuration and the fixed voice lookup table
//! - Conversation history types
//! - Error types

pub mod conversation;
pub mod error;
pub mod event;
pub mod retrieval;
pub mod traits;
pub mod voice;

pub use conversation::{recent_history, ChatMessage, ChatRole, MAX_HISTORY_TURNS};
pub use error::{Error, Result};
pub use event::{SessionEvent, StageTimings, StreamEvent};
pub use retrieval::{InstructionMatch, RetrieveOptions, WILDCARD_ROLE};
pub use traits::{
    AudioPayload, ChatModel, ContextSource, KnowledgeRetriever, SpeechSynthesizer,
    SynthesisOutcome, Transcriber, Transcript, UserContext,
};
pub use voice::{resolve_voice, voice_description, Accent, VoiceGender, VoiceSelection};
