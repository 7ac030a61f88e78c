//! Stream events emitted to the caller during a session
//!
//! Events are immutable, created the moment a stage produces a result and
//! transmitted immediately. Within one session they follow pipeline order
//! (transcription before generation before synthesis); the context-loaded
//! event may interleave since it races transcription. Exactly one terminal
//! event is emitted per session, either `complete` or `error`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Per-stage wall-clock durations reported in the terminal `complete` event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub stt_ms: u64,
    pub context_ms: u64,
    pub generation_ms: u64,
    pub synthesis_ms: u64,
}

/// Pipeline progress payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Acknowledgment that the session is registered and running
    Started,
    /// Transcription resolved; `fallback` marks the degraded placeholder path
    Transcription { text: String, fallback: bool },
    /// User/business context resolved (possibly error-tagged empty)
    ContextLoaded { cached: bool, error: bool },
    /// A chunk of generated reply text
    GenerationChunk { text: String },
    /// Cloud synthesis succeeded
    SynthesisReady {
        audio_base64: String,
        audio_url: String,
        format: String,
        voice: String,
        service: String,
    },
    /// Cloud synthesis failed; the client should synthesize locally
    SynthesisFallback {
        text: String,
        voice: String,
        voice_description: String,
        service: String,
    },
    /// Terminal: pipeline finished
    Complete {
        transcript: String,
        reply: String,
        timings: StageTimings,
    },
    /// Terminal: a fatal stage failure
    Error { stage: String, message: String },
}

impl StreamEvent {
    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Envelope tying an event to its session and emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, event: StreamEvent) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            event,
        }
    }
}
