//! Pipeline stage traits
//!
//! The session coordinator holds each stage as a trait object so backends
//! are injectable and the pipeline is testable with mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retrieval::{InstructionMatch, RetrieveOptions};
use crate::voice::VoiceSelection;
use crate::Result;

/// Opaque audio input for one utterance. `data` is base64, optionally
/// carrying a `data:<mime>;base64,` prefix which adapters strip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    pub data: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "audio/webm".to_string()
}

impl AudioPayload {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into(), mime_type: default_mime() }
    }

    /// Base64 body with any data-URL prefix removed
    pub fn base64_body(&self) -> &str {
        match self.data.split_once(";base64,") {
            Some((_, body)) => body,
            None => &self.data,
        }
    }
}

/// Transcription result. `fallback` marks the degraded placeholder path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub fallback: bool,
}

/// User/business context for grounding the assistant.
///
/// A fetch failure yields `{ cached: false, error: true }` with the user id
/// preserved so prompt assembly can still reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub cached: bool,
    pub error: bool,
    #[serde(default)]
    pub profile: Option<Value>,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl UserContext {
    /// Error-tagged empty context used when the fetch fails
    pub fn errored(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cached: false,
            error: true,
            profile: None,
            team_id: None,
        }
    }
}

/// Result of a synthesis attempt. Cloud failure is not an error; it becomes
/// a browser-fallback instruction for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Primary {
        audio_base64: String,
        audio_url: String,
        format: String,
        voice: String,
    },
    BrowserFallback {
        text: String,
        voice: String,
        voice_description: String,
    },
}

impl SynthesisOutcome {
    /// Backend tag carried in the emitted event
    pub fn service(&self) -> &'static str {
        match self {
            SynthesisOutcome::Primary { .. } => "deepgram",
            SynthesisOutcome::BrowserFallback { .. } => "browser",
        }
    }
}

/// Speech-to-text adapter. Never fails: adapter errors degrade to a fixed
/// placeholder transcript with `fallback: true`. One attempt per utterance.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, audio: &AudioPayload) -> Transcript;
}

/// Context fetch. Never fails: errors degrade to an error-tagged empty
/// context. Runs concurrently with transcription.
#[async_trait]
pub trait ContextSource: Send + Sync + 'static {
    async fn fetch(&self, user_id: &str) -> UserContext;
}

/// Retrieval of role-visible knowledge snippets for a query. An error here
/// is not fatal to the session; the coordinator degrades to no context.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync + 'static {
    async fn retrieve(&self, query: &str, options: &RetrieveOptions)
        -> Result<Vec<InstructionMatch>>;
}

/// LLM reply generation. Failure is fatal to the session.
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    async fn generate(&self, messages: &[crate::ChatMessage]) -> Result<String>;
}

/// Text-to-speech with the two-tier primary/browser-fallback contract.
/// Never fails: a primary-backend failure becomes a fallback outcome.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> SynthesisOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockTranscriber;

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, _audio: &AudioPayload) -> Transcript {
            Transcript { text: "mock transcript".to_string(), fallback: false }
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let stt: Box<dyn Transcriber> = Box::new(MockTranscriber);
        let result = stt.transcribe(&AudioPayload::new("aGVsbG8=")).await;
        assert_eq!(result.text, "mock transcript");
        assert!(!result.fallback);
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let payload = AudioPayload::new("data:audio/webm;base64,aGVsbG8=");
        assert_eq!(payload.base64_body(), "aGVsbG8=");

        let bare = AudioPayload::new("aGVsbG8=");
        assert_eq!(bare.base64_body(), "aGVsbG8=");
    }

    #[test]
    fn test_errored_context_is_tagged() {
        let ctx = UserContext::errored("user-1");
        assert_eq!(ctx.user_id, "user-1");
        assert!(!ctx.cached);
        assert!(ctx.error);
        assert!(ctx.profile.is_none());
    }

    #[test]
    fn test_synthesis_service_tags() {
        let fallback = SynthesisOutcome::BrowserFallback {
            text: "hi".into(),
            voice: "aura-asteria-en".into(),
            voice_description: "desc".into(),
        };
        assert_eq!(fallback.service(), "browser");
    }
}
