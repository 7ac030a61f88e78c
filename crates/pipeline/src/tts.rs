//! Speech synthesizer
//!
//! Primary backend is Deepgram Aura. Reply text is stripped of markdown
//! syntax, sanitized to a safe character set, and hard-capped before
//! submission. Any primary failure, including an empty audio body, becomes
//! a browser-fallback outcome carrying the original text; synthesis never
//! errors the session.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use opsvoice_core::{voice_description, SpeechSynthesizer, SynthesisOutcome, VoiceSelection};

/// Hard cap on sanitized text submitted to the cloud backend
pub const MAX_TTS_CHARS: usize = 4_000;

static MARKDOWN_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static MARKDOWN_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static MARKDOWN_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static MARKDOWN_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static MARKDOWN_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*+]\s+").unwrap());
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s.,!?;:()\-'"]"#).unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Remove markdown syntax so the voice does not read it aloud
pub fn strip_markdown(text: &str) -> String {
    let text = MARKDOWN_BOLD.replace_all(text, "$1");
    let text = MARKDOWN_EMPHASIS.replace_all(&text, "$1");
    let text = MARKDOWN_HEADER.replace_all(&text, "");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = MARKDOWN_CODE.replace_all(&text, "$1");
    let text = MARKDOWN_LIST.replace_all(&text, "");
    text.into_owned()
}

/// Strip unsafe characters, collapse whitespace, and cap the length
pub fn sanitize_text(text: &str) -> String {
    let text = UNSAFE_CHARS.replace_all(text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();
    match text.char_indices().nth(MAX_TTS_CHARS) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Deepgram Aura synthesizer with browser fallback
pub struct DeepgramSynthesizer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl DeepgramSynthesizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, crate::PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| crate::PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    async fn try_synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, String> {
        let clean = sanitize_text(&strip_markdown(text));
        if clean.is_empty() {
            return Err("no speakable text after sanitizing".to_string());
        }

        let url = format!("{}?model={voice_id}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&SpeakRequest { text: &clean })
            .send()
            .await
            .map_err(|e| format!("request: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("status {status}: {body}"));
        }

        let bytes = response.bytes().await.map_err(|e| format!("body: {e}"))?;
        if bytes.is_empty() {
            return Err("empty audio body".to_string());
        }
        Ok(bytes.to_vec())
    }

    fn browser_fallback(text: &str, voice_id: &str) -> SynthesisOutcome {
        SynthesisOutcome::BrowserFallback {
            text: text.to_string(),
            voice: voice_id.to_string(),
            voice_description: voice_description(voice_id).to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for DeepgramSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> SynthesisOutcome {
        let voice_id = voice.voice_id();
        match self.try_synthesize(text, voice_id).await {
            Ok(audio) => {
                let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&audio);
                let audio_url = format!("data:audio/mp3;base64,{audio_base64}");
                SynthesisOutcome::Primary {
                    audio_base64,
                    audio_url,
                    format: "mp3".to_string(),
                    voice: voice_id.to_string(),
                }
            }
            Err(reason) => {
                warn!(voice = voice_id, reason, "cloud synthesis failed, using browser fallback");
                Self::browser_fallback(text, voice_id)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}
