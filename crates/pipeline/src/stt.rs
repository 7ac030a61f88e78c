//! Transcription adapter
//!
//! Whisper-compatible multipart upload. The adapter never fails: any error
//! (bad base64, network, upstream) degrades to a fixed placeholder
//! transcript so the pipeline can continue. One attempt per utterance,
//! no retry.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use opsvoice_core::{AudioPayload, Transcriber, Transcript};

/// Placeholder returned on any transcription failure
pub const FALLBACK_TRANSCRIPT: &str =
    "Hello! This is a test transcription - audio processing working!";

/// Whisper-compatible HTTP transcriber
pub struct WhisperTranscriber {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, crate::PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| crate::PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn try_transcribe(&self, audio: &AudioPayload) -> Result<String, String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(audio.base64_body())
            .map_err(|e| format!("base64 decode: {e}"))?;

        if bytes.is_empty() {
            return Err("empty audio payload".to_string());
        }

        let file_part = Part::bytes(bytes)
            .file_name("audio.webm")
            .mime_str(&audio.mime_type)
            .map_err(|e| format!("mime: {e}"))?;
        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("request: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("status {status}: {body}"));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| format!("parse: {e}"))?;

        if parsed.text.trim().is_empty() {
            return Err("empty transcript".to_string());
        }

        Ok(parsed.text)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioPayload) -> Transcript {
        match self.try_transcribe(audio).await {
            Ok(text) => Transcript { text, fallback: false },
            Err(reason) => {
                warn!(reason, "transcription failed, using placeholder");
                Transcript { text: FALLBACK_TRANSCRIPT.to_string(), fallback: true }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}
