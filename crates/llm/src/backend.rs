//! Chat backend implementations
//!
//! Primary path is an OpenAI-compatible chat completions API (Groq in
//! production); the fallback is a Gemini-style generateContent API with
//! `assistant` turns normalized to the `model` role.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use opsvoice_core::{ChatMessage, ChatModel, ChatRole};

use crate::LlmError;

/// Backend configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: String::new(),
            max_tokens: 1024,
            temperature: 0.4,
            top_p: 0.95,
            top_k: 40,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One chat backend
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiCompatBackend {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage { role: m.role.api_name(), content: &m.content })
                .collect(),
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(format!("status {status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".to_string()))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Gemini-style generateContent backend
pub struct GeminiBackend {
    client: Client,
    config: LlmConfig,
}

impl GeminiBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        )
    }

    /// Split messages into system instruction and model-API contents,
    /// mapping the stored `assistant` role to `model`
    fn build_request<'a>(&self, messages: &'a [ChatMessage]) -> GeminiRequest<'a> {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in messages {
            match message.role {
                ChatRole::System => system_parts.push(GeminiPart { text: &message.content }),
                _ => contents.push(GeminiContent {
                    role: message.role.model_name(),
                    parts: vec![GeminiPart { text: &message.content }],
                }),
            }
        }

        GeminiRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiSystem { parts: system_parts })
            },
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("status {status}: {body}")));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("no candidate text".to_string()))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Primary/fallback chain. A failure of every backend is fatal and surfaces
/// as an error event for the session.
pub struct ChatClient {
    primary: Box<dyn ChatBackend>,
    fallback: Option<Box<dyn ChatBackend>>,
}

impl ChatClient {
    pub fn new(primary: Box<dyn ChatBackend>, fallback: Option<Box<dyn ChatBackend>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn generate(&self, messages: &[ChatMessage]) -> opsvoice_core::Result<String> {
        let primary_err = match self.primary.generate(messages).await {
            Ok(text) => {
                info!(backend = self.primary.name(), "generation succeeded");
                return Ok(text);
            }
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(LlmError::AllBackendsFailed(primary_err.to_string()).into());
        };

        warn!(
            backend = self.primary.name(),
            error = %primary_err,
            "primary backend failed, trying fallback"
        );

        match fallback.generate(messages).await {
            Ok(text) => {
                info!(backend = fallback.name(), "fallback generation succeeded");
                Ok(text)
            }
            Err(fallback_err) => Err(LlmError::AllBackendsFailed(format!(
                "primary: {primary_err}; fallback: {fallback_err}"
            ))
            .into()),
        }
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

// Gemini API types
#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiSystem<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        reply: Option<String>,
        name: &'static str,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.reply
                .clone()
                .ok_or_else(|| LlmError::Api("backend down".to_string()))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let client = ChatClient::new(
            Box::new(FixedBackend { reply: Some("primary reply".into()), name: "p" }),
            Some(Box::new(FixedBackend { reply: Some("fallback reply".into()), name: "f" })),
        );
        let reply = client.generate(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "primary reply");
    }

    #[tokio::test]
    async fn test_primary_failure_uses_fallback() {
        let client = ChatClient::new(
            Box::new(FixedBackend { reply: None, name: "p" }),
            Some(Box::new(FixedBackend { reply: Some("fallback reply".into()), name: "f" })),
        );
        let reply = client.generate(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "fallback reply");
    }

    #[tokio::test]
    async fn test_whole_chain_failure_is_an_error() {
        let client = ChatClient::new(
            Box::new(FixedBackend { reply: None, name: "p" }),
            Some(Box::new(FixedBackend { reply: None, name: "f" })),
        );
        assert!(client.generate(&[ChatMessage::user("hi")]).await.is_err());
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let client = ChatClient::new(
            Box::new(FixedBackend { reply: None, name: "p" }),
            None,
        );
        assert!(client.generate(&[ChatMessage::user("hi")]).await.is_err());
    }

    #[test]
    fn test_gemini_request_normalizes_assistant_role() {
        let backend = GeminiBackend::new(LlmConfig::default()).unwrap();
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let request = backend.build_request(&messages);
        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.contents[0].role, "user");
        assert_eq!(request.contents[1].role, "model");
        assert!(request.system_instruction.is_some());
    }
}
