//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP/WebSocket server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Speech-to-text backend
    #[serde(default)]
    pub stt: SttSettings,

    /// LLM backends (primary + optional fallback)
    #[serde(default)]
    pub llm: LlmSettings,

    /// Text-to-speech backend
    #[serde(default)]
    pub tts: TtsSettings,

    /// Retrieval configuration
    #[serde(default)]
    pub rag: RagSettings,

    /// Tool-data endpoints
    #[serde(default)]
    pub tools: ToolsSettings,

    /// Session/pipeline budgets
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means localhost only
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    /// Whisper-compatible transcription endpoint
    #[serde(default = "default_stt_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
}

fn default_stt_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            endpoint: default_stt_endpoint(),
            api_key: String::new(),
            model: default_stt_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible chat completions endpoint (primary)
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Gemini-style fallback endpoint; empty disables the fallback chain
    #[serde(default)]
    pub fallback_endpoint: String,
    #[serde(default)]
    pub fallback_api_key: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_fallback_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            fallback_endpoint: String::new(),
            fallback_api_key: String::new(),
            fallback_model: default_fallback_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_tts_endpoint() -> String {
    "https://api.deepgram.com/v1/speak".to_string()
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    /// PostgREST base URL of the datastore
    #[serde(default)]
    pub store_url: String,
    /// Service-role key for the datastore
    #[serde(default)]
    pub store_key: String,
    /// Embedding endpoint (OpenAI-compatible)
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,
    #[serde(default)]
    pub embedding_api_key: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Deliberately low threshold: cast a wide net, then rank
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_match_count")]
    pub match_count: u32,
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_match_threshold() -> f32 {
    0.1
}

fn default_match_count() -> u32 {
    50
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            store_key: String::new(),
            embedding_endpoint: default_embedding_endpoint(),
            embedding_api_key: String::new(),
            embedding_model: default_embedding_model(),
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSettings {
    /// Shared secret for the bearer-authenticated tool endpoints
    #[serde(default)]
    pub shared_secret: String,
    /// Server-side cap on the per-request row limit
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    /// External web-search API
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
    #[serde(default)]
    pub search_api_key: String,
}

fn default_max_limit() -> u32 {
    50
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            shared_secret: String::new(),
            max_limit: default_max_limit(),
            search_endpoint: default_search_endpoint(),
            search_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Per-stage time budget in milliseconds
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// Idle sessions past this age are reaped by the cleanup task
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_stage_timeout_ms() -> u64 {
    30_000
}

fn default_session_ttl_secs() -> u64 {
    300
}

fn default_max_sessions() -> usize {
    100
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout_ms: default_stage_timeout_ms(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.rag.match_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "rag.match_threshold".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", self.rag.match_threshold),
            });
        }

        if self.rag.match_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.match_count".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.pipeline.stage_timeout_ms < 1_000 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.stage_timeout_ms".to_string(),
                message: "Stage timeout too low (minimum 1000ms)".to_string(),
            });
        }

        if self.pipeline.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_sessions".to_string(),
                message: "Must allow at least 1 session".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        Ok(())
    }
}

/// Load settings from an optional TOML file plus environment overrides
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(Path::new(path)).required(true));
    } else if Path::new("config/opsvoice.toml").exists() {
        builder = builder.add_source(File::from(Path::new("config/opsvoice.toml")));
    }

    builder = builder.add_source(
        Environment::with_prefix("OPSVOICE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
