//! Configuration for the opsvoice backend
//!
//! Settings load from an optional TOML file plus `OPSVOICE_` prefixed
//! environment overrides (double underscore as section separator, e.g.
//! `OPSVOICE_SERVER__PORT=8080`).

mod settings;

pub use settings::{
    load_settings, LlmSettings, PipelineSettings, RagSettings, ServerSettings, Settings,
    SttSettings, ToolsSettings, TtsSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
