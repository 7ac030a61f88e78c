//! Application state
//!
//! Shared state across all handlers. Built once from settings; every stage
//! backend is constructed here and injected into the coordinator.

use std::sync::Arc;
use std::time::Duration;

use opsvoice_config::Settings;
use opsvoice_llm::{ChatBackend, ChatClient, GeminiBackend, LlmConfig, OpenAiCompatBackend};
use opsvoice_pipeline::{
    CoordinatorConfig, DeepgramSynthesizer, ProfileContextSource, SessionCoordinator,
    SessionRegistry, StageBackends, WhisperTranscriber,
};
use opsvoice_rag::{
    retriever::RetrieverConfig, EmbeddingClient, InstructionRetriever, InstructionStore,
};
use opsvoice_tools::{ToolDataClient, WebSearchClient};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub coordinator: Arc<SessionCoordinator>,
    pub tool_data: Arc<ToolDataClient>,
    pub web_search: Arc<WebSearchClient>,
}

impl AppState {
    /// Build all stage backends from settings and wire the coordinator
    pub fn new(settings: Settings) -> Result<Self, ServerError> {
        let transcriber = WhisperTranscriber::new(
            &settings.stt.endpoint,
            &settings.stt.api_key,
            &settings.stt.model,
        )
        .map_err(internal)?;

        let context = ProfileContextSource::new(&settings.rag.store_url, &settings.rag.store_key)
            .map_err(internal)?;

        let embedder = EmbeddingClient::new(
            &settings.rag.embedding_endpoint,
            &settings.rag.embedding_api_key,
            &settings.rag.embedding_model,
        )
        .map_err(internal)?;
        let store = InstructionStore::new(&settings.rag.store_url, &settings.rag.store_key)
            .map_err(internal)?;
        let retriever = InstructionRetriever::new(
            Arc::new(embedder),
            Arc::new(store),
            RetrieverConfig {
                match_threshold: settings.rag.match_threshold,
                match_count: settings.rag.match_count,
            },
        );

        let primary = OpenAiCompatBackend::new(LlmConfig {
            model: settings.llm.model.clone(),
            endpoint: settings.llm.endpoint.clone(),
            api_key: settings.llm.api_key.clone(),
            max_tokens: settings.llm.max_tokens,
            temperature: settings.llm.temperature,
            ..Default::default()
        })
        .map_err(internal)?;
        let fallback: Option<Box<dyn ChatBackend>> = if settings.llm.fallback_endpoint.is_empty() {
            None
        } else {
            Some(Box::new(
                GeminiBackend::new(LlmConfig {
                    model: settings.llm.fallback_model.clone(),
                    endpoint: settings.llm.fallback_endpoint.clone(),
                    api_key: settings.llm.fallback_api_key.clone(),
                    max_tokens: settings.llm.max_tokens,
                    temperature: settings.llm.temperature,
                    ..Default::default()
                })
                .map_err(internal)?,
            ))
        };
        let chat = ChatClient::new(Box::new(primary), fallback);

        let synthesizer = DeepgramSynthesizer::new(&settings.tts.endpoint, &settings.tts.api_key)
            .map_err(internal)?;

        let stages = StageBackends {
            transcriber: Arc::new(transcriber),
            context: Arc::new(context),
            retriever: Arc::new(retriever),
            chat: Arc::new(chat),
            synthesizer: Arc::new(synthesizer),
        };

        let registry = Arc::new(SessionRegistry::new(settings.pipeline.max_sessions));
        let coordinator = Arc::new(SessionCoordinator::new(
            registry,
            stages,
            CoordinatorConfig {
                stage_timeout: Duration::from_millis(settings.pipeline.stage_timeout_ms),
                ..Default::default()
            },
        ));

        let tool_data = ToolDataClient::new(&settings.rag.store_url, &settings.rag.store_key)
            .map_err(internal)?;
        let web_search = WebSearchClient::new(
            &settings.tools.search_endpoint,
            &settings.tools.search_api_key,
        )
        .map_err(internal)?;

        Ok(Self {
            settings: Arc::new(settings),
            coordinator,
            tool_data: Arc::new(tool_data),
            web_search: Arc::new(web_search),
        })
    }
}

fn internal<E: std::fmt::Display>(err: E) -> ServerError {
    ServerError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_from_default_settings() {
        let state = AppState::new(Settings::default()).unwrap();
        assert_eq!(state.coordinator.registry().count(), 0);
        assert_eq!(state.settings.pipeline.max_sessions, 100);
    }
}
