//! Session coordinator
//!
//! Owns the per-utterance lifecycle: registers the session, fans out the
//! independent fetchers, sequences the dependent stages, streams events,
//! and guarantees cleanup on completion, error, or disconnect. Stages are
//! injected as trait objects so the coordinator is testable with mocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use opsvoice_core::{
    AudioPayload, ChatMessage, ChatModel, ContextSource, KnowledgeRetriever, RetrieveOptions,
    SessionEvent, SpeechSynthesizer, StageTimings, StreamEvent, SynthesisOutcome, Transcriber,
    Transcript, UserContext, VoiceSelection,
};
use opsvoice_llm::{build_messages, PromptInputs};
use opsvoice_rag::format_instruction_context;

use crate::session::{Session, SessionRegistry};
use crate::stt::FALLBACK_TRANSCRIPT;
use crate::PipelineError;

/// Injected stage backends
#[derive(Clone)]
pub struct StageBackends {
    pub transcriber: Arc<dyn Transcriber>,
    pub context: Arc<dyn ContextSource>,
    pub retriever: Arc<dyn KnowledgeRetriever>,
    pub chat: Arc<dyn ChatModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Budget applied to every external stage call
    pub stage_timeout: Duration,
    pub system_prompt: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            system_prompt: "You are a concise, helpful business operations assistant. \
                            Answer using the provided business knowledge when relevant."
                .to_string(),
        }
    }
}

/// Input for one utterance
pub enum SessionInput {
    Voice(AudioPayload),
    Text(String),
}

/// Per-utterance pipeline coordinator
pub struct SessionCoordinator {
    registry: Arc<SessionRegistry>,
    stages: StageBackends,
    config: CoordinatorConfig,
}

impl SessionCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        stages: StageBackends,
        config: CoordinatorConfig,
    ) -> Self {
        Self { registry, stages, config }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a voice session; results arrive as streamed events
    #[allow(clippy::too_many_arguments)]
    pub fn start_voice_session(
        self: &Arc<Self>,
        connection_id: &str,
        user_id: &str,
        voice: VoiceSelection,
        audio: AudioPayload,
        history: Vec<ChatMessage>,
        user_role: Option<String>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<String, PipelineError> {
        self.start_session(
            connection_id,
            user_id,
            voice,
            SessionInput::Voice(audio),
            history,
            user_role,
            events,
        )
    }

    /// Start a text session; skips the transcription stage
    #[allow(clippy::too_many_arguments)]
    pub fn start_text_session(
        self: &Arc<Self>,
        connection_id: &str,
        user_id: &str,
        voice: VoiceSelection,
        text: String,
        history: Vec<ChatMessage>,
        user_role: Option<String>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<String, PipelineError> {
        self.start_session(
            connection_id,
            user_id,
            voice,
            SessionInput::Text(text),
            history,
            user_role,
            events,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn start_session(
        self: &Arc<Self>,
        connection_id: &str,
        user_id: &str,
        voice: VoiceSelection,
        input: SessionInput,
        history: Vec<ChatMessage>,
        user_role: Option<String>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<String, PipelineError> {
        let session = self.registry.create(user_id, connection_id, voice, events)?;
        let session_id = session.id.clone();
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            coordinator.drive(session, input, history, user_role).await;
        });

        Ok(session_id)
    }

    /// Synthesize a stable prefix of the answer before generation finishes.
    /// Fire-and-forget; emits a synthesis event on the session's channel.
    pub fn early_synthesize(
        self: &Arc<Self>,
        session_id: &str,
        partial_text: String,
    ) -> Result<(), PipelineError> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;

        let synthesizer = Arc::clone(&self.stages.synthesizer);
        let stage_timeout = self.config.stage_timeout;

        tokio::spawn(async move {
            let outcome = synthesize_capped(
                synthesizer.as_ref(),
                &partial_text,
                &session.voice,
                stage_timeout,
            )
            .await;
            session.emit(synthesis_event(outcome)).await;
        });

        Ok(())
    }

    /// Remove and cancel every session owned by the connection
    pub fn handle_disconnect(&self, connection_id: &str) -> usize {
        self.registry.remove_connection(connection_id)
    }

    /// Run the pipeline inside a cancellation guard, then clean up
    /// unconditionally
    async fn drive(
        &self,
        session: Arc<Session>,
        input: SessionInput,
        history: Vec<ChatMessage>,
        user_role: Option<String>,
    ) {
        let mut cancelled = session.cancelled();
        if *cancelled.borrow() {
            self.registry.remove(&session.id);
            return;
        }
        session.emit(StreamEvent::Started).await;

        tokio::select! {
            _ = cancelled.changed() => {
                debug!(session_id = %session.id, "session cancelled, pipeline dropped");
            }
            _ = self.run_pipeline(&session, input, history, user_role) => {}
        }

        self.registry.remove(&session.id);
    }

    async fn run_pipeline(
        &self,
        session: &Arc<Session>,
        input: SessionInput,
        history: Vec<ChatMessage>,
        user_role: Option<String>,
    ) {
        let stage_timeout = self.config.stage_timeout;
        let mut timings = StageTimings::default();
        let options = RetrieveOptions { user_role, category: None };

        // Text input makes the retrieval query known up front, so it can
        // race the context fetch; voice retrieval waits on the transcript.
        let query_hint = match &input {
            SessionInput::Text(text) => Some(text.clone()),
            SessionInput::Voice(_) => None,
        };

        let transcript_fut = async {
            let start = Instant::now();
            let transcript = match &input {
                SessionInput::Text(text) => {
                    Transcript { text: text.clone(), fallback: false }
                }
                SessionInput::Voice(audio) => {
                    match tokio::time::timeout(
                        stage_timeout,
                        self.stages.transcriber.transcribe(audio),
                    )
                    .await
                    {
                        Ok(transcript) => transcript,
                        Err(_) => {
                            warn!(session_id = %session.id, "transcription timed out");
                            Transcript {
                                text: FALLBACK_TRANSCRIPT.to_string(),
                                fallback: true,
                            }
                        }
                    }
                }
            };
            (transcript, start.elapsed())
        };

        let context_fut = async {
            let start = Instant::now();
            let context = match tokio::time::timeout(
                stage_timeout,
                self.stages.context.fetch(&session.user_id),
            )
            .await
            {
                Ok(context) => context,
                Err(_) => {
                    warn!(session_id = %session.id, "context fetch timed out");
                    UserContext::errored(&session.user_id)
                }
            };
            (context, start.elapsed())
        };

        let prefetch_fut = async {
            match &query_hint {
                Some(query) => Some(self.retrieve_capped(query, &options).await),
                None => None,
            }
        };

        let ((transcript, stt_elapsed), (context, context_elapsed), prefetched) =
            tokio::join!(transcript_fut, context_fut, prefetch_fut);

        timings.stt_ms = stt_elapsed.as_millis() as u64;
        timings.context_ms = context_elapsed.as_millis() as u64;

        session
            .emit(StreamEvent::Transcription {
                text: transcript.text.clone(),
                fallback: transcript.fallback,
            })
            .await;
        session
            .emit(StreamEvent::ContextLoaded { cached: context.cached, error: context.error })
            .await;

        let matches = match prefetched {
            Some(matches) => matches,
            None => self.retrieve_capped(&transcript.text, &options).await,
        };
        let context_block = format_instruction_context(&matches);

        // Generation is the one stage with no degraded result; failure or
        // timeout is fatal to the session.
        let generation_start = Instant::now();
        let inputs = PromptInputs {
            system_prompt: self.system_prompt_for(&context),
            context_block,
            history,
            user_message: transcript.text.clone(),
        };
        let messages = build_messages(&inputs);

        let reply = match tokio::time::timeout(
            stage_timeout,
            self.stages.chat.generate(&messages),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                warn!(session_id = %session.id, error = %err, "generation failed");
                session
                    .emit(StreamEvent::Error {
                        stage: "generation".to_string(),
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
            Err(_) => {
                warn!(session_id = %session.id, "generation timed out");
                session
                    .emit(StreamEvent::Error {
                        stage: "generation".to_string(),
                        message: "generation timed out".to_string(),
                    })
                    .await;
                return;
            }
        };
        timings.generation_ms = generation_start.elapsed().as_millis() as u64;

        session.emit(StreamEvent::GenerationChunk { text: reply.clone() }).await;

        let synthesis_start = Instant::now();
        let outcome = synthesize_capped(
            self.stages.synthesizer.as_ref(),
            &reply,
            &session.voice,
            stage_timeout,
        )
        .await;
        timings.synthesis_ms = synthesis_start.elapsed().as_millis() as u64;

        session.emit(synthesis_event(outcome)).await;
        session
            .emit(StreamEvent::Complete { transcript: transcript.text, reply, timings })
            .await;
    }

    /// Retrieval is degradable; errors and timeouts collapse to no context
    async fn retrieve_capped(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Vec<opsvoice_core::InstructionMatch> {
        match tokio::time::timeout(
            self.config.stage_timeout,
            self.stages.retriever.retrieve(query, options),
        )
        .await
        {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                warn!(error = %err, "retrieval failed, continuing without context");
                Vec::new()
            }
            Err(_) => {
                warn!("retrieval timed out, continuing without context");
                Vec::new()
            }
        }
    }

    fn system_prompt_for(&self, context: &UserContext) -> String {
        let mut prompt = self.config.system_prompt.clone();
        if !context.error {
            if let Some(profile) = &context.profile {
                prompt.push_str("\n\nUser profile:\n");
                prompt.push_str(&profile.to_string());
            }
        }
        prompt
    }
}

/// Synthesis never errors; a timeout becomes a browser fallback like any
/// other primary failure
async fn synthesize_capped(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    voice: &VoiceSelection,
    stage_timeout: Duration,
) -> SynthesisOutcome {
    match tokio::time::timeout(stage_timeout, synthesizer.synthesize(text, voice)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("synthesis timed out, using browser fallback");
            SynthesisOutcome::BrowserFallback {
                text: text.to_string(),
                voice: voice.voice_id().to_string(),
                voice_description: voice.description().to_string(),
            }
        }
    }
}

fn synthesis_event(outcome: SynthesisOutcome) -> StreamEvent {
    let service = outcome.service().to_string();
    match outcome {
        SynthesisOutcome::Primary { audio_base64, audio_url, format, voice } => {
            StreamEvent::SynthesisReady { audio_base64, audio_url, format, voice, service }
        }
        SynthesisOutcome::BrowserFallback { text, voice, voice_description } => {
            StreamEvent::SynthesisFallback { text, voice, voice_description, service }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opsvoice_core::InstructionMatch;

    struct MockStt {
        fail: bool,
    }

    #[async_trait]
    impl Transcriber for MockStt {
        async fn transcribe(&self, _audio: &AudioPayload) -> Transcript {
            if self.fail {
                Transcript { text: FALLBACK_TRANSCRIPT.to_string(), fallback: true }
            } else {
                Transcript { text: "what tasks are due".to_string(), fallback: false }
            }
        }
    }

    struct MockContext;

    #[async_trait]
    impl ContextSource for MockContext {
        async fn fetch(&self, user_id: &str) -> UserContext {
            UserContext {
                user_id: user_id.to_string(),
                cached: false,
                error: false,
                profile: None,
                team_id: None,
            }
        }
    }

    struct MockRetriever;

    #[async_trait]
    impl KnowledgeRetriever for MockRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            _options: &RetrieveOptions,
        ) -> opsvoice_core::Result<Vec<InstructionMatch>> {
            Ok(vec![InstructionMatch {
                title: "Task policy".to_string(),
                content: "Due tasks are reviewed daily.".to_string(),
                instruction_type: None,
                role_access: "all".to_string(),
                similarity: 0.8,
                url: None,
                priority: None,
            }])
        }
    }

    enum ChatMode {
        Reply,
        Fail,
        Slow,
    }

    struct MockChat {
        mode: ChatMode,
    }

    #[async_trait]
    impl ChatModel for MockChat {
        async fn generate(&self, _messages: &[ChatMessage]) -> opsvoice_core::Result<String> {
            match self.mode {
                ChatMode::Reply => Ok("Two tasks are due today.".to_string()),
                ChatMode::Fail => Err(opsvoice_core::Error::backend("llm", "every backend down")),
                ChatMode::Slow => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    struct MockTts {
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for MockTts {
        async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> SynthesisOutcome {
            if self.fail {
                SynthesisOutcome::BrowserFallback {
                    text: text.to_string(),
                    voice: voice.voice_id().to_string(),
                    voice_description: voice.description().to_string(),
                }
            } else {
                SynthesisOutcome::Primary {
                    audio_base64: "bW9jaw==".to_string(),
                    audio_url: "data:audio/mp3;base64,bW9jaw==".to_string(),
                    format: "mp3".to_string(),
                    voice: voice.voice_id().to_string(),
                }
            }
        }
    }

    fn coordinator(stt_fail: bool, chat: ChatMode, tts_fail: bool) -> Arc<SessionCoordinator> {
        let stages = StageBackends {
            transcriber: Arc::new(MockStt { fail: stt_fail }),
            context: Arc::new(MockContext),
            retriever: Arc::new(MockRetriever),
            chat: Arc::new(MockChat { mode: chat }),
            synthesizer: Arc::new(MockTts { fail: tts_fail }),
        };
        Arc::new(SessionCoordinator::new(
            Arc::new(SessionRegistry::new(10)),
            stages,
            CoordinatorConfig {
                stage_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn terminal_count(events: &[SessionEvent]) -> usize {
        events.iter().filter(|e| e.event.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_text_session_happy_path() {
        let coordinator = coordinator(false, ChatMode::Reply, false);
        let (tx, rx) = mpsc::channel(32);

        let session_id = coordinator
            .start_text_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                "what tasks are due".to_string(),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        let events = collect(rx).await;
        assert!(events.iter().all(|e| e.session_id == session_id));
        assert!(matches!(events[0].event, StreamEvent::Started));
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(events.last().unwrap().event, StreamEvent::Complete { .. }));

        // pipeline order: transcription before generation before synthesis
        let pos = |pred: fn(&StreamEvent) -> bool| {
            events.iter().position(|e| pred(&e.event)).unwrap()
        };
        let transcription = pos(|e| matches!(e, StreamEvent::Transcription { .. }));
        let generation = pos(|e| matches!(e, StreamEvent::GenerationChunk { .. }));
        let synthesis = pos(|e| matches!(e, StreamEvent::SynthesisReady { .. }));
        assert!(transcription < generation);
        assert!(generation < synthesis);

        // cleanup is unconditional
        assert_eq!(coordinator.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_voice_session_with_failing_stt_still_completes() {
        let coordinator = coordinator(true, ChatMode::Reply, false);
        let (tx, rx) = mpsc::channel(32);

        coordinator
            .start_voice_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                AudioPayload::new("aGVsbG8="),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        let events = collect(rx).await;
        let transcription = events
            .iter()
            .find_map(|e| match &e.event {
                StreamEvent::Transcription { text, fallback } => Some((text.clone(), *fallback)),
                _ => None,
            })
            .unwrap();
        assert_eq!(transcription.0, FALLBACK_TRANSCRIPT);
        assert!(transcription.1);
        assert!(matches!(events.last().unwrap().event, StreamEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_generation_failure_is_fatal() {
        let coordinator = coordinator(false, ChatMode::Fail, false);
        let (tx, rx) = mpsc::channel(32);

        coordinator
            .start_text_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        let events = collect(rx).await;
        assert_eq!(terminal_count(&events), 1);
        match &events.last().unwrap().event {
            StreamEvent::Error { stage, .. } => assert_eq!(stage, "generation"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(coordinator.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_not_an_error() {
        let coordinator = coordinator(false, ChatMode::Reply, true);
        let (tx, rx) = mpsc::channel(32);

        coordinator
            .start_text_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        let events = collect(rx).await;
        let fallback = events
            .iter()
            .find_map(|e| match &e.event {
                StreamEvent::SynthesisFallback { service, .. } => Some(service.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(fallback, "browser");
        assert!(matches!(events.last().unwrap().event, StreamEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_mid_generation_removes_session_and_stops_events() {
        let coordinator = coordinator(false, ChatMode::Slow, false);
        let (tx, rx) = mpsc::channel(32);

        coordinator
            .start_text_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        // let the pipeline reach the slow generation stage
        tokio::time::sleep(Duration::from_millis(100)).await;
        let removed = coordinator.handle_disconnect("conn-1");
        assert_eq!(removed, 1);
        assert_eq!(coordinator.registry().count(), 0);

        // channel closes without a terminal event ever arriving
        let events = collect(rx).await;
        assert_eq!(terminal_count(&events), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let coordinator = coordinator(false, ChatMode::Slow, false);
        let (tx_a, rx_a) = mpsc::channel(32);
        let (tx_b, rx_b) = mpsc::channel(32);

        coordinator
            .start_text_session(
                "conn-a",
                "user-a",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx_a,
            )
            .unwrap();
        let session_b = coordinator
            .start_text_session(
                "conn-b",
                "user-b",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx_b,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.handle_disconnect("conn-a");

        // B's registry entry is unaffected by A's cleanup
        assert!(coordinator.registry().get(&session_b).is_some());
        assert_eq!(coordinator.registry().count(), 1);

        let events_a = collect(rx_a).await;
        assert_eq!(terminal_count(&events_a), 0);

        coordinator.handle_disconnect("conn-b");
        drop(rx_b);
    }

    #[tokio::test]
    async fn test_early_synthesis_emits_on_live_session() {
        let coordinator = coordinator(false, ChatMode::Slow, false);
        let (tx, mut rx) = mpsc::channel(32);

        let session_id = coordinator
            .start_text_session(
                "conn-1",
                "user-1",
                VoiceSelection::default(),
                "hello".to_string(),
                Vec::new(),
                None,
                tx,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator
            .early_synthesize(&session_id, "Here is the first part".to_string())
            .unwrap();

        let mut saw_synthesis = false;
        while let Some(event) = rx.recv().await {
            if matches!(event.event, StreamEvent::SynthesisReady { .. }) {
                saw_synthesis = true;
                break;
            }
        }
        assert!(saw_synthesis);

        coordinator.handle_disconnect("conn-1");
    }

    #[tokio::test]
    async fn test_early_synthesis_unknown_session_errors() {
        let coordinator = coordinator(false, ChatMode::Reply, false);
        let result = coordinator.early_synthesize("no-such-session", "text".to_string());
        assert!(matches!(result, Err(PipelineError::SessionNotFound(_))));
    }
}
