//! WebSocket transport
//!
//! One socket per caller connection. Inbound messages are tagged JSON
//! requests; outbound messages are serialized session events. Closing the
//! socket removes and cancels every session the connection owns.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use opsvoice_core::{AudioPayload, ChatMessage, SessionEvent, VoiceSelection};

use crate::state::AppState;

/// Inbound caller requests
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsRequest {
    StartVoice {
        user_id: String,
        audio: AudioPayload,
        #[serde(default)]
        voice: VoiceSelection,
        #[serde(default)]
        history: Vec<ChatMessage>,
        #[serde(default)]
        user_role: Option<String>,
    },
    StartText {
        user_id: String,
        text: String,
        #[serde(default)]
        voice: VoiceSelection,
        #[serde(default)]
        history: Vec<ChatMessage>,
        #[serde(default)]
        user_role: Option<String>,
    },
    EarlySynthesis {
        session_id: String,
        text: String,
    },
    Ping,
}

/// Upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    info!(connection_id = %connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(64);

    // writer owns the sink
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // bridge session events onto the outbound queue
    let bridge_tx = out_tx.clone();
    let bridge = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if bridge_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to serialize session event"),
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                handle_request(&state, &connection_id, &text, &out_tx, &event_tx).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // implicit cleanup trigger: every session owned by this connection is
    // removed and cancelled
    let removed = state.coordinator.handle_disconnect(&connection_id);
    debug!(connection_id = %connection_id, removed, "websocket disconnected");

    bridge.abort();
    writer.abort();
}

async fn handle_request(
    state: &AppState,
    connection_id: &str,
    text: &str,
    out_tx: &mpsc::Sender<String>,
    event_tx: &mpsc::Sender<SessionEvent>,
) {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            send_protocol_error(out_tx, &format!("malformed request: {err}")).await;
            return;
        }
    };

    let result = match request {
        WsRequest::StartVoice { user_id, audio, voice, history, user_role } => state
            .coordinator
            .start_voice_session(
                connection_id,
                &user_id,
                voice,
                audio,
                history,
                user_role,
                event_tx.clone(),
            )
            .map(|_| ()),
        WsRequest::StartText { user_id, text, voice, history, user_role } => state
            .coordinator
            .start_text_session(
                connection_id,
                &user_id,
                voice,
                text,
                history,
                user_role,
                event_tx.clone(),
            )
            .map(|_| ()),
        WsRequest::EarlySynthesis { session_id, text } => {
            state.coordinator.early_synthesize(&session_id, text)
        }
        WsRequest::Ping => {
            let _ = out_tx.send(r#"{"type":"pong"}"#.to_string()).await;
            Ok(())
        }
    };

    if let Err(err) = result {
        send_protocol_error(out_tx, &err.to_string()).await;
    }
}

async fn send_protocol_error(out_tx: &mpsc::Sender<String>, message: &str) {
    let payload = serde_json::json!({ "type": "request_error", "message": message });
    let _ = out_tx.send(payload.to_string()).await;
}
