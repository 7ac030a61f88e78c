//! Session records and the active-session registry
//!
//! The registry is the only shared mutable structure in the pipeline. It is
//! owned by one coordinator instance and mutated only by its register and
//! cleanup operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use opsvoice_core::{SessionEvent, VoiceSelection};

use crate::PipelineError;

/// One active session: the unit of work for a single user utterance
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub connection_id: String,
    pub created_at: DateTime<Utc>,
    pub voice: VoiceSelection,
    /// Monotonically advancing; last-writer-wins is safe
    last_activity: RwLock<Instant>,
    /// Event channel back to the caller; dropped with the session
    events: mpsc::Sender<SessionEvent>,
    cancel_tx: watch::Sender<bool>,
}

impl Session {
    fn new(
        user_id: &str,
        connection_id: &str,
        voice: VoiceSelection,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            created_at: Utc::now(),
            voice,
            last_activity: RwLock::new(Instant::now()),
            events,
            cancel_tx,
        }
    }

    /// Advance the last-activity timestamp
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity.read().elapsed() > ttl
    }

    /// Subscribe to the cancellation token
    pub fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Fire the cancellation token; in-flight stage futures selected
    /// against it are dropped
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Emit an event to the caller, touching the session. Send failures
    /// mean the receiver is gone; the event is silently discarded.
    pub async fn emit(&self, event: opsvoice_core::StreamEvent) {
        self.touch();
        let _ = self
            .events
            .send(SessionEvent::new(self.id.clone(), event))
            .await;
    }
}

/// Active-session registry keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session
    pub fn create(
        &self,
        user_id: &str,
        connection_id: &str,
        voice: VoiceSelection,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<Session>, PipelineError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(PipelineError::SessionLimitReached(sessions.len()));
        }
        let session = Arc::new(Session::new(user_id, connection_id, voice, events));
        sessions.insert(session.id.clone(), session.clone());
        info!(session_id = %session.id, user_id, "session registered");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Remove a session; idempotent
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(session_id);
        if let Some(session) = &removed {
            session.cancel();
            debug!(session_id, "session removed");
        }
        removed
    }

    /// Remove and cancel every session owned by a connection
    pub fn remove_connection(&self, connection_id: &str) -> usize {
        let mut sessions = self.sessions.write();
        let doomed: Vec<String> = sessions
            .values()
            .filter(|s| s.connection_id == connection_id)
            .map(|s| s.id.clone())
            .collect();
        for id in &doomed {
            if let Some(session) = sessions.remove(id) {
                session.cancel();
            }
        }
        if !doomed.is_empty() {
            info!(connection_id, count = doomed.len(), "sessions removed on disconnect");
        }
        doomed.len()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Reap sessions idle past the ttl
    pub fn cleanup_expired(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(ttl))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.cancel();
            }
        }
        expired.len()
    }

    /// Spawn the periodic cleanup task. Returns a shutdown handle; send
    /// `true` to stop the task.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        ttl: Duration,
        interval: Duration,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = registry.cleanup_expired(ttl);
                        if reaped > 0 {
                            info!(reaped, "expired sessions cleaned up");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
