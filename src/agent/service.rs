//! Session-aware chat glue.
//!
//! Holds the per-session lock for the whole turn: history is read and
//! the user/assistant pair is appended under one lock hold, so
//! concurrent requests against the same session serialize and the
//! history never interleaves.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::agent::agent_loop::{Agent, AgentResponse};
use crate::agent::events::AgentEvent;
use crate::session::{MessageRecord, SessionRepository};

pub struct ChatService {
    agent: Arc<Agent>,
    sessions: Arc<SessionRepository>,
}

impl ChatService {
    pub fn new(agent: Arc<Agent>, sessions: Arc<SessionRepository>) -> Self {
        Self { agent, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionRepository> {
        &self.sessions
    }

    /// Run one chat turn against a session and persist the exchange.
    pub async fn chat(&self, session_id: &str, user_message: &str) -> Result<AgentResponse> {
        let session = self.sessions.get_or_create(session_id).await;
        let mut guard = session.lock().await;

        debug!(
            "chat turn for session {} ({} prior messages)",
            session_id,
            guard.messages.len()
        );
        let history = guard.get_history();
        let response = self.agent.chat(user_message, &history).await?;

        guard.add_message(MessageRecord::new("user", user_message));
        guard.add_message(MessageRecord::new("assistant", &response.message));

        Ok(response)
    }

    /// Streaming turn: events are forwarded to the returned receiver;
    /// when the turn completes (`done`), the user/assistant pair is
    /// appended to the session. A disconnected client stops forwarding
    /// but the turn still finishes and is recorded.
    pub fn chat_stream(&self, session_id: &str, user_message: &str) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        let agent = self.agent.clone();
        let sessions = self.sessions.clone();
        let session_id = session_id.to_string();
        let user_message = user_message.to_string();

        tokio::spawn(async move {
            let session = sessions.get_or_create(&session_id).await;
            let mut guard = session.lock().await;

            let history = guard.get_history();
            let mut events = agent.chat_stream(user_message.clone(), history);

            let mut final_message = None;
            let mut client_open = true;
            while let Some(event) = events.recv().await {
                if let AgentEvent::Done { message, .. } = &event {
                    final_message = Some(message.clone());
                }
                if client_open && tx.send(event).await.is_err() {
                    client_open = false;
                }
            }

            if let Some(message) = final_message {
                guard.add_message(MessageRecord::new("user", user_message));
                guard.add_message(MessageRecord::new("assistant", message));
            }
        });

        rx
    }
}
