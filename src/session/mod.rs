//! In-memory session repository with per-session locking and TTL reaping.
//!
//! The repository map lives behind one global lock which is only ever
//! held for map bookkeeping, never across I/O. Each session is an
//! `Arc<Mutex<Session>>`; that mutex is the per-session lock, so
//! operations on distinct sessions never contend and operations on the
//! same session serialize. Lock order is always global before session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::provider::ToolCallRequest;

/// One role-tagged conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl MessageRecord {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A chat session: bounded history plus access bookkeeping for TTL
/// cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub messages: Vec<MessageRecord>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub max_messages: usize,
}

impl Session {
    pub fn new(id: impl Into<String>, max_messages: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            last_accessed: now,
            max_messages,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Append a message, truncating from the head when the cap is
    /// exceeded so the most recent entries survive.
    pub fn add_message(&mut self, message: MessageRecord) {
        self.messages.push(message);
        self.last_accessed = Utc::now();

        if self.messages.len() > self.max_messages {
            let drain = self.messages.len() - self.max_messages;
            self.messages.drain(..drain);
        }
    }

    /// A copy of the history; mutating it does not affect the session.
    pub fn get_history(&self) -> Vec<MessageRecord> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_accessed = Utc::now();
    }
}

pub struct SessionRepository {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    ttl: Duration,
    max_messages: usize,
}

impl SessionRepository {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(config.session_ttl_seconds as i64),
            max_messages: config.max_messages_per_session,
        }
    }

    /// Get the handle for `id`, creating the session if absent, and
    /// touch its last-accessed time.
    pub async fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        let handle = {
            let mut map = self.sessions.lock().await;
            map.entry(id.to_string())
                .or_insert_with(|| {
                    debug!("creating session {}", id);
                    Arc::new(Mutex::new(Session::new(id, self.max_messages)))
                })
                .clone()
        };
        handle.lock().await.touch();
        handle
    }

    /// Existing session handle, touched, or `None`.
    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let handle = {
            let map = self.sessions.lock().await;
            map.get(id).cloned()
        };
        if let Some(handle) = &handle {
            handle.lock().await.touch();
        }
        handle
    }

    /// Insert a session, replacing any existing one with the same id.
    pub async fn add(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        let mut map = self.sessions.lock().await;
        map.insert(id, handle.clone());
        handle
    }

    /// Replace the stored session under `id`. Returns false when no such
    /// session exists.
    pub async fn update(&self, id: &str, session: Session) -> bool {
        let handle = {
            let map = self.sessions.lock().await;
            map.get(id).cloned()
        };
        match handle {
            Some(handle) => {
                *handle.lock().await = session;
                true
            }
            None => false,
        }
    }

    /// Remove the session and its lock. Returns true if it was present.
    pub async fn delete(&self, id: &str) -> bool {
        let mut map = self.sessions.lock().await;
        map.remove(id).is_some()
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Snapshot copies of all sessions.
    pub async fn get_all(&self) -> Vec<Session> {
        let handles: Vec<_> = {
            let map = self.sessions.lock().await;
            map.values().cloned().collect()
        };
        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.lock().await.clone());
        }
        sessions
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Remove sessions whose last access is older than the TTL. A
    /// session whose lock is currently held is mid-turn and therefore
    /// not expired; it is skipped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut map = self.sessions.lock().await;

        let expired: Vec<String> = map
            .iter()
            .filter_map(|(id, handle)| {
                let guard = handle.try_lock().ok()?;
                (now - guard.last_accessed > self.ttl).then(|| id.clone())
            })
            .collect();

        for id in &expired {
            map.remove(id);
        }
        if !expired.is_empty() {
            info!("reaped {} expired sessions", expired.len());
        }
        expired.len()
    }
}
