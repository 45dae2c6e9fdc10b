//! Session store trait — the persisted, append-only chat log.
//!
//! The pipeline never writes here; the calling layer does. The in-memory
//! conversational buffer is a bounded cache that can be rebuilt from this
//! log at any time (rehydration).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::{Role, SessionId, TranscriptMessage, timestamp};

/// Title given to a session before its first question.
pub const DEFAULT_TITLE: &str = "New Chat";

/// A persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,

    #[serde(default)]
    pub message_count: usize,
}

fn default_title() -> String {
    DEFAULT_TITLE.into()
}

impl SessionRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            title: default_title(),
            messages: Vec::new(),
            message_count: 0,
        }
    }

    /// Append a message, assigning the next sequence number.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &TranscriptMessage {
        let seq = self.messages.len() as u64 + 1;
        self.messages.push(TranscriptMessage::new(seq, role, content));
        self.message_count = self.messages.len();
        self.updated_at = Utc::now();
        &self.messages[self.messages.len() - 1]
    }

    pub fn summary(&self, id: &SessionId) -> SessionSummary {
        SessionSummary {
            id: id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for a persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl SessionSummary {
    pub fn has_messages(&self) -> bool {
        self.message_count > 0
    }
}

/// Derive a session title from its first question: trimmed, and cut to
/// 27 characters plus "..." when longer than 30.
pub fn title_from(first_message: &str) -> String {
    let title = first_message.trim();
    if title.chars().count() > 30 {
        let head: String = title.chars().take(27).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// The session store contract.
///
/// Implementations: JSON file, in-memory (for testing).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Create a session. A taken or absent `custom_id` is replaced by a fresh id.
    async fn create_session(
        &self,
        custom_id: Option<SessionId>,
    ) -> std::result::Result<SessionId, MemoryError>;

    /// Get a session record by id.
    async fn get(&self, id: &SessionId) -> std::result::Result<Option<SessionRecord>, MemoryError>;

    /// Append one role-tagged message.
    async fn append_message(
        &self,
        id: &SessionId,
        role: Role,
        content: &str,
    ) -> std::result::Result<TranscriptMessage, MemoryError>;

    /// Messages of a session, in order. Unknown sessions yield an empty list.
    async fn messages(
        &self,
        id: &SessionId,
    ) -> std::result::Result<Vec<TranscriptMessage>, MemoryError>;

    /// Set the title from the session's first question.
    async fn update_title(
        &self,
        id: &SessionId,
        first_message: &str,
    ) -> std::result::Result<String, MemoryError>;

    /// Delete a session. Returns whether it existed.
    async fn delete(&self, id: &SessionId) -> std::result::Result<bool, MemoryError>;

    /// All sessions, most recently updated first.
    async fn list(&self) -> std::result::Result<Vec<SessionSummary>, MemoryError>;

    /// Remove sessions without messages. Returns how many were removed.
    async fn cleanup_empty(&self) -> std::result::Result<usize, MemoryError>;
}
