//! In-memory session store — useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use smartseva_core::error::MemoryError;
use smartseva_core::message::{Role, SessionId, TranscriptMessage};
use smartseva_core::session::{SessionRecord, SessionStore, SessionSummary, title_from};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// The session map shared by the in-memory and file stores.
///
/// Serializes as a JSON object keyed by session id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMap(HashMap<SessionId, SessionRecord>);

impl SessionMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn create(&mut self, custom_id: Option<SessionId>) -> SessionId {
        let mut id = custom_id.unwrap_or_default();
        while self.0.contains_key(&id) {
            id = SessionId::new();
        }
        self.0.insert(id.clone(), SessionRecord::new());
        info!(session = %id, "Created session");
        id
    }

    pub(crate) fn get(&self, id: &SessionId) -> Option<&SessionRecord> {
        self.0.get(id)
    }

    pub(crate) fn append(
        &mut self,
        id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, MemoryError> {
        let record = self.0.get_mut(id).ok_or_else(|| {
            warn!(session = %id, "Session not found for message save");
            MemoryError::SessionNotFound(id.to_string())
        })?;
        Ok(record.push(role, content).clone())
    }

    pub(crate) fn set_title(&mut self, id: &SessionId, first_message: &str) -> Result<String, MemoryError> {
        let record = self.0.get_mut(id).ok_or_else(|| {
            warn!(session = %id, "Session not found for title update");
            MemoryError::SessionNotFound(id.to_string())
        })?;
        record.title = title_from(first_message);
        record.updated_at = Utc::now();
        Ok(record.title.clone())
    }

    pub(crate) fn remove(&mut self, id: &SessionId) -> bool {
        self.0.remove(id).is_some()
    }

    pub(crate) fn summaries(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> =
            self.0.iter().map(|(id, record)| record.summary(id)).collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    pub(crate) fn remove_empty(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|_, record| !record.messages.is_empty());
        before - self.0.len()
    }
}

/// A session store that keeps everything in a map.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<SessionMap>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(SessionMap::default())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(&self, custom_id: Option<SessionId>) -> Result<SessionId, MemoryError> {
        Ok(self.sessions.write().await.create(custom_id))
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, MemoryError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn append_message(
        &self,
        id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, MemoryError> {
        self.sessions.write().await.append(id, role, content)
    }

    async fn messages(&self, id: &SessionId) -> Result<Vec<TranscriptMessage>, MemoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }

    async fn update_title(&self, id: &SessionId, first_message: &str) -> Result<String, MemoryError> {
        self.sessions.write().await.set_title(id, first_message)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, MemoryError> {
        Ok(self.sessions.write().await.remove(id))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, MemoryError> {
        Ok(self.sessions.read().await.summaries())
    }

    async fn cleanup_empty(&self) -> Result<usize, MemoryError> {
        Ok(self.sessions.write().await.remove_empty())
    }
}
