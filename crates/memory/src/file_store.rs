//! File-based session store — the whole chat log as one JSON document.
//!
//! The file is a JSON object keyed by session id; each value holds the
//! session's title, timestamps, and role-tagged messages.
//!
//! Storage location: `~/.smartseva/data/chat_history.json`
//!
//! Sessions are loaded on creation and flushed to disk on every mutation.
//! A flush writes a sibling temp file and renames it over the original, so
//! a crash mid-write leaves the previous log intact. A log that cannot be
//! read is never flushed over.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use smartseva_core::error::MemoryError;
use smartseva_core::message::{Role, SessionId, TranscriptMessage};
use smartseva_core::session::{SessionRecord, SessionStore, SessionSummary};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::in_memory::SessionMap;

/// A file-backed session store.
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Arc<RwLock<SessionMap>>,
    /// Set when an unreadable log could not be moved aside; writes are refused
    /// so the original is never overwritten.
    write_blocked: Option<String>,
}

impl FileSessionStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (created on first write). An unreadable
    /// or corrupted file is moved aside to `<name>.corrupt-<time>` and the
    /// store starts empty. If it cannot be moved, every write fails instead.
    pub fn new(path: PathBuf) -> Self {
        let (sessions, write_blocked) = match Self::load_from_disk(&path) {
            Ok(sessions) => (sessions, None),
            Err(reason) => match quarantine(&path) {
                Ok(moved) => {
                    warn!(path = %path.display(), moved_to = %moved.display(), error = %reason, "Chat history unreadable; moved aside and starting empty");
                    (SessionMap::default(), None)
                }
                Err(e) => {
                    error!(path = %path.display(), error = %reason, rename_error = %e, "Chat history unreadable and could not be moved; writes disabled");
                    (SessionMap::default(), Some(reason))
                }
            },
        };
        debug!(path = %path.display(), count = sessions.len(), "Session store loaded");
        Self {
            path,
            sessions: Arc::new(RwLock::new(sessions)),
            write_blocked,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<SessionMap, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionMap::default()),
            Err(e) => return Err(e.to_string()),
        };
        if content.trim().is_empty() {
            return Ok(SessionMap::default());
        }
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        if let Some(reason) = &self.write_blocked {
            return Err(MemoryError::Storage(format!(
                "Refusing to overwrite unreadable chat history at {}: {reason}",
                self.path.display()
            )));
        }
        let content = {
            let sessions = self.sessions.read().await;
            serde_json::to_string_pretty(&*sessions).map_err(|e| {
                MemoryError::Serialization(format!("Failed to serialize chat history: {e}"))
            })?
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create data directory: {e}"))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write chat history: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to replace chat history: {e}")))?;
        Ok(())
    }
}

/// Move an unreadable log out of the way, returning its new path.
fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let name = path
        .file_name()
        .map_or_else(|| "chat_history".into(), |n| n.to_string_lossy().into_owned());
    let moved = path.with_file_name(format!(
        "{name}.corrupt-{}",
        Utc::now().format("%Y%m%dT%H%M%S")
    ));
    std::fs::rename(path, &moved)?;
    Ok(moved)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn create_session(&self, custom_id: Option<SessionId>) -> Result<SessionId, MemoryError> {
        let id = self.sessions.write().await.create(custom_id);
        self.flush().await?;
        Ok(id)
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
        let message = self.sessions.write().await.append(id, role, content)?;
        self.flush().await?;
        debug!(session = %id, seq = message.seq, role = %role, "Saved message");
        Ok(message)
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
        let title = self.sessions.write().await.set_title(id, first_message)?;
        self.flush().await?;
        info!(session = %id, title = %title, "Updated session title");
        Ok(title)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, MemoryError> {
        let removed = self.sessions.write().await.remove(id);
        if removed {
            self.flush().await?;
            info!(session = %id, "Deleted session");
        } else {
            warn!(session = %id, "Session not found for deletion");
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, MemoryError> {
        Ok(self.sessions.read().await.summaries())
    }

    async fn cleanup_empty(&self) -> Result<usize, MemoryError> {
        let removed = self.sessions.write().await.remove_empty();
        if removed > 0 {
            self.flush().await?;
            info!(removed, "Cleaned up empty sessions");
        }
        Ok(removed)
    }
}
