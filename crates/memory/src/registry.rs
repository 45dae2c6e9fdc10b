//! Session registry — the memory isolation layer.
//!
//! Owns one [`ConversationBuffer`] per session id, plus a process-wide
//! "focused" session. Every operation comes in two forms:
//!
//! - focus-based (`commit`, `read`, `reset_focused`) for a UI that tracks
//!   a single active conversation;
//! - explicit-id (`commit_to`, `history`, `reset`) for callers that must
//!   not depend on the shared focus pointer. The query pipeline uses these,
//!   so a focus change between two queries cannot redirect a write.
//!
//! Operations never panic. Failures come back as [`MemoryError`]s the
//! caller can log and move past.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use smartseva_core::error::MemoryError;
use smartseva_core::message::{Role, SessionId, TranscriptMessage};
use tracing::{debug, info, warn};

use crate::buffer::{ConversationBuffer, Exchange};

#[derive(Debug, Default)]
struct RegistryState {
    buffers: HashMap<SessionId, ConversationBuffer>,
    focused: Option<SessionId>,
}

impl RegistryState {
    fn ensure(&mut self, id: &SessionId, window: usize) -> &mut ConversationBuffer {
        self.buffers.entry(id.clone()).or_insert_with(|| {
            debug!(session = %id, window, "Allocated conversation buffer");
            ConversationBuffer::new(window)
        })
    }
}

/// Snapshot of one session's buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferSummary {
    pub exists: bool,
    pub pair_count: usize,
    pub is_focused: bool,
}

/// What a rehydration did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RehydrationReport {
    /// Messages in the transcript
    pub transcript_len: usize,
    /// Pairs that passed validation
    pub valid_pairs: usize,
    /// Pairs written into the buffer
    pub loaded: usize,
    /// Pairs, unanswered questions, and stray messages discarded
    pub malformed: usize,
    /// Valid pairs older than the window, not loaded
    pub beyond_window: usize,
    /// A trailing message with no partner
    pub unpaired_tail: bool,
}

impl RehydrationReport {
    /// At least one pair loaded, or there was nothing to load.
    pub fn succeeded(&self) -> bool {
        self.loaded > 0 || self.transcript_len == 0
    }

    /// The transcript had messages but none survived validation.
    pub fn is_partial_failure(&self) -> bool {
        !self.succeeded()
    }
}

/// Registry of per-session conversational buffers.
#[derive(Debug)]
pub struct SessionRegistry {
    window: usize,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    /// Create an empty registry whose buffers hold `window` pairs each.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window
    }

    // A panicking writer can only poison the lock between whole-buffer
    // mutations, so the inner state is always consistent.
    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Lifecycle ──

    /// Return `session_id` (or a freshly minted id) with a buffer allocated.
    ///
    /// A blank id is treated as absent.
    pub fn create_or_get(&self, session_id: Option<&str>) -> SessionId {
        let id = session_id
            .and_then(|raw| SessionId::parse(raw).ok())
            .unwrap_or_default();
        self.write_state().ensure(&id, self.window);
        id
    }

    /// Point the focus at `session_id`, allocating its buffer if needed.
    pub fn focus(&self, session_id: &str) -> Result<SessionId, MemoryError> {
        let id = SessionId::parse(session_id)?;
        let mut state = self.write_state();
        state.ensure(&id, self.window);
        state.focused = Some(id.clone());
        debug!(session = %id, "Focused session");
        Ok(id)
    }

    /// The focused session, if any.
    pub fn focused(&self) -> Option<SessionId> {
        self.read_state().focused.clone()
    }

    /// Remove a session's buffer entirely; clears the focus if it pointed here.
    pub fn delete(&self, session_id: &str) -> Result<(), MemoryError> {
        let id = SessionId::parse(session_id)?;
        let mut state = self.write_state();
        if state.buffers.remove(&id).is_none() {
            warn!(session = %id, "Session memory not found for deletion");
            return Err(MemoryError::SessionNotFound(id.to_string()));
        }
        if state.focused.as_ref() == Some(&id) {
            state.focused = None;
        }
        info!(session = %id, "Deleted session memory");
        Ok(())
    }

    // ── Focus-based operations ──

    /// Snapshot of the focused session's buffer.
    pub fn current_buffer(&self) -> Option<ConversationBuffer> {
        let state = self.read_state();
        let id = state.focused.as_ref()?;
        state.buffers.get(id).cloned()
    }

    /// Append a pair to the focused buffer.
    pub fn commit(&self, input: &str, output: &str) -> Result<(), MemoryError> {
        let focused = self.focused().ok_or_else(|| {
            warn!("No focused session; cannot save exchange");
            MemoryError::NoFocusedSession
        })?;
        self.commit_to(&focused, input, output)
    }

    /// The focused buffer's pairs, oldest first; empty when nothing is focused.
    pub fn read(&self) -> Vec<Exchange> {
        self.current_buffer()
            .map(|b| b.pairs())
            .unwrap_or_default()
    }

    /// Empty the focused buffer in place.
    pub fn reset_focused(&self) -> Result<(), MemoryError> {
        let focused = self.focused().ok_or(MemoryError::NoFocusedSession)?;
        self.reset(&focused)
    }

    // ── Explicit-id operations ──

    /// Append a pair to a specific session's buffer.
    ///
    /// Fails if the session was deleted; a deleted session is not resurrected.
    pub fn commit_to(&self, id: &SessionId, input: &str, output: &str) -> Result<(), MemoryError> {
        let mut state = self.write_state();
        let buffer = state
            .buffers
            .get_mut(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;
        let evicted = buffer.push(Exchange::new(input, output));
        debug!(session = %id, pairs = buffer.len(), evicted, "Exchange saved");
        Ok(())
    }

    /// A session's pairs, oldest first; empty for unknown sessions.
    pub fn history(&self, id: &SessionId) -> Vec<Exchange> {
        self.read_state()
            .buffers
            .get(id)
            .map(|b| b.pairs())
            .unwrap_or_default()
    }

    /// Empty a specific session's buffer in place.
    pub fn reset(&self, id: &SessionId) -> Result<(), MemoryError> {
        let mut state = self.write_state();
        let buffer = state
            .buffers
            .get_mut(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;
        buffer.clear();
        info!(session = %id, "Cleared session memory");
        Ok(())
    }

    // ── Rehydration ──

    /// Rebuild a session's buffer from a persisted transcript.
    ///
    /// Focuses the session and clears its buffer, then reads the transcript
    /// as (user, assistant) pairs. Malformed pairs are skipped with a
    /// warning. A user message followed by another user message is skipped
    /// alone, so one unanswered question does not shift every later pair.
    /// Of the valid pairs, only the most recent `window` are loaded, oldest
    /// first. The whole rebuild happens under one lock,
    /// so no reader observes a half-loaded buffer.
    pub fn rehydrate(
        &self,
        session_id: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<RehydrationReport, MemoryError> {
        let id = SessionId::parse(session_id)?;
        let mut report = RehydrationReport {
            transcript_len: transcript.len(),
            ..RehydrationReport::default()
        };

        let mut valid = Vec::new();
        let mut index = 0;
        while index < transcript.len() {
            let user = &transcript[index];
            if user.role != Role::User {
                warn!(session = %id, index, role = %user.role, "Message outside a pair skipped");
                report.malformed += 1;
                index += 1;
                continue;
            }
            let Some(reply) = transcript.get(index + 1) else {
                warn!(session = %id, index, "Trailing message without a reply skipped");
                report.unpaired_tail = true;
                break;
            };
            if reply.role == Role::User {
                // Unanswered question; the next pair starts at `reply`.
                warn!(session = %id, index, "Unanswered question skipped");
                report.malformed += 1;
                index += 1;
                continue;
            }
            if is_valid_pair(user, reply) {
                valid.push(Exchange::new(&user.content, &reply.content));
            } else {
                warn!(session = %id, index, "Invalid message pair skipped");
                report.malformed += 1;
            }
            index += 2;
        }
        report.valid_pairs = valid.len();

        let skip = valid.len().saturating_sub(self.window);
        report.beyond_window = skip;

        let mut state = self.write_state();
        state.focused = Some(id.clone());
        let buffer = state.ensure(&id, self.window);
        buffer.clear();
        for exchange in valid.into_iter().skip(skip) {
            buffer.push(exchange);
            report.loaded += 1;
        }
        drop(state);

        if report.is_partial_failure() {
            warn!(
                session = %id,
                messages = report.transcript_len,
                malformed = report.malformed,
                "Rehydration loaded no pairs"
            );
        } else {
            info!(
                session = %id,
                loaded = report.loaded,
                valid = report.valid_pairs,
                "Rehydrated session memory"
            );
        }
        Ok(report)
    }

    // ── Introspection ──

    pub fn contains(&self, id: &SessionId) -> bool {
        self.read_state().buffers.contains_key(id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.read_state().buffers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.read_state().buffers.len()
    }

    pub fn summary(&self, id: &SessionId) -> BufferSummary {
        let state = self.read_state();
        match state.buffers.get(id) {
            Some(buffer) => BufferSummary {
                exists: true,
                pair_count: buffer.len(),
                is_focused: state.focused.as_ref() == Some(id),
            },
            None => BufferSummary {
                exists: false,
                pair_count: 0,
                is_focused: false,
            },
        }
    }
}

fn is_valid_pair(user: &TranscriptMessage, assistant: &TranscriptMessage) -> bool {
    user.role == Role::User
        && assistant.role == Role::Assistant
        && !user.content.trim().is_empty()
        && !assistant.content.trim().is_empty()
}
