//! Conversational buffer — the bounded window of recent exchanges for one session.
//!
//! Holds at most `window` (question, answer) pairs. Pushing past the
//! window evicts the oldest pair first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use smartseva_core::message::Message;

/// One (question, answer) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
}

impl Exchange {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// FIFO-bounded buffer of exchanges, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationBuffer {
    window: usize,
    pairs: VecDeque<Exchange>,
}

impl ConversationBuffer {
    /// Create an empty buffer. A zero window is raised to 1.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            pairs: VecDeque::with_capacity(window),
        }
    }

    /// Append a pair, evicting from the front while over the window.
    /// Returns how many pairs were evicted.
    pub fn push(&mut self, exchange: Exchange) -> usize {
        self.pairs.push_back(exchange);
        let mut evicted = 0;
        while self.pairs.len() > self.window {
            self.pairs.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Contents, oldest first.
    pub fn pairs(&self) -> Vec<Exchange> {
        self.pairs.iter().cloned().collect()
    }

    /// Contents flattened into alternating user/assistant messages.
    pub fn to_messages(&self) -> Vec<Message> {
        self.pairs
            .iter()
            .flat_map(|p| [Message::user(&p.input), Message::assistant(&p.output)])
            .collect()
    }

    /// Empty in place; the window is unchanged.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
