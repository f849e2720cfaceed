//! In-session conversation history
//!
//! Short-term memory for the current session only. Distinct from the
//! semantic memory store: this is the verbatim turn-by-turn transcript the
//! cloud backend receives as chat history, capped so long sessions cannot
//! grow the request without bound.

use crate::llm::ChatMessage;

/// Maximum messages retained (20 user/assistant pairs)
const MAX_MESSAGES: usize = 40;

/// Bounded transcript of the current session
#[derive(Debug, Default)]
pub struct SessionHistory {
    messages: Vec<ChatMessage>,
}

impl SessionHistory {
    /// Create an empty history
    pub fn new() -> Self {
        SessionHistory::default()
    }

    /// Record one completed turn. Oldest messages are dropped first once
    /// the cap is reached.
    pub fn push_turn(&mut self, user_input: &str, response: &str) {
        self.messages.push(ChatMessage::user(user_input));
        self.messages.push(ChatMessage::assistant(response));

        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
    }

    /// The retained messages, oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all retained messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
