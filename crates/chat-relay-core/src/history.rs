//! Bounded chat history buffer.

use std::collections::VecDeque;

use serde::{Serialize, Serializer};

use crate::ChatMessage;

/// Default number of messages kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 6;

/// Sliding window over the most recent chat messages.
///
/// Oldest entries are dropped once `capacity` is exceeded, so the buffer
/// always holds the last `capacity` messages in arrival order. Serializes as
/// a plain sequence, which is what gets persisted to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ChatHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity,
        }
    }

    /// Create a history from a previously persisted snapshot.
    ///
    /// A snapshot longer than `capacity` keeps only its newest entries.
    #[must_use]
    pub fn with_messages(capacity: usize, messages: Vec<ChatMessage>) -> Self {
        let mut history = Self::new(capacity);
        for msg in messages {
            history.push(msg);
        }
        history
    }

    /// Append a message, dropping the oldest entries past capacity.
    pub fn push(&mut self, msg: ChatMessage) {
        self.messages.push_back(msg);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Maximum number of messages kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Snapshot of the messages, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }
}

impl Serialize for ChatHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::new(text, "user")
    }

    #[test]
    fn test_sliding_window() {
        let mut history = ChatHistory::new(2);
        history.push(msg("A"));
        assert_eq!(history.to_vec(), vec![msg("A")]);
        history.push(msg("B"));
        assert_eq!(history.to_vec(), vec![msg("A"), msg("B")]);
        history.push(msg("C"));
        assert_eq!(history.to_vec(), vec![msg("B"), msg("C")]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = ChatHistory::new(3);
        for i in 0..20 {
            history.push(msg(&i.to_string()));
            assert!(history.len() <= 3);
        }
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["17", "18", "19"]);
    }

    #[test]
    fn test_oversized_snapshot_is_truncated() {
        let history = ChatHistory::with_messages(2, vec![msg("A"), msg("B"), msg("C")]);
        assert_eq!(history.to_vec(), vec![msg("B"), msg("C")]);
    }

    #[test]
    fn test_serializes_as_sequence() {
        let history = ChatHistory::with_messages(6, vec![msg("A")]);
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"[{"message":"A","user":{"username":"user"}}]"#);

        let empty = serde_json::to_string(&ChatHistory::default()).unwrap();
        assert_eq!(empty, "[]");
    }
}
