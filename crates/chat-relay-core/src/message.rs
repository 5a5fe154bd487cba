//! Chat message type shared between the remote session and the store.

use serde::{Deserialize, Serialize};

/// A single chat message received from the remote session.
///
/// Serialized in the store as `{"message": .., "user": {"username": ..}}`,
/// the same shape the remote service pushes it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// Username of the sender.
    pub author: String,
}

impl ChatMessage {
    /// Create a new chat message.
    #[must_use]
    pub fn new(text: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireUser {
    #[serde(default)]
    username: String,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(default)]
    message: String,
    user: WireUser,
}

impl From<WireMessage> for ChatMessage {
    fn from(wire: WireMessage) -> Self {
        Self {
            text: wire.message,
            author: wire.user.username,
        }
    }
}

impl From<ChatMessage> for WireMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            message: msg.text,
            user: WireUser {
                username: msg.author,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_shape() {
        let msg = ChatMessage::new("hello", "alice");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "message": "hello", "user": { "username": "alice" } })
        );
    }

    #[test]
    fn test_missing_username_defaults_to_empty() {
        let msg: ChatMessage =
            tokio_test::assert_ok!(serde_json::from_str(r#"{"message":"hi","user":{}}"#));
        assert_eq!(msg.text, "hi");
        assert!(msg.author.is_empty());
    }
}
