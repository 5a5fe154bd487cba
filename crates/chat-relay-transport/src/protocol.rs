//! Wire protocol for the remote chat socket.
//!
//! Every frame is a 5-element JSON array:
//! `[join_ref, ref, topic, event, payload]`.
//! Data pushes carry `null` for both refs; replies and other control
//! frames carry both.

use chat_relay_core::ChatMessage;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Topic for join, subscription and mutation documents.
pub const CONTROL_TOPIC: &str = "__absinthe__:control";
/// Topic for heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<P> {
    /// Join reference. `None` on data pushes.
    pub join_ref: Option<String>,
    /// Message reference. `None` on data pushes.
    pub reference: Option<String>,
    /// Channel topic.
    pub topic: String,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: P,
}

/// GraphQL document sent on the control topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Query, subscription or mutation text.
    pub query: String,
    /// Query variables. Always empty here; values are inlined.
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl Document {
    fn new(query: String) -> Self {
        Self {
            query,
            variables: Map::new(),
        }
    }
}

impl<P> Frame<P> {
    fn control(reference: &str, topic: &str, event: &str, payload: P) -> Self {
        Self {
            join_ref: Some("1".to_string()),
            reference: Some(reference.to_string()),
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        }
    }

    /// Whether this is a data push rather than a control frame.
    #[must_use]
    pub const fn is_push(&self) -> bool {
        self.join_ref.is_none() && self.reference.is_none()
    }
}

impl<P: Serialize> Frame<P> {
    /// Encode as a JSON text frame.
    ///
    /// # Errors
    /// Returns error if the payload fails to serialize.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Frame<Map<String, Value>> {
    /// Join the control channel.
    #[must_use]
    pub fn join() -> Self {
        Self::control("1", CONTROL_TOPIC, "phx_join", Map::new())
    }

    /// Keepalive frame.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::control("3", PHOENIX_TOPIC, "heartbeat", Map::new())
    }
}

impl Frame<Document> {
    /// Subscribe to chat messages of a channel.
    #[must_use]
    pub fn subscribe_chat(channel_id: u64) -> Self {
        let query = format!(
            "subscription{{ chatMessage(channelId: {channel_id}) {{ user {{ username }} message }} }}"
        );
        Self::control("2", CONTROL_TOPIC, "doc", Document::new(query))
    }

    /// Post a chat message to a channel.
    ///
    /// `text` is trimmed and escaped for the GraphQL string literal.
    #[must_use]
    pub fn send_chat(channel_id: u64, text: &str) -> Self {
        let message = escape_message(text);
        let query = format!(
            "mutation {{createChatMessage(channelId: {channel_id}, message: {{message: \"{message}\"}}) {{ message }}}}"
        );
        Self::control("4", CONTROL_TOPIC, "doc", Document::new(query))
    }
}

impl<P: Serialize> Serialize for Frame<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            &self.join_ref,
            &self.reference,
            &self.topic,
            &self.event,
            &self.payload,
        )
            .serialize(serializer)
    }
}

impl<'de, P: DeserializeOwned> Deserialize<'de> for Frame<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (join_ref, reference, topic, event, payload) =
            <(Option<String>, Option<String>, String, String, P)>::deserialize(deserializer)?;
        Ok(Self {
            join_ref,
            reference,
            topic,
            event,
            payload,
        })
    }
}

#[derive(Deserialize)]
struct ChatPush {
    result: ChatPushResult,
}

#[derive(Deserialize)]
struct ChatPushResult {
    data: ChatPushData,
}

#[derive(Deserialize)]
struct ChatPushData {
    #[serde(rename = "chatMessage")]
    chat_message: ChatMessage,
}

/// Decode an inbound text frame.
///
/// Returns `None` for control frames; their payload is not inspected.
///
/// # Errors
/// Returns error if the frame is not a 5-element array or a data push
/// does not carry a chat message.
pub fn decode_chat_frame(text: &str) -> Result<Option<ChatMessage>, ProtocolError> {
    let frame: Frame<Value> = serde_json::from_str(text)?;
    if !frame.is_push() {
        return Ok(None);
    }
    let push: ChatPush = serde_json::from_value(frame.payload)?;
    Ok(Some(push.result.data.chat_message))
}

/// Trim and escape text for a double-quoted GraphQL string.
#[must_use]
pub fn escape_message(text: &str) -> String {
    let text = text.trim();
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}
