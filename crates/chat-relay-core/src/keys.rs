//! Store key layout.

/// Keys the relay reads and writes, all under one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    /// Last received chat message.
    pub chat_event: String,
    /// Write-only RPC key; every write is a send request.
    pub send_chat_rpc: String,
    /// Persisted bounded history.
    pub chat_history: String,
}

impl StoreKeys {
    /// Build the key set for a namespace prefix such as `glimesh/`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            chat_event: format!("{prefix}ev/chat-message"),
            send_chat_rpc: format!("{prefix}@send-chat-message"),
            chat_history: format!("{prefix}chat-history"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_layout() {
        let keys = StoreKeys::new("glimesh/");
        assert_eq!(keys.chat_event, "glimesh/ev/chat-message");
        assert_eq!(keys.send_chat_rpc, "glimesh/@send-chat-message");
        assert_eq!(keys.chat_history, "glimesh/chat-history");
    }
}
