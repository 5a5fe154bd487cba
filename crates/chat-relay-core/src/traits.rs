//! Traits for the remote chat session and the key-value store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::mpsc;

/// A write observed on a subscribed store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Key that was written.
    pub key: String,
    /// Raw value that was written.
    pub value: String,
}

impl KeyValue {
    /// Create a new key/value pair.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Live feed of writes to a subscribed key.
pub type KeySubscription = mpsc::UnboundedReceiver<KeyValue>;

/// Remote session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session closed")]
    Closed,
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection closed")]
    Closed,
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Decode error for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Store error: {error} ({details})")]
    Server { error: String, details: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outbound half of the remote chat session.
///
/// The inbound half is a channel of decoded messages handed to the relay.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send a keepalive frame.
    async fn send_heartbeat(&self) -> Result<(), SessionError>;

    /// Send a chat message to the configured channel.
    ///
    /// The text is escaped by the implementation; callers pass it raw.
    async fn send_chat_message(&self, text: &str) -> Result<(), SessionError>;
}

/// Shared key-value store with pub/sub on keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a raw value. `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a raw value.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Subscribe to every subsequent write of `key`.
    async fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError>;

    /// Read and deserialize a JSON value.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })
    }

    /// Serialize a value as JSON and write it.
    async fn set_json<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value).map_err(StoreError::Encode)?;
        self.set(key, raw).await
    }
}

#[async_trait]
impl<T: KvStore> KvStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError> {
        (**self).subscribe(key).await
    }
}
