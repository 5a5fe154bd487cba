//! In-memory key-value store.

use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
};

use async_trait::async_trait;
use chat_relay_core::{KeySubscription, KeyValue, KvStore, StoreError};
use tokio::sync::mpsc;

/// In-memory store implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<KeyValue>>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .insert(key.to_string(), value.clone());

        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if let Some(senders) = subscribers.get_mut(key) {
            senders.retain(|tx| tx.send(KeyValue::new(key, value.as_str())).is_ok());
        }

        Ok(())
    }

    async fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .entry(key.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
