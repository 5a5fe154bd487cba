//! The relay loop.
//!
//! Multiplexes three sources into two sinks:
//! - heartbeat ticks go to the remote session
//! - inbound chat messages go to the store (latest key + history)
//! - writes on the send-request key go to the remote session as chat text
//!
//! Reactions run one at a time, so the history needs no locking.

use std::{convert::Infallible, time::Duration};

use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    ChatHistory, ChatMessage, StoreKeys,
    traits::{ChatSession, KeySubscription, KeyValue, KvStore, SessionError},
};

/// Keepalive period expected by the remote service.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fatal relay error. Anything else is logged and skipped.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Could not send heartbeat: {0}")]
    Heartbeat(#[source] SessionError),
    #[error("Remote session closed")]
    SessionClosed,
    #[error("Send-request subscription closed")]
    SubscriptionClosed,
}

/// Relay context: session handle, store handle and the history buffer.
pub struct Relay<S, K> {
    session: S,
    store: K,
    keys: StoreKeys,
    history: ChatHistory,
    heartbeat_interval: Duration,
}

impl<S, K> Relay<S, K>
where
    S: ChatSession,
    K: KvStore,
{
    /// Create a relay with an already loaded history.
    #[must_use]
    pub fn new(session: S, store: K, keys: StoreKeys, history: ChatHistory) -> Self {
        Self {
            session,
            store,
            keys,
            history,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Override the heartbeat period.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Current history buffer.
    #[must_use]
    pub const fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Run until a fatal error.
    ///
    /// `messages` is fed by the remote session reader, `requests` by the
    /// store subscription on the send-request key. Either closing is fatal.
    ///
    /// # Errors
    /// Returns error if a heartbeat cannot be sent or an input closes.
    pub async fn run(
        &mut self,
        mut messages: mpsc::Receiver<ChatMessage>,
        mut requests: KeySubscription,
    ) -> Result<Infallible, RelayError> {
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Heartbeat first so a chat burst can't push back a due tick.
            // Chat messages before send requests: the socket reader blocks
            // on its bounded channel, store pushes do not.
            tokio::select! {
                biased;
                _ = heartbeat.tick() => {
                    self.session
                        .send_heartbeat()
                        .await
                        .map_err(RelayError::Heartbeat)?;
                    tracing::trace!("Sent heartbeat");
                }
                msg = messages.recv() => {
                    let Some(msg) = msg else {
                        return Err(RelayError::SessionClosed);
                    };
                    self.handle_chat_message(msg).await;
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        return Err(RelayError::SubscriptionClosed);
                    };
                    self.forward_request(request).await;
                }
            }
        }
    }

    /// Publish a received message and append it to the persisted history.
    pub async fn handle_chat_message(&mut self, msg: ChatMessage) {
        tracing::debug!(user = %msg.author, "Received message");

        let key = &self.keys.chat_event;
        if let Err(e) = self.store.set_json(key, &msg).await {
            tracing::error!(key = %key, error = %e, "Could not set chat key");
        }

        self.history.push(msg);

        let key = &self.keys.chat_history;
        if let Err(e) = self.store.set_json(key, &self.history).await {
            tracing::error!(key = %key, error = %e, "Could not set chat key");
        }
    }

    /// Forward a send request to the remote session.
    pub async fn forward_request(&self, request: KeyValue) {
        tracing::debug!(key = %request.key, "Received RPC message");
        match self.session.send_chat_message(&request.value).await {
            Ok(()) => tracing::debug!("Sent message"),
            Err(e) => tracing::error!(error = %e, "Could not send chat message"),
        }
    }
}

/// Read the persisted history snapshot.
///
/// A missing or unreadable snapshot is replaced by an empty history,
/// which is written back so the key exists before the loop starts.
pub async fn load_history<K: KvStore>(store: &K, key: &str, capacity: usize) -> ChatHistory {
    match store.get_json::<Vec<ChatMessage>>(key).await {
        Ok(Some(messages)) => return ChatHistory::with_messages(capacity, messages),
        Ok(None) => tracing::debug!(key = %key, "No chat history found"),
        Err(e) => tracing::warn!(key = %key, error = %e, "Discarding unreadable chat history"),
    }

    let history = ChatHistory::new(capacity);
    if let Err(e) = store.set_json(key, &history).await {
        tracing::warn!(key = %key, error = %e, "Could not initialize chat history");
    }
    history
}
