//! Core types and the relay loop for the chat relay.
//!
//! This crate provides:
//! - `ChatMessage` / `ChatHistory` - Chat data and the bounded history window
//! - `StoreKeys` - Store key layout under a namespace prefix
//! - `ChatSession` / `KvStore` - Seams for the remote session and the store
//! - `Relay` - The event loop routing between them

pub mod history;
pub mod keys;
pub mod message;
pub mod relay;
pub mod traits;

pub use history::{ChatHistory, DEFAULT_HISTORY_CAPACITY};
pub use keys::StoreKeys;
pub use message::ChatMessage;
pub use relay::{HEARTBEAT_INTERVAL, Relay, RelayError, load_history};
pub use traits::{ChatSession, KeySubscription, KeyValue, KvStore, SessionError, StoreError};
