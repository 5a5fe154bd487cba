//! Key-value store clients for the chat relay.
//!
//! Provides:
//! - `KilovoltClient` - Websocket client for a Kilovolt store
//! - `MemoryStore` - In-process store (feature: memory)

pub mod kilovolt;
pub mod protocol;

#[cfg(feature = "memory")]
pub mod memory;

pub use kilovolt::{ConnectError, KilovoltClient};

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
