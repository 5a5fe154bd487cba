//! Remote chat session client.
//!
//! Provides:
//! - Wire protocol (5-element JSON frames)
//! - WebSocket session implementing `ChatSession`
//! - OAuth client-credentials exchange

pub mod auth;
pub mod protocol;
pub mod websocket;

pub use auth::{ClientCredentials, TokenResponse, fetch_token};
pub use protocol::{Document, Frame, ProtocolError};
pub use websocket::{ChatSocket, ConnectError};
