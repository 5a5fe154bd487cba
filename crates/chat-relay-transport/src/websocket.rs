//! WebSocket session with the remote chat service.

use std::sync::Arc;

use async_trait::async_trait;
use chat_relay_core::{ChatMessage, ChatSession, SessionError};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

use crate::protocol::{self, Frame};

/// Default socket endpoint of the remote service.
pub const DEFAULT_SOCKET_ENDPOINT: &str = "wss://glimesh.tv/api/socket/websocket";

/// Socket protocol version sent as the `vsn` query parameter.
pub const PROTOCOL_VERSION: &str = "2.0.0";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect error.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid socket URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Handshake failed: {0}")]
    Handshake(#[source] SessionError),
}

/// Live session with the remote chat service.
///
/// Cloning shares the same socket.
#[derive(Clone)]
pub struct ChatSocket {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    channel_id: u64,
}

impl ChatSocket {
    /// Connect, join the control channel and subscribe to chat messages.
    ///
    /// Returns the session and the receiving end of decoded chat messages.
    /// The channel closes when the socket closes or fails.
    ///
    /// # Errors
    /// Returns error if the URL is invalid, the connection fails or a
    /// handshake frame cannot be written.
    pub async fn connect(
        endpoint: &str,
        token: &str,
        channel_id: u64,
    ) -> Result<(Self, mpsc::Receiver<ChatMessage>), ConnectError> {
        let url = socket_url(endpoint, token)?;
        let (stream, _) = connect_async(url.as_str()).await?;
        let (sink, stream) = stream.split();

        let socket = Self {
            sink: Arc::new(Mutex::new(sink)),
            channel_id,
        };
        socket
            .send_frame(&Frame::join())
            .await
            .map_err(ConnectError::Handshake)?;
        socket
            .send_frame(&Frame::subscribe_chat(channel_id))
            .await
            .map_err(ConnectError::Handshake)?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(receive_loop(stream, tx));

        Ok((socket, rx))
    }

    /// Channel this session posts to.
    #[must_use]
    pub const fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Close the socket with a "going away" status.
    pub async fn close(&self) {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "app was closed".into(),
        };
        if let Err(e) = self.sink.lock().await.send(Message::Close(Some(frame))).await {
            tracing::debug!("Failed to close websocket: {e}");
        }
    }

    async fn send_frame<P: Serialize + Sync>(&self, frame: &Frame<P>) -> Result<(), SessionError> {
        let json = frame
            .encode()
            .map_err(|e| SessionError::Encode(e.to_string()))?;
        tracing::trace!(frame = %json, "Sending frame");
        self.sink
            .lock()
            .await
            .send(Message::text(json))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ChatSession for ChatSocket {
    async fn send_heartbeat(&self) -> Result<(), SessionError> {
        self.send_frame(&Frame::heartbeat()).await
    }

    async fn send_chat_message(&self, text: &str) -> Result<(), SessionError> {
        let frame = Frame::send_chat(self.channel_id, text);
        tracing::debug!(query = %frame.payload.query, "Sending chat message");
        self.send_frame(&frame).await
    }
}

/// Build the socket URL with protocol version and access token.
///
/// # Errors
/// Returns error if `endpoint` is not a valid URL.
pub fn socket_url(endpoint: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut()
        .append_pair("vsn", PROTOCOL_VERSION)
        .append_pair("token", token);
    Ok(url)
}

async fn receive_loop(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<ChatMessage>) {
    while let Some(next) = stream.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                tracing::error!(?frame, "Connection was closed by remote");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("Could not read from websocket: {e}");
                return;
            }
        };
        tracing::debug!(frame = %text.as_str(), "Received frame");

        match protocol::decode_chat_frame(text.as_str()) {
            Ok(Some(msg)) => {
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Could not decode websocket message: {e}"),
        }
    }
    tracing::error!("Connection was closed by remote");
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    const PUSH: &str = r#"[null,null,"__absinthe__:doc:abc","subscription:data",{"result":{"data":{"chatMessage":{"message":"hello","user":{"username":"alice"}}}},"subscriptionId":"__absinthe__:doc:abc"}]"#;

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected websocket event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_socket_url() {
        let url = socket_url(DEFAULT_SOCKET_ENDPOINT, "tok en").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://glimesh.tv/api/socket/websocket?vsn=2.0.0&token=tok+en"
        );
        assert!(socket_url("not a url", "t").is_err());
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let mut received = vec![next_text(&mut ws).await, next_text(&mut ws).await];
            ws.send(Message::text(
                r#"["1","1","__absinthe__:control","phx_reply",{"response":{},"status":"ok"}]"#,
            ))
            .await
            .unwrap();
            ws.send(Message::text("garbage")).await.unwrap();
            ws.send(Message::text(PUSH)).await.unwrap();

            received.push(next_text(&mut ws).await);
            received.push(next_text(&mut ws).await);
            ws.close(None).await.unwrap();
            received
        });

        let endpoint = format!("ws://{addr}/api/socket/websocket");
        let (socket, mut messages) = ChatSocket::connect(&endpoint, "token", 42).await.unwrap();
        assert_eq!(socket.channel_id(), 42);

        let msg = messages.recv().await.unwrap();
        assert_eq!(msg, ChatMessage::new("hello", "alice"));

        socket.send_heartbeat().await.unwrap();
        socket.send_chat_message(" say \"hi\" ").await.unwrap();

        assert!(messages.recv().await.is_none());

        let received = server.await.unwrap();
        assert_eq!(received[0], Frame::join().encode().unwrap());
        assert_eq!(received[1], Frame::subscribe_chat(42).encode().unwrap());
        assert_eq!(received[2], Frame::heartbeat().encode().unwrap());
        assert_eq!(received[3], Frame::send_chat(42, "say \"hi\"").encode().unwrap());
    }
}
