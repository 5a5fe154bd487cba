//! Kilovolt websocket client.
//!
//! Requests are correlated to their responses by `request_id`; pushes are
//! fanned out to every subscriber of the written key.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chat_relay_core::{KeySubscription, KeyValue, KvStore, StoreError};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::{Value, json};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::protocol::{
    self, AuthChallenge, CMD_AUTH_CHALLENGE, CMD_AUTH_REQUEST, CMD_GET, CMD_SET, CMD_SUBSCRIBE,
    Request, Response, ServerMessage,
};

/// Default store endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4337/ws";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `None` once the connection is gone, so late requests fail fast.
type Pending = Arc<Mutex<Option<HashMap<String, oneshot::Sender<Response>>>>>;
type Subscribers = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<KeyValue>>>>>;

/// Connect error.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

impl From<StoreError> for ConnectError {
    fn from(e: StoreError) -> Self {
        Self::AuthFailed(e.to_string())
    }
}

/// Client for a Kilovolt store.
///
/// Cloning shares the same connection.
#[derive(Clone)]
pub struct KilovoltClient {
    sink: Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>,
    pending: Pending,
    subscribers: Subscribers,
}

impl KilovoltClient {
    /// Connect to the store, authenticating when a password is given.
    ///
    /// # Errors
    /// Returns error if the URL is invalid, the connection fails or the
    /// store rejects the password.
    pub async fn connect(endpoint: &str, password: Option<&str>) -> Result<Self, ConnectError> {
        let url = websocket_url(endpoint)?;
        let (stream, _) = connect_async(url.as_str()).await?;
        let (sink, stream) = stream.split();

        let client = Self {
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            pending: Arc::new(Mutex::new(Some(HashMap::new()))),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        };

        tokio::spawn(read_loop(
            stream,
            Arc::clone(&client.pending),
            Arc::clone(&client.subscribers),
        ));

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            client.authenticate(password).await?;
        }

        Ok(client)
    }

    async fn authenticate(&self, password: &str) -> Result<(), ConnectError> {
        let data = self.request(CMD_AUTH_REQUEST, json!({})).await?;
        let challenge: AuthChallenge = protocol::decode_data(data)
            .map_err(|e| ConnectError::AuthFailed(format!("invalid challenge: {e}")))?;
        let hash = protocol::challenge_hash(password, &challenge)
            .map_err(|e| ConnectError::AuthFailed(e.to_string()))?;

        self.request(CMD_AUTH_CHALLENGE, json!({ "hash": hash }))
            .await?;
        tracing::debug!("Authenticated with store");
        Ok(())
    }

    /// Send a command and wait for its response data.
    ///
    /// There is no timeout; a store that never answers stalls the caller.
    ///
    /// # Errors
    /// Returns error if the connection is closed or the store answers with
    /// an error.
    pub async fn request(&self, command: &str, data: Value) -> Result<Value, StoreError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(pending) = pending.as_mut() else {
                return Err(StoreError::Closed);
            };
            pending.insert(request_id.clone(), tx);
        }

        let request = Request {
            command: command.to_string(),
            data,
            request_id: request_id.clone(),
        };
        if let Err(e) = self.send_json(&request).await {
            self.forget(&request_id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| StoreError::Closed)?;
        if response.ok {
            Ok(response.data)
        } else {
            Err(StoreError::Server {
                error: response.error.unwrap_or_default(),
                details: response.details.unwrap_or_default(),
            })
        }
    }

    /// Close the connection.
    pub async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            tracing::debug!("Failed to close store connection: {e}");
        }
    }

    async fn send_json(&self, request: &Request) -> Result<(), StoreError> {
        let json = serde_json::to_string(request).map_err(StoreError::Encode)?;
        self.sink
            .lock()
            .await
            .send(Message::text(json))
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn unsubscribe(&self, key: &str, tx: &mpsc::UnboundedSender<KeyValue>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = subscribers.get_mut(key) {
            senders.retain(|s| !s.same_channel(tx));
            if senders.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    fn forget(&self, request_id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = pending.as_mut() {
            pending.remove(request_id);
        }
    }
}

#[async_trait]
impl KvStore for KilovoltClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.request(CMD_GET, json!({ "key": key })).await?;
        Ok(match data {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.request(CMD_SET, json!({ "key": key, "data": value }))
            .await
            .map(|_| ())
    }

    async fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError> {
        // Register first so no push between ack and return is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .push(tx.clone());

        if let Err(e) = self.request(CMD_SUBSCRIBE, json!({ "key": key })).await {
            self.unsubscribe(key, &tx);
            return Err(e);
        }
        Ok(rx)
    }
}

/// Map `http(s)` endpoints to `ws(s)`.
///
/// # Errors
/// Returns error if the URL is invalid or uses another scheme.
pub fn websocket_url(endpoint: &str) -> Result<Url, ConnectError> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => return Err(ConnectError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| ConnectError::UnsupportedScheme(url.scheme().to_string()))?;
    Ok(url)
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: Pending, subscribers: Subscribers) {
    while let Some(next) = stream.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("Store connection error: {e}");
                break;
            }
        };

        let msg = match serde_json::from_str::<ServerMessage>(text.as_str()) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Invalid store message: {e}");
                continue;
            }
        };

        match msg {
            ServerMessage::Response(response) => {
                let Some(id) = response.request_id.clone() else {
                    continue;
                };
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_mut()
                    .and_then(|p| p.remove(&id));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(response);
                }
            }
            ServerMessage::Push { key, new_value } => {
                let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(senders) = subscribers.get_mut(&key) {
                    senders.retain(|tx| tx.send(KeyValue::new(&key, &new_value)).is_ok());
                }
            }
            ServerMessage::Hello { version } => {
                tracing::debug!(version = %version, "Store greeted");
            }
            ServerMessage::Unknown => {}
        }
    }

    tracing::warn!("Store connection closed");
    // Dropping the senders fails pending requests and ends subscriptions.
    pending.lock().unwrap_or_else(PoisonError::into_inner).take();
    subscribers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    /// Minimal in-process Kilovolt server for one client.
    async fn spawn_server(password: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::text(r#"{"type":"hello","version":"v6"}"#))
                .await
                .unwrap();

            let mut values: HashMap<String, String> = HashMap::new();
            let mut subscribed: Vec<String> = Vec::new();
            let mut authenticated = password.is_none();
            let challenge = AuthChallenge {
                challenge: BASE64.encode(b"challenge"),
                salt: BASE64.encode(b"salt"),
            };

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let req: Request = serde_json::from_str(text.as_str()).unwrap();
                let key = req.data["key"].as_str().unwrap_or_default().to_string();
                let mut pushes = Vec::new();

                let mut response = Response {
                    ok: true,
                    request_id: Some(req.request_id.clone()),
                    ..Response::default()
                };
                match req.command.as_str() {
                    CMD_AUTH_REQUEST => {
                        response.data = json!({ "challenge": challenge.challenge, "salt": challenge.salt });
                    }
                    CMD_AUTH_CHALLENGE => {
                        let expected = protocol::challenge_hash(password.unwrap(), &challenge).unwrap();
                        authenticated = req.data["hash"] == expected;
                        if !authenticated {
                            response.ok = false;
                            response.error = Some("authentication failed".into());
                        }
                    }
                    _ if !authenticated => {
                        response.ok = false;
                        response.error = Some("authentication required".into());
                    }
                    CMD_GET => {
                        response.data = Value::String(values.get(&key).cloned().unwrap_or_default());
                    }
                    CMD_SET => {
                        let value = req.data["data"].as_str().unwrap().to_string();
                        if subscribed.contains(&key) {
                            pushes.push(json!({ "type": "push", "key": key, "new_value": value }));
                        }
                        values.insert(key, value);
                    }
                    CMD_SUBSCRIBE => subscribed.push(key),
                    _ => response.ok = false,
                }

                let mut reply = serde_json::to_value(&response).unwrap();
                reply["type"] = json!("response");
                ws.send(Message::text(reply.to_string())).await.unwrap();
                for push in pushes {
                    ws.send(Message::text(push.to_string())).await.unwrap();
                }
            }
        });

        format!("http://{addr}/ws")
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(websocket_url(DEFAULT_ENDPOINT).unwrap().as_str(), "ws://localhost:4337/ws");
        assert_eq!(websocket_url("https://kv.example/ws").unwrap().scheme(), "wss");
        assert_eq!(websocket_url("ws://kv.example/ws").unwrap().scheme(), "ws");
        assert!(matches!(
            websocket_url("ftp://kv.example"),
            Err(ConnectError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_get_set_subscribe() {
        let endpoint = spawn_server(None).await;
        let client = KilovoltClient::connect(&endpoint, None).await.unwrap();

        assert_eq!(client.get("missing").await.unwrap(), None);

        let mut sub = client.subscribe("rpc").await.unwrap();
        client.set("rpc", "hello".to_string()).await.unwrap();
        client.set("other", "ignored".to_string()).await.unwrap();

        assert_eq!(client.get("rpc").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(sub.recv().await, Some(KeyValue::new("rpc", "hello")));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let endpoint = spawn_server(None).await;
        let client = KilovoltClient::connect(&endpoint, None).await.unwrap();

        client.set_json("list", &vec![1, 2, 3]).await.unwrap();
        let list: Option<Vec<i32>> = client.get_json("list").await.unwrap();
        assert_eq!(list, Some(vec![1, 2, 3]));

        client.set("bad", "{not json".to_string()).await.unwrap();
        let bad = client.get_json::<Vec<i32>>("bad").await;
        assert!(matches!(bad, Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_authentication() {
        let endpoint = spawn_server(Some("hunter2")).await;
        let client = KilovoltClient::connect(&endpoint, Some("hunter2")).await.unwrap();
        client.set("k", "v".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let endpoint = spawn_server(Some("hunter2")).await;
        let result = KilovoltClient::connect(&endpoint, Some("wrong")).await;
        assert!(matches!(result, Err(ConnectError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let endpoint = spawn_server(Some("hunter2")).await;
        let client = KilovoltClient::connect(&endpoint, None).await.unwrap();
        let err = client.set("k", "v".to_string()).await.unwrap_err();
        assert!(matches!(err, StoreError::Server { error, .. } if error == "authentication required"));
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_not_registered() {
        let endpoint = spawn_server(Some("hunter2")).await;
        let client = KilovoltClient::connect(&endpoint, None).await.unwrap();

        let err = client.subscribe("rpc").await.unwrap_err();
        assert!(matches!(err, StoreError::Server { .. }));
        assert!(!client.subscribers.lock().unwrap().contains_key("rpc"));
    }
}
