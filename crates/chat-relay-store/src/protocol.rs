//! Kilovolt wire protocol.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::Sha256;

pub const CMD_GET: &str = "kget";
pub const CMD_SET: &str = "kset";
pub const CMD_SUBSCRIBE: &str = "ksub";
pub const CMD_AUTH_REQUEST: &str = "klogin";
pub const CMD_AUTH_CHALLENGE: &str = "kauth";

/// Request from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub data: Value,
    pub request_id: String,
}

/// Reply to a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent on connect.
    Hello {
        #[serde(default)]
        version: String,
    },
    /// Reply correlated by `request_id`.
    Response(Response),
    /// Write notification for a subscribed key.
    Push { key: String, new_value: String },
    /// Anything this client does not handle.
    #[serde(other)]
    Unknown,
}

/// Error computing the auth hash.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid HMAC key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),
}

/// Challenge returned by `klogin`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

/// Decode response data that may be an object or a JSON-encoded string.
///
/// # Errors
/// Returns error if neither form matches `T`.
pub fn decode_data<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    match data {
        Value::String(raw) => serde_json::from_str(&raw),
        other => serde_json::from_value(other),
    }
}

/// Compute the `kauth` hash: `base64(HMAC-SHA256(password ++ salt, challenge))`.
///
/// # Errors
/// Returns error if challenge or salt is not valid base64.
pub fn challenge_hash(password: &str, challenge: &AuthChallenge) -> Result<String, ChallengeError> {
    let challenge_bytes = BASE64.decode(&challenge.challenge)?;
    let salt_bytes = BASE64.decode(&challenge.salt)?;

    let mut key = password.as_bytes().to_vec();
    key.extend_from_slice(&salt_bytes);

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)?;
    mac.update(&challenge_bytes);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
