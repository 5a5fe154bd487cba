//! OAuth client-credentials exchange.

use std::fmt;

use serde::Deserialize;

/// Default token endpoint of the remote service.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://glimesh.tv/api/oauth/token";

/// Scope requested for the relay.
pub const CHAT_SCOPE: &str = "chat";

/// Auth error.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application credentials.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Exchange application credentials for an access token.
///
/// # Errors
/// Returns error if the request fails, the endpoint answers with a non-2xx
/// status or the body has no access token.
pub async fn fetch_token(
    http: &reqwest::Client,
    endpoint: &str,
    credentials: &ClientCredentials,
) -> Result<TokenResponse, AuthError> {
    let response = http
        .post(endpoint)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", CHAT_SCOPE),
        ])
        .send()
        .await?
        .error_for_status()?;

    Ok(response.json().await?)
}
