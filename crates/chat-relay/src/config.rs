//! Command-line configuration.

use chat_relay_core::DEFAULT_HISTORY_CAPACITY;
use chat_relay_store::kilovolt::DEFAULT_ENDPOINT;
use chat_relay_transport::{
    ClientCredentials, auth::DEFAULT_TOKEN_ENDPOINT, websocket::DEFAULT_SOCKET_ENDPOINT,
};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

/// Relay configuration. Read once at startup.
#[derive(Debug, Parser)]
#[command(name = "chat-relay", version)]
#[command(about = "Relay chat messages between a live chat socket and a Kilovolt store", long_about = None)]
pub struct Config {
    /// Kilovolt endpoint
    #[arg(long, env = "KV_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub kv_endpoint: String,

    /// Optional password for Kilovolt
    #[arg(long, env = "KV_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prefix/namespace for keys
    #[arg(long, env = "KV_PREFIX", default_value = "glimesh/")]
    pub prefix: String,

    /// Chat channel ID
    #[arg(long, env = "CHANNEL_ID")]
    pub channel_id: u64,

    /// App client ID
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// App secret key
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Number of chat messages to keep in history
    #[arg(long, env = "CHAT_HISTORY", default_value_t = DEFAULT_HISTORY_CAPACITY, value_parser = parse_capacity)]
    pub chat_history: usize,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// OAuth token endpoint
    #[arg(long, env = "TOKEN_ENDPOINT", default_value = DEFAULT_TOKEN_ENDPOINT)]
    pub token_endpoint: String,

    /// Chat socket endpoint
    #[arg(long, env = "SOCKET_ENDPOINT", default_value = DEFAULT_SOCKET_ENDPOINT)]
    pub socket_endpoint: String,
}

impl Config {
    /// Application credentials for the token exchange.
    #[must_use]
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    /// Log filter for `--log-level`.
    #[must_use]
    pub fn log_filter(&self) -> LevelFilter {
        parse_log_level(&self.log_level)
    }
}

/// Map a level name to a filter, falling back to `info`.
#[must_use]
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level {
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    let capacity: usize = s.parse().map_err(|e| format!("{e}"))?;
    if capacity == 0 {
        return Err("history size must be at least 1".to_string());
    }
    Ok(capacity)
}
