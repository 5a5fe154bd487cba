//! Relay between a live chat socket and a Kilovolt store.
//!
//! Incoming chat messages are published to `<prefix>ev/chat-message` and
//! appended to `<prefix>chat-history`; writes to `<prefix>@send-chat-message`
//! are posted to the chat.
//!
//! Run with: cargo run -p chat-relay -- --channel-id <id> --client-id <id> --client-secret <secret>

mod config;

use anyhow::{Context, Result};
use chat_relay_core::{KvStore, Relay, StoreKeys, load_history};
use chat_relay_store::KilovoltClient;
use chat_relay_transport::{ChatSocket, fetch_token};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    let store = KilovoltClient::connect(&config.kv_endpoint, config.password.as_deref())
        .await
        .context("Connection to kilovolt failed")?;
    tracing::info!(endpoint = %config.kv_endpoint, "Connected to Kilovolt");

    let keys = StoreKeys::new(&config.prefix);
    let history = load_history(&store, &keys.chat_history, config.chat_history).await;

    let token = fetch_token(
        &reqwest::Client::new(),
        &config.token_endpoint,
        &config.credentials(),
    )
    .await
    .context("Could not retrieve API token")?;

    let (socket, messages) = ChatSocket::connect(
        &config.socket_endpoint,
        &token.access_token,
        config.channel_id,
    )
    .await
    .context("Could not connect to chat websocket")?;
    tracing::info!(channel_id = socket.channel_id(), "Joined chat channel");

    let requests = store
        .subscribe(&keys.send_chat_rpc)
        .await
        .context("Could not subscribe to chat RPC key")?;

    let mut relay = Relay::new(socket.clone(), store.clone(), keys, history);

    let outcome = tokio::select! {
        result = relay.run(messages, requests) => result.map(|never| match never {}),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Could not listen for shutdown signal")?;
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    socket.close().await;
    store.close().await;

    outcome.context("Relay stopped")
}

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().to_string().into()),
        )
        .init();
}
