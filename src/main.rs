mod bot;
mod calc;
mod commands;
mod config;
mod error;
mod events;
mod memory;
mod platform;
mod reply;
mod server;
mod streams;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::platform::http::HttpBotApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webhook_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Listen: {}", config.server.bind_addr());
    info!("  Webhook path: {}", config.server.webhook_path);
    info!("  API base URL: {}", config.platform.api_base_url);
    info!("  History capacity: {}", config.history.capacity);
    info!(
        "  Stream: {} chars every {}ms, {} concurrent",
        config.stream.chunk_chars, config.stream.chunk_delay_ms, config.stream.max_concurrent
    );

    let api = HttpBotApi::new(&config.platform, &config.stream)?;
    let state = Arc::new(AppState::new(Arc::new(api), &config));

    info!("Bot is starting...");
    server::serve(state, &config).await?;

    info!("Bot stopped");
    Ok(())
}
