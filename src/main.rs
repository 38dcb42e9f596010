//! Eventhub Server
//!
//! Run with: cargo run --bin eventhub
//!
//! # Configuration
//!
//! Loaded from `~/.config/eventhub/config.toml`, `/etc/eventhub/config.toml`
//! or `./config.toml`, then overridden by environment variables:
//! - `EVENTHUB_HOST` / `EVENTHUB_PORT`: Bind address (default: 0.0.0.0:8082)
//! - `EVENTHUB_HEARTBEAT_INTERVAL_SECS`: Heartbeat period (default: 30)
//! - `EVENTHUB_CHANNEL_CAPACITY`: Per-stream buffer (default: 64)
//! - `EVENTHUB_PUSH_TIMEOUT_MS`: Slow consumer cutoff (default: 5000)
//! - `RUST_LOG`: Log filter (default: from `[logging]`)

use eventhub::api::{serve, AppState};
use eventhub::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();
    config.logging.init();

    tracing::info!("Starting Eventhub server v{}", env!("CARGO_PKG_VERSION"));

    let api_config = config.api_config();
    let hub_config = config.hub_config();

    tracing::info!(
        heartbeat_secs = hub_config.heartbeat_interval.as_secs(),
        channel_capacity = hub_config.channel_capacity,
        push_timeout_ms = hub_config.push_timeout.as_millis() as u64,
        "Hub configured"
    );

    let state = AppState::with_hub_config(api_config.clone(), hub_config);

    tracing::info!("Starting server on {}", api_config.addr());
    serve(state, &api_config).await?;

    tracing::info!("Eventhub server stopped");
    Ok(())
}
