//! # Eventhub
//!
//! Real-time event delivery over Server-Sent Events. A server-side hub holds
//! one long-lived push stream per connected client and routes published
//! events to a single client or to all of them; a client-side controller
//! keeps a stream attached and reconnects after failures.
//!
//! ## Features
//!
//! - **Unicast and broadcast**: Publish to one identity or every connected client
//! - **Fault isolation**: A broken or stalled stream only drops itself
//! - **Heartbeats**: Periodic liveness frames reap silently dead peers
//! - **Self-healing client**: Fixed-delay reconnect loop with one pending retry
//!
//! ## Modules
//!
//! - [`hub`]: Sessions, registry, dispatcher and heartbeats
//! - [`api`]: HTTP endpoints with Axum
//! - [`client`]: Reconnecting stream controller
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eventhub::{serve, Config, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let api_config = config.api_config();
//!
//!     let state = AppState::with_hub_config(api_config.clone(), config.hub_config());
//!     serve(state, &api_config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod hub;

// Re-export top-level types for convenience
pub use hub::{
    ClientId, Dispatcher, Envelope, HeartbeatScheduler, HubConfig, Session, SessionRegistry,
    Target, TransportError,
};

pub use api::{build_router, serve, serve_on, ApiConfig, ApiError, AppState};

pub use client::{
    ClientError, ClientEvents, ConnectionController, ConnectionState, ControllerConfig,
    EventSource, HttpEventSource,
};

pub use config::{Config, ConfigError, LoggingConfig};
