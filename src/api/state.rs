//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::hub::{Dispatcher, HeartbeatScheduler, HubConfig, SessionRegistry};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live event streams
    pub registry: Arc<SessionRegistry>,
    /// Routes published events over the registry
    pub dispatcher: Dispatcher,
    /// Starts a liveness timer for each new stream
    pub heartbeat: HeartbeatScheduler,
    /// Hub buffer and timeout settings
    pub hub_config: Arc<HubConfig>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with default hub settings
    pub fn new(config: ApiConfig) -> Self {
        Self::with_hub_config(config, HubConfig::default())
    }

    /// Create AppState with custom hub configuration
    pub fn with_hub_config(config: ApiConfig, hub_config: HubConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            heartbeat: HeartbeatScheduler::new(hub_config.heartbeat_interval),
            hub_config: Arc::new(hub_config),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Number of open event streams
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum publish body size in bytes
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
