//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::ApiConfig as RuntimeApiConfig;
use crate::client::ControllerConfig;
use crate::hub::HubConfig as RuntimeHubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Event hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Seconds between heartbeats on each stream. Lower values reap dead
    /// peers sooner at the cost of more background traffic.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_push_timeout")]
    pub push_timeout_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

fn default_push_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            channel_capacity: default_channel_capacity(),
            push_timeout_ms: default_push_timeout(),
        }
    }
}

/// Client controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_retry_delay() -> u64 {
    3000
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            retry_delay_ms: default_retry_delay(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` wins over the configured level when set.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("eventhub={},tower_http=info", self.level))
        });

        let registry = tracing_subscriber::registry().with(filter);
        if self.format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("eventhub").join("config.toml")),
            Some(PathBuf::from("/etc/eventhub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(host) = std::env::var("EVENTHUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("EVENTHUB_PORT") {
            self.server.port = port;
        }

        // Hub overrides
        if let Some(secs) = env_parse("EVENTHUB_HEARTBEAT_INTERVAL_SECS") {
            self.hub.heartbeat_interval_secs = secs;
        }
        if let Some(capacity) = env_parse("EVENTHUB_CHANNEL_CAPACITY") {
            self.hub.channel_capacity = capacity;
        }
        if let Some(ms) = env_parse("EVENTHUB_PUSH_TIMEOUT_MS") {
            self.hub.push_timeout_ms = ms;
        }

        // Client overrides
        if let Ok(url) = std::env::var("EVENTHUB_SERVER_URL") {
            self.client.server_url = url;
        }
        if let Some(ms) = env_parse("EVENTHUB_RETRY_DELAY_MS") {
            self.client.retry_delay_ms = ms;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("EVENTHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EVENTHUB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Server settings for the API layer
    pub fn api_config(&self) -> RuntimeApiConfig {
        RuntimeApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            max_body_size: self.server.max_body_size,
        }
    }

    /// Runtime settings for the hub
    pub fn hub_config(&self) -> RuntimeHubConfig {
        RuntimeHubConfig {
            heartbeat_interval: Duration::from_secs(self.hub.heartbeat_interval_secs.max(1)),
            channel_capacity: self.hub.channel_capacity.max(1),
            push_timeout: Duration::from_millis(self.hub.push_timeout_ms),
        }
    }

    /// Controller settings for a client connecting as `client_id`
    pub fn controller_config(&self, client_id: impl Into<String>) -> ControllerConfig {
        ControllerConfig {
            server_url: self.client.server_url.clone(),
            client_id: client_id.into(),
            retry_delay: Duration::from_millis(self.client.retry_delay_ms),
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Eventhub Configuration
#
# Environment variables override these settings:
# - EVENTHUB_HOST
# - EVENTHUB_PORT
# - EVENTHUB_HEARTBEAT_INTERVAL_SECS
# - EVENTHUB_CHANNEL_CAPACITY
# - EVENTHUB_PUSH_TIMEOUT_MS
# - EVENTHUB_SERVER_URL
# - EVENTHUB_RETRY_DELAY_MS
# - EVENTHUB_LOG_LEVEL
# - EVENTHUB_LOG_FORMAT

[server]
# API server host
host = "0.0.0.0"

# API server port
port = 8082

# Maximum publish body size (bytes)
max_body_size = 1048576

[hub]
# Seconds between heartbeats on each stream.
# Shorter periods detect dead clients sooner but send more traffic.
heartbeat_interval_secs = 30

# Events buffered per stream before a push has to wait
channel_capacity = 64

# How long a push may wait on a full buffer before the stream is dropped (ms)
push_timeout_ms = 5000

[client]
# Hub URL used by eventhub-cli
server_url = "http://localhost:8082"

# Fixed delay before reconnecting a lost stream (ms)
retry_delay_ms = 3000

# Timeout for publish requests (seconds)
request_timeout_secs = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
