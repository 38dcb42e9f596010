//! Eventhub CLI
//!
//! Command-line client for an Eventhub server:
//! - Listen on an event stream
//! - Publish events
//! - Check status
//! - Generate a config file

use clap::{Parser, Subcommand};
use eventhub::client::{ClientError, ClientEvents, ConnectionController, ConnectionState};
use eventhub::config::generate_default_config;
use eventhub::{Config, Envelope};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "eventhub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time event hub client")]
#[command(long_about = "Eventhub pushes events to connected clients over Server-Sent Events.\nListen on a stream, publish events, and inspect the hub.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Hub server URL (default: from config, http://localhost:8082)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an event stream and print incoming events
    Listen {
        /// Identity to connect as
        #[arg(short, long)]
        user_id: String,
    },

    /// Publish an event
    Publish {
        /// Event type (e.g. registration.confirmed)
        event_type: String,
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,
        /// Deliver only to this user
        #[arg(short, long, conflicts_with = "broadcast")]
        target: Option<String>,
        /// Deliver to every connected client
        #[arg(short, long)]
        broadcast: bool,
    },

    /// Show hub status
    Status,

    /// List connected clients
    Connections,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Prints stream activity to the terminal
struct Printer {
    json: bool,
}

impl ClientEvents for Printer {
    fn on_message(&self, envelope: Envelope) {
        if self.json {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to format event: {}", e),
            }
            return;
        }

        let data = envelope
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "[{}] {:<28} {}",
            envelope.timestamp.format("%H:%M:%S"),
            envelope.event_type,
            data
        );
    }

    fn on_state_change(&self, state: ConnectionState) {
        if !self.json {
            eprintln!("-- {:?}", state);
        }
    }

    fn on_error(&self, error: &ClientError) {
        eprintln!("-- stream error: {}", error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_default();
    if let Some(url) = cli.api_url.clone() {
        config.client.server_url = url;
    }
    let api_url = config.client.server_url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Listen { user_id } => {
            config.logging.init();

            let printer = Arc::new(Printer {
                json: cli.format == "json",
            });
            let controller = ConnectionController::new(config.controller_config(user_id), printer)?;
            controller.connect();

            tokio::signal::ctrl_c().await?;
            controller.disconnect();
        }

        Commands::Publish {
            event_type,
            data,
            target,
            broadcast,
        } => {
            if target.is_none() && !broadcast {
                eprintln!("Specify --target <USER_ID> or --broadcast");
                std::process::exit(1);
            }

            let data = match data {
                Some(raw) => match serde_json::from_str(&raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        eprintln!("Invalid JSON payload: {}", e);
                        std::process::exit(1);
                    }
                },
                None => None,
            };

            let controller = ConnectionController::new(
                config.controller_config("eventhub-cli"),
                Arc::new(Printer { json: true }),
            )?;

            match controller
                .send_publish(&event_type, data, target.as_deref(), broadcast)
                .await
            {
                Ok(result) if result.success => {
                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        println!(
                            "Published {} to {} of {} connected client(s)",
                            event_type,
                            result.delivered.unwrap_or(0),
                            result.active_connections.unwrap_or(0)
                        );
                    }
                }
                Ok(result) => {
                    eprintln!(
                        "Publish rejected: {}",
                        result.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot reach Eventhub at {}: {}", api_url, e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Status => {
            let client = reqwest::Client::new();
            let response = client.get(format!("{}/health", api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                        return Ok(());
                    }

                    println!("Eventhub v{}", health["version"].as_str().unwrap_or("unknown"));
                    println!();
                    println!(
                        "Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    println!(
                        "Active connections: {}",
                        health["activeConnections"].as_u64().unwrap_or(0)
                    );

                    if let Some(uptime) = health["uptimeSeconds"].as_u64() {
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to Eventhub at {}", api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the Eventhub server is running:");
                    eprintln!("  cargo run --bin eventhub");
                    std::process::exit(1);
                }
            }
        }

        Commands::Connections => {
            let client = reqwest::Client::new();
            let response = client
                .get(format!("{}/api/socket/connections", api_url))
                .send()
                .await?;

            if !response.status().is_success() {
                eprintln!("Failed to fetch connections: {}", response.status());
                std::process::exit(1);
            }

            let body: serde_json::Value = response.json().await?;
            let clients = body["clients"].as_array().cloned().unwrap_or_default();

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else if clients.is_empty() {
                println!("No clients connected.");
            } else {
                println!("{} client(s) connected:", clients.len());
                for client in clients {
                    println!("  {}", client.as_str().unwrap_or("-"));
                }
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Wrote default config to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Format seconds as a short human-readable duration
fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
