//! Client Connection Controller
//!
//! Keeps a client attached to the hub's event stream and reconnects after
//! failures.
//!
//! ## Architecture
//!
//! - **ConnectionController**: Reconnecting state machine plus publish calls
//! - **EventSource**: Transport seam; `HttpEventSource` speaks HTTP
//! - **SseDecoder**: Incremental `text/event-stream` parser
//!
//! ## Example
//!
//! ```rust,no_run
//! use eventhub::client::{ClientEvents, ConnectionController, ControllerConfig};
//! use eventhub::hub::Envelope;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ClientEvents for Printer {
//!     fn on_message(&self, envelope: Envelope) {
//!         println!("{}: {:?}", envelope.event_type, envelope.data);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::new("http://localhost:8082", "alice");
//!     let controller = ConnectionController::new(config, Arc::new(Printer))?;
//!     controller.connect();
//!
//!     let result = controller
//!         .send_publish("seminar.cancelled", None, None, true)
//!         .await?;
//!     println!("delivered to {:?} clients", result.delivered);
//!     Ok(())
//! }
//! ```

mod controller;
mod source;
pub mod sse;

pub use controller::{ConnectionController, ConnectionState, ControllerConfig};
pub use source::{ByteStream, EventSource, HttpEventSource};
pub use sse::SseDecoder;

use thiserror::Error;

use crate::hub::Envelope;

/// Callbacks fired by the controller.
///
/// Heartbeats never reach `on_message`.
pub trait ClientEvents: Send + Sync + 'static {
    /// An application envelope arrived
    fn on_message(&self, envelope: Envelope);

    fn on_open(&self) {}

    /// The stream was lost; a reconnect is scheduled
    fn on_disconnect(&self) {}

    fn on_error(&self, _error: &ClientError) {}

    fn on_state_change(&self, _state: ConnectionState) {}
}

/// Errors on the client side of the hub
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned HTTP {0}")]
    Http(u16),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event stream ended")]
    StreamEnded,
}
