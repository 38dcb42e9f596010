//! Real-Time Event Hub
//!
//! Holds long-lived push streams, one per connected client, and routes
//! published events to one client or to all of them.
//!
//! ## Architecture
//!
//! - **Envelope**: The wire unit written to a stream
//! - **Session**: One open stream; sole owner of its write half
//! - **SessionRegistry**: Live sessions keyed by client identity
//! - **Dispatcher**: Routes unicast and broadcast publishes
//! - **HeartbeatScheduler**: Per-session liveness timer
//!
//! ## Example
//!
//! ```rust
//! use eventhub::hub::{Dispatcher, Session, SessionRegistry, Target};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Arc::new(SessionRegistry::new());
//! let dispatcher = Dispatcher::new(Arc::clone(&registry));
//!
//! let (session, mut rx) = Session::open("alice", 64, Duration::from_secs(5));
//! registry.register(session);
//!
//! let delivered = dispatcher.publish("seminar.cancelled", None, Target::Broadcast).await;
//! assert_eq!(delivered, 1);
//! assert!(rx.recv().await.unwrap().contains("seminar.cancelled"));
//! # }
//! ```

mod dispatcher;
mod envelope;
mod heartbeat;
mod registry;
mod session;

pub use dispatcher::Dispatcher;
pub use envelope::{ClientId, Envelope, Target, HEARTBEAT};
pub use heartbeat::{beat, HeartbeatScheduler, DEFAULT_HEARTBEAT_INTERVAL};
pub use registry::SessionRegistry;
pub use session::{Frame, Session, TransportError};

use std::time::Duration;

/// Runtime settings for the hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Period between heartbeats on each session
    pub heartbeat_interval: Duration,
    /// Frames buffered per session before pushes start waiting
    pub channel_capacity: usize,
    /// Longest a push waits on a full buffer before the session is dropped
    pub push_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            channel_capacity: 64,
            push_timeout: Duration::from_secs(5),
        }
    }
}
