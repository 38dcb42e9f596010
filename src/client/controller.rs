//! Connection controller
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Open --error/close--> Disconnected
//!      ^                                                                      |
//!      +-------------------------- retry_delay -------------------------------+
//! ```
//!
//! A single `retry_pending` flag is the authority on whether a reconnect is
//! queued, so overlapping failures schedule one retry, not several.
//!
//! Background tasks only hold a weak reference to the controller. Dropping
//! the last handle aborts the stream and any queued retry.

use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::source::{ByteStream, EventSource, HttpEventSource};
use super::sse::SseDecoder;
use super::{ClientError, ClientEvents};
use crate::api::dto::{PublishRequest, PublishResponse};
use crate::hub::{ClientId, Envelope};

/// Where the controller is in its connect loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Settings for one controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Hub base URL (e.g., "http://localhost:8082")
    pub server_url: String,
    /// Identity the stream is opened under
    pub client_id: ClientId,
    /// Fixed wait between a failure and the next attempt
    pub retry_delay: Duration,
    /// Timeout for publish requests and stream connects
    pub request_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(server_url: impl Into<String>, client_id: impl Into<ClientId>) -> Self {
        Self {
            server_url: server_url.into(),
            client_id: client_id.into(),
            retry_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

struct ControllerInner {
    state: ConnectionState,
    /// Bumped by every connect/disconnect; failures from older streams are ignored
    generation: u64,
    retry_pending: bool,
    stream_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
}

/// Keeps one client attached to the hub
pub struct ConnectionController {
    config: ControllerConfig,
    source: Arc<dyn EventSource>,
    events: Arc<dyn ClientEvents>,
    http: Client,
    inner: Mutex<ControllerInner>,
    retries_scheduled: AtomicU64,
    /// `activeConnections` from the last successful publish
    connection_count: AtomicUsize,
}

impl ConnectionController {
    /// Create a controller that streams over HTTP
    pub fn new(
        config: ControllerConfig,
        events: Arc<dyn ClientEvents>,
    ) -> Result<Arc<Self>, ClientError> {
        let source = HttpEventSource::new(config.server_url.clone(), config.request_timeout)?;
        Self::with_source(config, Arc::new(source), events)
    }

    /// Create a controller with a custom stream source
    pub fn with_source(
        config: ControllerConfig,
        source: Arc<dyn EventSource>,
        events: Arc<dyn ClientEvents>,
    ) -> Result<Arc<Self>, ClientError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Arc::new(Self {
            config,
            source,
            events,
            http,
            inner: Mutex::new(ControllerInner {
                state: ConnectionState::Disconnected,
                generation: 0,
                retry_pending: false,
                stream_task: None,
                retry_task: None,
            }),
            retries_scheduled: AtomicU64::new(0),
            connection_count: AtomicUsize::new(0),
        }))
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Whether a reconnect is queued
    pub fn retry_pending(&self) -> bool {
        self.inner.lock().retry_pending
    }

    /// Total reconnects scheduled over the controller's lifetime
    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    /// Hub-wide connection count reported by the last successful publish.
    ///
    /// Zero until a publish has succeeded.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Open a fresh stream, tearing down the previous one and any queued retry
    pub fn connect(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if let Some(task) = inner.stream_task.take() {
                task.abort();
            }
            if let Some(task) = inner.retry_task.take() {
                task.abort();
            }
            inner.retry_pending = false;
            inner.state = ConnectionState::Connecting;

            inner.stream_task = Some(tokio::spawn(run_stream(
                Arc::downgrade(self),
                Arc::clone(&self.source),
                Arc::clone(&self.events),
                self.config.client_id.clone(),
                inner.generation,
            )));
        }

        tracing::debug!(client_id = %self.config.client_id, "Connecting to event stream");
        self.events.on_state_change(ConnectionState::Connecting);
    }

    /// Close the stream without reconnecting
    pub fn disconnect(&self) {
        {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if let Some(task) = inner.stream_task.take() {
                task.abort();
            }
            if let Some(task) = inner.retry_task.take() {
                task.abort();
            }
            inner.retry_pending = false;
            inner.state = ConnectionState::Disconnected;
        }

        tracing::info!(client_id = %self.config.client_id, "Disconnected from event stream");
        self.events.on_state_change(ConnectionState::Disconnected);
    }

    /// Publish an event through the hub's publish endpoint.
    ///
    /// Independent of the stream; works while a reconnect is pending.
    pub async fn send_publish(
        &self,
        event_type: &str,
        data: Option<Value>,
        target_user_id: Option<&str>,
        broadcast: bool,
    ) -> Result<PublishResponse, ClientError> {
        let url = format!("{}/api/socket", self.config.server_url.trim_end_matches('/'));
        let body = PublishRequest {
            event_type: Some(event_type.to_string()),
            data,
            target_user_id: target_user_id.map(str::to_string),
            broadcast: Some(broadcast),
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let result = match serde_json::from_slice::<PublishResponse>(&bytes) {
            Ok(result) => result,
            Err(_) if !status.is_success() => return Err(ClientError::Http(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        if result.success {
            if let Some(active) = result.active_connections {
                self.connection_count.store(active, Ordering::Relaxed);
            }
        }
        Ok(result)
    }

    fn mark_open(&self, generation: u64) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.state = ConnectionState::Open;
        }

        tracing::info!(client_id = %self.config.client_id, "Event stream open");
        self.events.on_state_change(ConnectionState::Open);
        self.events.on_open();
        true
    }

    /// Handle a stream failure for `generation`.
    ///
    /// Returns `true` if this call scheduled the retry.
    pub(crate) fn fail(self: &Arc<Self>, generation: u64, error: ClientError) -> bool {
        let (was_live, scheduled) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }

            let was_live = inner.state != ConnectionState::Disconnected;
            inner.state = ConnectionState::Disconnected;

            let scheduled = !inner.retry_pending;
            if scheduled {
                inner.retry_pending = true;
                let weak = Arc::downgrade(self);
                let delay = self.config.retry_delay;
                inner.retry_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(this) = weak.upgrade() {
                        this.fire_retry();
                    }
                }));
            }
            (was_live, scheduled)
        };

        tracing::warn!(
            client_id = %self.config.client_id,
            error = %error,
            retry_in_ms = self.config.retry_delay.as_millis() as u64,
            "Event stream lost"
        );
        self.events.on_error(&error);

        if was_live {
            self.events.on_state_change(ConnectionState::Disconnected);
            self.events.on_disconnect();
        }
        if scheduled {
            self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        }
        scheduled
    }

    fn fire_retry(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if !inner.retry_pending {
                return;
            }
            inner.retry_pending = false;
            // This is the running retry task; drop the handle instead of aborting it
            inner.retry_task = None;
        }

        tracing::info!(client_id = %self.config.client_id, "Reconnecting to event stream");
        self.connect();
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(task) = inner.stream_task.take() {
            task.abort();
        }
        if let Some(task) = inner.retry_task.take() {
            task.abort();
        }
    }
}

/// Body of the stream task. Holds the controller weakly so an abandoned
/// controller can be freed while a stream is open.
async fn run_stream(
    controller: Weak<ConnectionController>,
    source: Arc<dyn EventSource>,
    events: Arc<dyn ClientEvents>,
    client_id: ClientId,
    generation: u64,
) {
    let error = match source.open(&client_id).await {
        Ok(stream) => {
            let Some(this) = controller.upgrade() else {
                return;
            };
            if !this.mark_open(generation) {
                return;
            }
            drop(this);
            pump(&client_id, events.as_ref(), stream).await
        }
        Err(e) => e,
    };

    if let Some(this) = controller.upgrade() {
        this.fail(generation, error);
    }
}

/// Read the stream until it fails; returns the reason it stopped
async fn pump(client_id: &str, events: &dyn ClientEvents, mut stream: ByteStream) -> ClientError {
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return e,
        };

        for data in decoder.feed(&chunk) {
            match serde_json::from_str::<Envelope>(&data) {
                Ok(envelope) if envelope.is_heartbeat() => {
                    tracing::trace!(client_id = %client_id, "Heartbeat received");
                }
                Ok(envelope) => events.on_message(envelope),
                Err(e) => {
                    tracing::warn!(client_id = %client_id, error = %e, "Failed to parse event");
                }
            }
        }
    }

    ClientError::StreamEnded
}
