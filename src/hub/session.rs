//! Connection Session
//!
//! One open event stream to one client. The session is the only owner of the
//! write half of the stream; the read half is the HTTP response body.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use uuid::Uuid;

use super::envelope::{ClientId, Envelope};

/// A serialized envelope, ready to be framed onto the stream
pub type Frame = String;

/// Server-side state of one live push stream
pub struct Session {
    client_id: ClientId,
    session_id: Uuid,
    /// Write capability; `None` once released
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
    closed: AtomicBool,
    push_timeout: Duration,
    opened_at: DateTime<Utc>,
    last_heartbeat_at: Mutex<Option<DateTime<Utc>>>,
}

impl Session {
    /// Open a session with a bounded outbound buffer.
    ///
    /// Returns the session together with the receiving half, which the caller
    /// turns into the response body.
    pub fn open(
        client_id: impl Into<ClientId>,
        capacity: usize,
        push_timeout: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            client_id: client_id.into(),
            session_id: Uuid::new_v4(),
            sender: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            push_timeout,
            opened_at: Utc::now(),
            last_heartbeat_at: Mutex::new(None),
        };
        (Arc::new(session), rx)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        *self.last_heartbeat_at.lock()
    }

    pub(crate) fn touch_heartbeat(&self, at: DateTime<Utc>) {
        *self.last_heartbeat_at.lock() = Some(at);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Serialize an envelope and write it to the stream.
    ///
    /// Waits at most the push timeout for buffer space, so a stalled
    /// consumer fails its own push instead of pinning the caller. Never
    /// unregisters the session; that is the caller's job.
    pub async fn push(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let frame = serde_json::to_string(envelope)?;
        let sender = self.sender.lock().clone().ok_or(TransportError::Closed)?;

        match sender.send_timeout(frame, self.push_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(TransportError::Timeout(self.push_timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Release the write capability.
    ///
    /// Returns `true` only for the call that actually released it; every
    /// later call is a no-op.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        drop(self.sender.lock().take());

        tracing::debug!(
            client_id = %self.client_id,
            session_id = %self.session_id,
            "Session transport released"
        );
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// Failure writing to a session's stream
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Stream is closed")]
    Closed,

    #[error("Consumer did not drain its buffer within {0:?}")]
    Timeout(Duration),

    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(capacity: usize) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        Session::open("user-1", capacity, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_push_writes_serialized_frame() {
        let (session, mut rx) = open(8);

        session
            .push(&Envelope::new("seminar.updated", None))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        let decoded: Envelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded.event_type, "seminar.updated");
    }

    #[tokio::test]
    async fn test_frames_arrive_in_push_order() {
        let (session, mut rx) = open(8);

        for i in 0..5 {
            session
                .push(&Envelope::new(format!("event.{}", i), None))
                .await
                .unwrap();
        }

        for i in 0..5 {
            let frame = rx.recv().await.unwrap();
            assert!(frame.contains(&format!("event.{}", i)));
        }
    }

    #[tokio::test]
    async fn test_close_releases_exactly_once() {
        let (session, mut rx) = open(8);

        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());

        // Sender dropped, so the body stream ends
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (session, _rx) = open(8);
        session.close();

        let result = session.push(&Envelope::heartbeat()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_push_to_dropped_receiver_fails() {
        let (session, rx) = open(8);
        drop(rx);

        let result = session.push(&Envelope::heartbeat()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_stalled_consumer_times_out() {
        let (session, _rx) = open(1);

        session.push(&Envelope::heartbeat()).await.unwrap();
        let result = session.push(&Envelope::heartbeat()).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[test]
    fn test_sequential_sessions_get_distinct_ids() {
        let (a, _ra) = open(1);
        let (b, _rb) = open(1);
        assert_eq!(a.client_id(), b.client_id());
        assert_ne!(a.session_id(), b.session_id());
        assert!(a.last_heartbeat_at().is_none());
    }
}
