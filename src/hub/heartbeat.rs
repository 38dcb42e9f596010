//! Heartbeat Scheduler
//!
//! Each session gets a timer that periodically pushes a `heartbeat` envelope.
//! Streams whose peer vanished without a TCP close only surface as a failed
//! write, so a failed heartbeat is what eventually reaps them.

use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::dispatcher::deliver;
use super::envelope::Envelope;
use super::registry::SessionRegistry;
use super::session::Session;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawns per-session heartbeat timers.
///
/// The period trades detection latency for background traffic: a shorter
/// period reaps dead peers sooner but sends more frames. Configurable through
/// `hub.heartbeat_interval_secs`.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatScheduler {
    period: Duration,
}

impl Default for HeartbeatScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

impl HeartbeatScheduler {
    /// Periods below one millisecond are raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the heartbeat timer for `session`.
    ///
    /// The task keeps only a weak reference and ends on its own once the
    /// session is closed or a heartbeat fails.
    pub fn spawn(&self, registry: Arc<SessionRegistry>, session: &Arc<Session>) -> JoinHandle<()> {
        let weak: Weak<Session> = Arc::downgrade(session);
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(session) = weak.upgrade() else {
                    break;
                };
                if session.is_closed() || !beat(&registry, &session).await {
                    break;
                }
            }
        })
    }
}

/// Push one heartbeat. Returns `false` (after retiring the session) when the
/// write fails.
pub async fn beat(registry: &SessionRegistry, session: &Session) -> bool {
    let envelope = Envelope::heartbeat();
    if deliver(registry, session, &envelope).await {
        session.touch_heartbeat(Utc::now());
        tracing::trace!(client_id = %session.client_id(), "Heartbeat sent");
        true
    } else {
        false
    }
}
