//! Dispatcher
//!
//! Routes published events to one session or to all of them. Holds no state
//! besides the registry it routes over.

use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use super::envelope::{ClientId, Envelope, Target};
use super::registry::SessionRegistry;
use super::session::Session;

/// Stateless router over a [`SessionRegistry`]
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Publish an event and return how many sessions accepted it.
    ///
    /// A unicast to a client that is not connected is dropped and counts as
    /// zero deliveries. A failed push retires only the failing session.
    pub async fn publish(&self, event_type: &str, data: Option<Value>, target: Target) -> usize {
        let delivered = match &target {
            Target::Unicast(client_id) => self.unicast(client_id, event_type, data).await,
            Target::Broadcast => self.broadcast(event_type, data).await,
        };

        tracing::debug!(
            event_type = %event_type,
            target = %target,
            delivered,
            "Published event"
        );

        delivered
    }

    async fn unicast(&self, client_id: &ClientId, event_type: &str, data: Option<Value>) -> usize {
        let Some(session) = self.registry.lookup(client_id) else {
            tracing::debug!(
                client_id = %client_id,
                event_type = %event_type,
                "Target not connected, event dropped"
            );
            return 0;
        };

        let envelope = Envelope::new(event_type, data).for_user(client_id.clone());
        usize::from(deliver(&self.registry, &session, &envelope).await)
    }

    async fn broadcast(&self, event_type: &str, data: Option<Value>) -> usize {
        let envelope = Envelope::new(event_type, data);

        let mut recipients = Vec::with_capacity(self.registry.len());
        self.registry.for_each(|session| recipients.push(Arc::clone(session)));

        // Pushes run side by side so one stalled consumer only delays itself
        let results = join_all(
            recipients
                .iter()
                .map(|session| deliver(&self.registry, session, &envelope)),
        )
        .await;

        results.into_iter().filter(|ok| *ok).count()
    }
}

/// Push one envelope, retiring the session if the write fails
pub(crate) async fn deliver(
    registry: &SessionRegistry,
    session: &Session,
    envelope: &Envelope,
) -> bool {
    match session.push(envelope).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                client_id = %session.client_id(),
                session_id = %session.session_id(),
                event_type = %envelope.event_type,
                error = %e,
                "Push failed, dropping session"
            );
            registry.retire(session);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn connect(
        registry: &SessionRegistry,
        client_id: &str,
        capacity: usize,
    ) -> mpsc::Receiver<String> {
        let (session, rx) = Session::open(client_id, capacity, Duration::from_millis(50));
        registry.register(session);
        rx
    }

    fn decode(frame: &str) -> Envelope {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_target() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let mut rx_a = connect(&registry, "A", 8);
        let mut rx_b = connect(&registry, "B", 8);

        let delivered = dispatcher
            .publish(
                "registration.confirmed",
                Some(json!({"seminarId": "42"})),
                Target::unicast("A"),
            )
            .await;

        assert_eq!(delivered, 1);
        let env = decode(&rx_a.try_recv().unwrap());
        assert_eq!(env.event_type, "registration.confirmed");
        assert_eq!(env.data, Some(json!({"seminarId": "42"})));
        assert_eq!(env.user_id.as_deref(), Some("A"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unicast_to_absent_client_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let delivered = dispatcher
            .publish("registration.confirmed", None, Target::unicast("ghost"))
            .await;

        assert_eq!(delivered, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_unicast_unregisters_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        drop(connect(&registry, "A", 8));

        let delivered = dispatcher
            .publish("seminar.updated", None, Target::unicast("A"))
            .await;

        assert_eq!(delivered, 0);
        assert!(registry.lookup("A").is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let mut receivers: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|id| connect(&registry, id, 8))
            .collect();

        let delivered = dispatcher
            .publish(
                "seminar.cancelled",
                Some(json!({"seminarId": "7"})),
                Target::Broadcast,
            )
            .await;

        assert_eq!(delivered, 3);
        for rx in receivers.iter_mut() {
            let env = decode(&rx.try_recv().unwrap());
            assert_eq!(env.event_type, "seminar.cancelled");
            assert_eq!(env.data, Some(json!({"seminarId": "7"})));
            assert!(env.user_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failing_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let mut healthy = vec![connect(&registry, "c1", 8)];
        drop(connect(&registry, "c2", 8));
        healthy.push(connect(&registry, "c3", 8));
        healthy.push(connect(&registry, "c4", 8));

        let delivered = dispatcher
            .publish("seminar.cancelled", None, Target::Broadcast)
            .await;
        assert_eq!(delivered, 3);
        assert!(registry.lookup("c2").is_none());
        assert_eq!(registry.len(), 3);

        let delivered = dispatcher
            .publish("seminar.rescheduled", None, Target::Broadcast)
            .await;
        assert_eq!(delivered, 3);

        for rx in healthy.iter_mut() {
            assert_eq!(decode(&rx.try_recv().unwrap()).event_type, "seminar.cancelled");
            assert_eq!(decode(&rx.try_recv().unwrap()).event_type, "seminar.rescheduled");
        }
    }

    #[tokio::test]
    async fn test_stalled_consumer_is_evicted_without_blocking_others() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let _stalled = connect(&registry, "slow", 1);
        let mut fast = connect(&registry, "fast", 8);

        assert_eq!(
            dispatcher.publish("first", None, Target::Broadcast).await,
            2
        );
        // "slow" never drains, so its single-slot buffer is now full
        assert_eq!(
            dispatcher.publish("second", None, Target::Broadcast).await,
            1
        );

        assert!(registry.lookup("slow").is_none());
        assert_eq!(decode(&fast.try_recv().unwrap()).event_type, "first");
        assert_eq!(decode(&fast.try_recv().unwrap()).event_type, "second");
    }

    #[tokio::test]
    async fn test_broadcast_with_no_sessions() {
        let dispatcher = Dispatcher::new(Arc::new(SessionRegistry::new()));
        assert_eq!(
            dispatcher.publish("noop", None, Target::Broadcast).await,
            0
        );
    }
}
