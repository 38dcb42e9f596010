//! Connection Registry
//!
//! Table of live sessions keyed by client identity. This is the only shared
//! mutable state in the hub. The lock guards the map structure only; it is
//! never held across a stream write.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::envelope::ClientId;
use super::session::Session;

/// Live sessions, at most one per client identity
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session under its client identity.
    ///
    /// Any session previously registered for the same identity is closed as
    /// part of the swap and returned.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let client_id = session.client_id().to_string();
        let session_id = session.session_id();

        let replaced = {
            let mut sessions = self.sessions.write();
            let replaced = sessions.insert(client_id.clone(), session);
            if let Some(prev) = &replaced {
                prev.close();
            }
            replaced
        };

        match &replaced {
            Some(prev) => tracing::info!(
                client_id = %client_id,
                session_id = %session_id,
                replaced_session = %prev.session_id(),
                "Stream replaced existing session"
            ),
            None => tracing::info!(
                client_id = %client_id,
                session_id = %session_id,
                "Stream connected"
            ),
        }

        replaced
    }

    /// Remove and close whatever session is registered for `client_id`.
    ///
    /// Returns `false` if nothing was registered.
    pub fn unregister(&self, client_id: &str) -> bool {
        let removed = self.sessions.write().remove(client_id);

        match removed {
            Some(session) => {
                session.close();
                tracing::info!(
                    client_id = %client_id,
                    session_id = %session.session_id(),
                    "Stream disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Remove `session` if it is still the registered one for its identity,
    /// and close it either way.
    ///
    /// Used by every failure path so a stale teardown can never evict the
    /// session that replaced it.
    pub fn retire(&self, session: &Session) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            let current = sessions
                .get(session.client_id())
                .is_some_and(|s| s.session_id() == session.session_id());
            if current {
                sessions.remove(session.client_id());
            }
            current
        };

        session.close();

        if removed {
            tracing::info!(
                client_id = %session.client_id(),
                session_id = %session.session_id(),
                "Stream disconnected"
            );
        }
        removed
    }

    /// Remove and close every session; returns how many were open.
    ///
    /// Ends all response bodies so a graceful shutdown is not held open by
    /// long-lived streams.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        drained.len()
    }

    pub fn lookup(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(client_id).cloned()
    }

    /// Sessions registered at this instant
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Apply `f` to a snapshot of the registered sessions without holding
    /// the lock. Sessions closed after the snapshot was taken are skipped.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Session>),
    {
        for session in self.snapshot() {
            if !session.is_closed() {
                f(&session);
            }
        }
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of active connections
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session(client_id: &str) -> (Arc<Session>, mpsc::Receiver<String>) {
        Session::open(client_id, 8, Duration::from_millis(50))
    }

    #[test]
    fn test_register_unregister() {
        let registry = SessionRegistry::new();
        let (s, _rx) = session("alice");

        assert!(registry.register(Arc::clone(&s)).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("alice").is_some());

        assert!(registry.unregister("alice"));
        assert!(registry.is_empty());
        assert!(s.is_closed());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        assert!(!registry.unregister("nobody"));

        let (s, _rx) = session("bob");
        registry.register(s);
        assert!(registry.unregister("bob"));
        assert!(!registry.unregister("bob"));
    }

    #[tokio::test]
    async fn test_reregister_closes_previous_transport() {
        let registry = SessionRegistry::new();
        let (first, mut first_rx) = session("alice");
        let (second, _second_rx) = session("alice");

        registry.register(Arc::clone(&first));
        let replaced = registry.register(Arc::clone(&second)).unwrap();

        assert_eq!(replaced.session_id(), first.session_id());
        assert!(first.is_closed());
        assert!(first_rx.recv().await.is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("alice").unwrap().session_id(),
            second.session_id()
        );
    }

    #[test]
    fn test_at_most_one_session_per_identity() {
        let registry = SessionRegistry::new();
        let ids = ["a", "b", "a", "c", "b", "a"];
        let mut receivers = Vec::new();

        for (step, id) in ids.iter().enumerate() {
            let (s, rx) = session(id);
            receivers.push(rx);
            registry.register(s);
            if step % 4 == 3 {
                registry.unregister("a");
            }

            let mut seen = registry.client_ids();
            let total = seen.len();
            seen.dedup();
            assert_eq!(seen.len(), total);
            assert_eq!(registry.len(), total);
        }

        let live: Vec<_> = registry.snapshot();
        assert!(live.iter().all(|s| !s.is_closed()));
    }

    #[test]
    fn test_clear_closes_everything() {
        let registry = SessionRegistry::new();
        let (a, _ra) = session("a");
        let (b, _rb) = session("b");
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }

    #[test]
    fn test_retire_stale_session_keeps_replacement() {
        let registry = SessionRegistry::new();
        let (old, _old_rx) = session("alice");
        let (new, _new_rx) = session("alice");

        registry.register(Arc::clone(&old));
        registry.register(Arc::clone(&new));

        assert!(!registry.retire(&old));
        assert_eq!(
            registry.lookup("alice").unwrap().session_id(),
            new.session_id()
        );

        assert!(registry.retire(&new));
        assert!(registry.is_empty());
        assert!(new.is_closed());
    }

    #[test]
    fn test_for_each_skips_sessions_closed_after_snapshot() {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (s, rx) = session(id);
            receivers.push(rx);
            registry.register(s);
        }

        let mut visited = Vec::new();
        registry.for_each(|s| {
            // Mutating the registry mid-sweep must not deadlock
            if s.client_id() == "a" || s.client_id() == "b" {
                let other = if s.client_id() == "a" { "b" } else { "a" };
                registry.unregister(other);
            }
            visited.push(s.client_id().to_string());
        });

        assert_eq!(visited.len(), 2);
        assert!(visited.contains(&"c".to_string()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_register_and_unregister() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("client-{}", (t + i) % 5);
                        let (s, _rx) = session(&id);
                        registry.register(s);
                        if i % 3 == 0 {
                            registry.unregister(&id);
                        }
                        let _ = registry.snapshot();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(registry.len() <= 5);
        let ids = registry.client_ids();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
    }
}
