//! Event Envelope
//!
//! The wire unit pushed over an event stream. Every frame on the stream is one
//! JSON-serialized envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity a client supplies when opening its stream
pub type ClientId = String;

/// Event type reserved for liveness probes
pub const HEARTBEAT: &str = "heartbeat";

/// One event delivered to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Application-defined event kind (e.g. `registration.confirmed`)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload, never inspected by the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Recipient of a unicast envelope
    #[serde(
        rename = "userId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<ClientId>,
    /// Stamped by the hub when the event is published
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope stamped with the current time
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a heartbeat envelope
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT, None)
    }

    /// Address the envelope to a single recipient
    pub fn for_user(mut self, client_id: impl Into<ClientId>) -> Self {
        self.user_id = Some(client_id.into());
        self
    }

    /// Whether this envelope is a liveness probe rather than application data
    pub fn is_heartbeat(&self) -> bool {
        self.event_type == HEARTBEAT
    }
}

/// Who a published event is routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every currently connected client
    Broadcast,
    /// A single client identity
    Unicast(ClientId),
}

impl Target {
    pub fn unicast(client_id: impl Into<ClientId>) -> Self {
        Target::Unicast(client_id.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Broadcast => write!(f, "broadcast"),
            Target::Unicast(id) => write!(f, "unicast:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_uses_wire_field_names() {
        let env = Envelope::new("registration.confirmed", Some(json!({"seminarId": "42"})))
            .for_user("A");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"registration.confirmed\""));
        assert!(json.contains("\"data\":{\"seminarId\":\"42\"}"));
        assert!(json.contains("\"userId\":\"A\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_heartbeat_omits_optional_fields() {
        let env = Envelope::heartbeat();
        assert!(env.is_heartbeat());
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("data"));
        assert!(!json.contains("userId"));
    }

    #[test]
    fn test_deserialize_minimal_envelope() {
        let json = r#"{"type": "seminar.cancelled", "timestamp": "2024-05-01T10:00:00Z"}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.event_type, "seminar.cancelled");
        assert!(env.data.is_none());
        assert!(!env.is_heartbeat());
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Broadcast.to_string(), "broadcast");
        assert_eq!(Target::unicast("u1").to_string(), "unicast:u1");
    }
}
