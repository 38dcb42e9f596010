//! Data Transfer Objects
//!
//! Request and response bodies for the HTTP API. The client controller
//! reuses the publish types so both sides agree on the wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::hub::{Target, HEARTBEAT};

// ============================================================================
// Stream DTOs
// ============================================================================

/// Query string of `GET /api/socket`
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Identity to register the stream under
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

// ============================================================================
// Publish DTOs
// ============================================================================

/// Body of `POST /api/socket`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Event type; required and must not be the reserved heartbeat type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Opaque payload forwarded to recipients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Single recipient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    /// Deliver to every connected client; wins over `targetUserId`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
}

impl PublishRequest {
    /// Validate the request and split it into publish arguments
    pub fn into_publish(self) -> Result<(String, Option<Value>, Target), ApiError> {
        let event_type = match self.event_type {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return Err(ApiError::MalformedRequest(
                    "Field 'type' is required".to_string(),
                ))
            }
        };

        if event_type == HEARTBEAT {
            return Err(ApiError::MalformedRequest(format!(
                "Event type '{}' is reserved",
                HEARTBEAT
            )));
        }

        let target = if self.broadcast.unwrap_or(false) {
            Target::Broadcast
        } else {
            match self.target_user_id {
                Some(id) if !id.trim().is_empty() => Target::Unicast(id),
                _ => {
                    return Err(ApiError::MalformedRequest(
                        "Either 'targetUserId' or 'broadcast: true' is required".to_string(),
                    ))
                }
            }
        };

        Ok((event_type, self.data, target))
    }
}

/// Result of a publish call.
///
/// Successful calls carry `delivered` and `activeConnections`; failed ones
/// carry `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishResponse {
    pub fn delivered(delivered: usize, active_connections: usize) -> Self {
        Self {
            success: true,
            delivered: Some(delivered),
            active_connections: Some(active_connections),
            error: None,
        }
    }
}

/// Response for `GET /api/socket/connections`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    pub active_connections: usize,
    pub clients: Vec<String>,
}

// ============================================================================
// Health DTOs
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_connections: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
