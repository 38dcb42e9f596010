//! Socket Routes
//!
//! The event stream and the publish entry point.
//!
//! - GET /api/socket?userId=... - Open an event stream
//! - POST /api/socket - Publish an event
//! - GET /api/socket/connections - List connected clients

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::header::{HeaderName, CACHE_CONTROL},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    Json,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::{Arc, Weak};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::api::dto::{ConnectionsResponse, PublishRequest, PublishResponse, StreamQuery};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::hub::{Session, SessionRegistry};

/// GET /api/socket
///
/// Registers a session for the caller and streams its envelopes as
/// `data: <json>` events until either side goes away.
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let client_id = query
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("anonymous-{}", Uuid::new_v4()));

    let (session, rx) = Session::open(
        client_id,
        state.hub_config.channel_capacity,
        state.hub_config.push_timeout,
    );

    state.registry.register(Arc::clone(&session));
    state.heartbeat.spawn(Arc::clone(&state.registry), &session);

    let guard = StreamGuard {
        registry: Arc::clone(&state.registry),
        session: Arc::downgrade(&session),
    };

    let stream = ReceiverStream::new(rx).map(move |frame| {
        let _ = &guard;
        Ok::<_, Infallible>(Event::default().data(frame))
    });

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    )
}

/// POST /api/socket
///
/// Publish to one client (`targetUserId`) or to everyone (`broadcast: true`).
pub async fn publish(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<Json<PublishResponse>> {
    let Json(request) = payload?;
    let (event_type, data, target) = request.into_publish()?;

    let delivered = state.dispatcher.publish(&event_type, data, target).await;

    Ok(Json(PublishResponse::delivered(
        delivered,
        state.active_connections(),
    )))
}

/// GET /api/socket/connections
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    let clients = state.registry.client_ids();
    Json(ConnectionsResponse {
        active_connections: clients.len(),
        clients,
    })
}

/// Tears the session down when the response body is dropped, which is how a
/// client abort reaches the hub.
struct StreamGuard {
    registry: Arc<SessionRegistry>,
    session: Weak<Session>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            self.registry.retire(&session);
        }
    }
}
