//! Eventhub HTTP API
//!
//! HTTP surface of the hub, built with Axum.
//!
//! # Endpoints
//!
//! ## Events
//! - `GET /api/socket?userId=<id>` - Open an event stream (`text/event-stream`)
//! - `POST /api/socket` - Publish `{type, data, targetUserId?, broadcast?}`
//! - `GET /api/socket/connections` - Connected client identities
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use eventhub::api::{serve, ApiConfig, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApiConfig::default();
//!     let state = AppState::new(config.clone());
//!     serve(state, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hub::SessionRegistry;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    let api_routes = Router::new()
        .route(
            "/socket",
            get(routes::socket::open_stream).post(routes::socket::publish),
        )
        .route("/socket/connections", get(routes::socket::list_connections))
        .layer(DefaultBodyLimit::max(max_body_size));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    serve_on(listener, state).await
}

/// Serve on an already bound listener until a shutdown signal arrives
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), ApiError> {
    let registry = Arc::clone(&state.registry);
    let router = build_router(state);

    tracing::info!("Eventhub API listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown(registry))
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Eventhub API shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal, then end every open stream so the graceful
/// shutdown can complete
async fn shutdown(registry: Arc<SessionRegistry>) {
    shutdown_signal().await;

    let closed = registry.clear();
    tracing::info!(closed_streams = closed, "Closed open event streams");
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<SessionRegistry>) {
        let state = AppState::new(ApiConfig::default());
        let registry = Arc::clone(&state.registry);
        (build_router(state), registry)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn publish_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/socket")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["activeConnections"], 0);
    }

    #[tokio::test]
    async fn test_publish_to_absent_client() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(publish_request(
                r#"{"type": "registration.confirmed", "data": {"seminarId": "42"}, "targetUserId": "A"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["delivered"], 0);
        assert_eq!(body["activeConnections"], 0);
    }

    #[tokio::test]
    async fn test_publish_invalid_json() {
        let (app, _) = create_test_app();

        let response = app.oneshot(publish_request("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_publish_missing_type() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(publish_request(r#"{"broadcast": true}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_stream_then_broadcast_and_list() {
        let (app, registry) = create_test_app();

        let stream = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/socket?userId=alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(stream.status(), StatusCode::OK);
        assert_eq!(registry.len(), 1);

        let response = app
            .clone()
            .oneshot(publish_request(
                r#"{"type": "seminar.cancelled", "data": {"seminarId": "7"}, "broadcast": true}"#,
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["delivered"], 1);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/socket/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["clients"], serde_json::json!(["alice"]));

        drop(stream);
        assert!(registry.is_empty());
    }
}
