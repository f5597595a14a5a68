//! REST/WebSocket API gateway for Pentarch.
//!
//! This crate provides external client access to the Pentarch pipeline
//! via HTTP REST endpoints and a WebSocket event stream.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/v1/runs` - Start a pipeline run
//! - `WS /api/v1/ws` - WebSocket streaming every pipeline event as JSON
//!
//! # Architecture
//!
//! ```text
//! Client
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   API Gateway   │ ◄── This crate
//! │     (Axum)      │
//! └────────┬────────┘
//!          │
//!          ├────────────────────────┐
//!          ▼                        ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   Supervisor    │ ──► │ broadcast chan  │ ──► WS clients
//! │ (pipeline runs) │     │ (PipelineEvent) │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! Runs started over HTTP execute in background tasks; every lifecycle
//! event the agents emit is fanned out to all connected WebSocket
//! clients through the broadcast channel.

pub mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(routes::health))
        // API v1
        .route("/api/v1/runs", post(routes::start_run))
        .route("/api/v1/ws", get(routes::websocket_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting Pentarch API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
