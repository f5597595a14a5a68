//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pentarch_common::{PipelineEvent, RunRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub event_subscribers: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        event_subscribers: state.events.receiver_count(),
    })
}

/// Run request body.
#[derive(Debug, Deserialize)]
pub struct RunRequestBody {
    pub user_request: String,
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Run accepted response body.
#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: String,
    pub thread_id: String,
}

/// API error response. Every error surfaced by these routes is a
/// request validation failure, so the body maps to 400.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Start a pipeline run.
///
/// The run executes in a background task; the response returns the
/// identifiers a client needs to follow it on the event stream.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequestBody>,
) -> Result<(StatusCode, Json<RunAccepted>), ErrorResponse> {
    if request.user_request.trim().is_empty() {
        return Err(ErrorResponse {
            error: "user_request must not be empty".into(),
            code: "INVALID_REQUEST",
        });
    }
    if request.user_id.trim().is_empty() {
        return Err(ErrorResponse {
            error: "user_id must not be empty".into(),
            code: "INVALID_REQUEST",
        });
    }

    let thread_id = request
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("thread_{}", Uuid::new_v4()));

    let run = RunRequest::new(&request.user_request, &request.user_id, &thread_id);
    let run_id = run.run_id.clone();

    info!(
        run_id = %run_id,
        thread_id = %thread_id,
        request_preview = %request.user_request.chars().take(50).collect::<String>(),
        "Accepted pipeline run"
    );

    let supervisor = state.supervisor.clone();
    tokio::spawn(async move {
        match supervisor.run(run).await {
            Ok(outcome) => {
                if outcome.success {
                    info!(run_id = %outcome.run_id(), "Pipeline run completed");
                } else if let Some(halt) = &outcome.halted {
                    warn!(
                        run_id = %outcome.run_id(),
                        stage = %halt.stage,
                        reason = %halt.reason,
                        "Pipeline run halted"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, "Pipeline run failed");
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(RunAccepted { run_id, thread_id })))
}

/// WebSocket handler streaming pipeline events in real time.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

/// Forward every broadcast event to the client as a JSON text frame.
///
/// A client that falls behind the channel capacity is disconnected
/// rather than silently skipped ahead.
async fn stream_events(mut socket: WebSocket, mut rx: broadcast::Receiver<PipelineEvent>) {
    info!("WebSocket client connected");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize pipeline event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagged behind the event stream, disconnecting");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket connection closed");
                    break;
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            },
        }
    }
}
