//! Dashboard-facing HTTP API and WebSocket observer endpoint
//!
//! Thin axum layer over the core:
//! - `GET /api/latest` - point-in-time snapshot of all tracked devices
//! - `POST /api/command` - relay an actuator command to a device
//! - `GET /ws` - observer push channel; each socket joins the hub and
//!   receives every reconciled update until it disconnects
//!
//! Command failures map to distinguishable status codes so the caller
//! can tell a down transport (503) from a failed publish (502).

use crate::domain::state::DeviceState;
use crate::domain::types::{Command, CommandTarget, DeviceId};
use crate::io::relay::{CommandRelay, RelayError};
use crate::services::hub::Hub;
use crate::services::reconciler::SharedDeviceTable;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub table: SharedDeviceTable,
    pub hub: Arc<Hub>,
    pub relay: Arc<CommandRelay>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/latest", get(latest_snapshot))
        .route("/api/command", post(submit_command))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown is signaled
pub async fn serve(
    bind: &str,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "http_listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn latest_snapshot(State(state): State<AppState>) -> Json<Vec<DeviceState>> {
    Json(state.table.read().snapshot())
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    device_id: String,
    target: CommandTarget,
    state: bool,
}

async fn submit_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let command = Command {
        device_id: DeviceId(request.device_id),
        target: request.target,
        desired_state: request.state,
    };

    match state.relay.send(&command).await {
        Ok(()) => Ok(Json(serde_json::json!({ "ok": true }))),
        Err(e @ RelayError::NotConnected) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e @ RelayError::PublishFailed(_)) => Err((StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

/// Forward hub updates to one observer socket.
///
/// The session leaves the hub when the client closes, the socket
/// errors, or the hub evicts it (its receiver closes). Leaving is
/// idempotent either way.
async fn handle_socket(mut socket: WebSocket, hub: Arc<Hub>) {
    let (session_id, mut rx) = hub.join();

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                let frame = match serde_json::to_string(&update) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "observer_frame_encode_failed");
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    debug!(session_id = %session_id, "observer_send_failed");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // No client->server frames are defined; ignore the rest
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    hub.leave(session_id);
}
