//! Observer (transcript) WebSocket endpoint.
//!
//! Read-only subscribers keyed by session id. On connect the current
//! session snapshot goes out immediately, then every broadcast in order.
//! Observer connections are best-effort; a drop never affects the call.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Path, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use outcall_engine::Session;
use std::sync::Arc;
use tokio::sync::mpsc;

/// GET /call/transcript/:sessionId (WebSocket upgrade).
pub async fn transcript_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let allowed = &state.config.observers.allowed_origins;
    if !allowed.is_empty() {
        let origin = headers
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !allowed.iter().any(|o| o == origin) {
            tracing::warn!(session_id, origin, "observer origin rejected");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Some(session) = state.registry.get(&session_id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let state = Arc::clone(&state);
    ws.on_upgrade(move |socket| handle_observer_socket(socket, state, session))
}

async fn handle_observer_socket(socket: WebSocket, state: Arc<AppState>, session: Arc<Session>) {
    let session_id = session.id.clone();
    let (mut sender, mut receiver) = socket.split();

    // Snapshot first, so a late joiner sees the call so far.
    let snapshot = {
        let session_state = session.state.read().await;
        serde_json::to_string(&session_state.snapshot_event())
    };
    match snapshot {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        Err(e) => {
            tracing::error!(session_id, error = %e, "failed to serialize session snapshot");
            return;
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let observer_id = state.relay.add(&session_id, tx).await;
    tracing::debug!(session_id, %observer_id, "observer connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sender.send(Message::Text(event.into())).await.is_err() {
                break;
            }
        }
    });

    // Observers are read-only; we only watch for the close.
    while let Some(Ok(message)) = receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    state.relay.remove(&session_id, observer_id).await;
    send_task.abort();
    tracing::debug!(session_id, %observer_id, "observer disconnected");
}
