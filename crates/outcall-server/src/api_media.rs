//! Carrier media-stream WebSocket endpoint.
//!
//! The carrier connects here after the answer directive. Inbound frames
//! are forwarded straight to the recognition path; lifecycle envelopes
//! become orchestrator events. Outbound audio and clear frames are
//! drained from the session's media channel into the socket.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Path, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use outcall_adapters::{InboundMedia, MediaFrameOut};
use outcall_engine::{Session, SessionEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// GET /call/media/:sessionId (WebSocket upgrade).
pub async fn media_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(session) = state.registry.get(&session_id).await else {
        tracing::warn!(session_id, "media connection for unknown session");
        return StatusCode::NOT_FOUND.into_response();
    };
    if session.state.read().await.is_terminal() {
        tracing::warn!(session_id, "media connection for terminal session rejected");
        return StatusCode::GONE.into_response();
    }

    ws.on_upgrade(move |socket| handle_media_socket(socket, session))
}

async fn handle_media_socket(socket: WebSocket, session: Arc<Session>) {
    let session_id = session.id.clone();
    tracing::info!(session_id, "media stream connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<MediaFrameOut>();
    session.attach_media(out_tx).await;

    // Outbound: drain the session's media channel into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(MediaFrameOut::Json(json)) = out_rx.recv().await {
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound: translate carrier envelopes.
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match InboundMedia::parse(&text) {
                Some(InboundMedia::Connected) => {
                    session.enqueue(SessionEvent::MediaConnected);
                }
                Some(InboundMedia::Start { start }) => {
                    session.enqueue(SessionEvent::MediaStart {
                        stream_sid: start.stream_sid,
                    });
                }
                Some(InboundMedia::Media { media }) => {
                    if let Some(frame) = media.decode() {
                        session.forward_audio(frame);
                    }
                }
                Some(InboundMedia::Stop) => break,
                Some(InboundMedia::Other) => {}
                None => {
                    tracing::debug!(session_id, "unparseable media envelope dropped");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Socket gone: the orchestrator decides whether this is fatal.
    session.detach_media().await;
    session.enqueue(SessionEvent::MediaStop);
    send_task.abort();
    tracing::info!(session_id, "media stream closed");
}
