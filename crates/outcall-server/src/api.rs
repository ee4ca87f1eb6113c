//! Control-plane HTTP handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Form, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use outcall_adapters::{answer_directive, error_directive, WARMUP_PHRASES};
use outcall_engine::{Orchestrator, SessionEvent};
use outcall_types::{CallStatus, LiveStatus, ObserverEvent, OperatorProfile};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Error envelope shared by every failing control-plane response,
/// including the auth middleware's 401s.
pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// POST /call/initiate
///
/// Validates the payload, allocates a session, places the outbound call,
/// and returns the session and call handle ids.
pub async fn initiate_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<OperatorProfile>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(field) = payload.missing_required() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("missing required field: {field}"),
        ));
    }

    let session_id = Uuid::new_v4().to_string();
    let phone = payload.phone.clone();
    let session = Orchestrator::spawn(session_id.clone(), payload, state.deps.clone());
    state.registry.insert(Arc::clone(&session)).await;

    match state.deps.control.place_call(&phone, &session_id).await {
        Ok(call_sid) => {
            session.enqueue(SessionEvent::Placed {
                call_sid: call_sid.clone(),
            });
            tracing::info!(session_id, call_sid, "call initiated");
            Ok(Json(json!({
                "sessionId": session_id,
                "callSid": call_sid,
                "status": "initiating",
            })))
        }
        Err(e) => {
            tracing::error!(session_id, error = %e, "call placement failed");
            state.registry.remove(&session_id).await;
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("call placement failed: {e}"),
            ))
        }
    }
}

/// POST /call/webhook/:sessionId
///
/// The carrier's answer webhook. Returns the control directive that opens
/// the bidirectional media stream back at this process.
pub async fn answer_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let xml = match state.registry.get(&session_id).await {
        Some(_session) => {
            state
                .relay
                .broadcast(
                    &session_id,
                    &ObserverEvent::Status {
                        value: LiveStatus::Connected,
                    },
                )
                .await;
            answer_directive(&state.config.server.public_host, &session_id)
        }
        None => {
            tracing::warn!(session_id, "answer webhook for unknown session");
            error_directive("Sorry, something went wrong with this call. Goodbye.")
        }
    };
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
}

/// POST /call/status/:sessionId — carrier status callback.
pub async fn status_callback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Form(form): Form<StatusCallbackForm>,
) -> StatusCode {
    let Some(session) = state.registry.get(&session_id).await else {
        tracing::warn!(session_id, "status callback for unknown session");
        return StatusCode::NOT_FOUND;
    };

    let Some(status) = CallStatus::from_carrier(&form.call_status) else {
        tracing::warn!(session_id, raw = form.call_status, "unrecognized carrier status");
        return StatusCode::OK;
    };
    let duration = form.call_duration.as_deref().and_then(|d| d.parse().ok());

    tracing::info!(session_id, status = status.as_str(), ?duration, "carrier status update");
    session.enqueue(SessionEvent::StatusUpdate { status, duration });
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct AmdCallbackForm {
    #[serde(rename = "AnsweredBy")]
    pub answered_by: String,
    #[serde(rename = "MachineDetectionDuration")]
    pub machine_detection_duration: Option<String>,
}

/// POST /call/amd/:sessionId — answering-machine-detection callback.
pub async fn amd_callback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Form(form): Form<AmdCallbackForm>,
) -> StatusCode {
    let Some(session) = state.registry.get(&session_id).await else {
        tracing::warn!(session_id, "amd callback for unknown session");
        return StatusCode::NOT_FOUND;
    };

    tracing::info!(
        session_id,
        answered_by = form.answered_by,
        detection_ms = form.machine_detection_duration.as_deref().unwrap_or("-"),
        "amd result"
    );
    session.enqueue(SessionEvent::AmdResult {
        answered_by: form.answered_by,
    });
    StatusCode::OK
}

/// GET /call/session/:sessionId — session introspection.
pub async fn session_snapshot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(session) = state.registry.get(&session_id).await else {
        return Err(error_response(StatusCode::NOT_FOUND, "unknown session"));
    };

    let snapshot = session.state.read().await;
    Ok(Json(json!({
        "sessionId": session.id,
        "status": snapshot.status.as_str(),
        "transcript": snapshot.transcript,
        "messageCount": snapshot.history.len(),
        "analytics": snapshot.analytics(),
        "sentiment": {
            "score": snapshot.sentiment_score,
            "label": snapshot.sentiment_label(),
        },
    })))
}

/// GET /health — liveness and uptime.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "activeCalls": state.registry.active_count().await,
    }))
}

/// GET / — service banner.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "outcall",
        "status": "ok",
    }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    #[serde(default)]
    pub index: usize,
}

/// GET /voice/preview?index=N — an MP3 sample of the configured voice.
pub async fn voice_preview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> Response {
    let Some(tts) = &state.preview_tts else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "voice preview unavailable")
            .into_response();
    };

    let phrase = WARMUP_PHRASES[params.index % WARMUP_PHRASES.len()];
    match tts.fetch_mp3(phrase).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "voice preview synthesis failed");
            error_response(StatusCode::BAD_GATEWAY, "voice preview failed").into_response()
        }
    }
}
