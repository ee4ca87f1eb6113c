//! Outcall server library logic.

pub mod api;
pub mod api_media;
pub mod api_observe;
pub mod background;
pub mod config;
pub mod middleware;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use middleware::RateLimiter;
use outcall_adapters::TtsClient;
use outcall_engine::{EngineDeps, ObserverRelay, SessionRegistry};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Active call sessions.
    pub registry: Arc<SessionRegistry>,
    /// Observer relay.
    pub relay: Arc<ObserverRelay>,
    /// Adapter handles passed to every orchestrator.
    pub deps: EngineDeps,
    /// Rate limiter for call initiation.
    pub rate_limiter: RateLimiter,
    /// Concrete synthesis client for the voice-preview endpoint, when
    /// one is configured.
    pub preview_tts: Option<Arc<TtsClient>>,
    /// Process start time, for uptime reporting.
    pub started_at: Instant,
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // The last layer is outermost: auth runs before the rate limiter.
    let protected_routes = Router::new()
        .route("/call/initiate", post(api::initiate_call_handler))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/", get(api::root_handler))
        .route("/voice/preview", get(api::voice_preview_handler))
        .route("/call/webhook/{sessionId}", post(api::answer_webhook_handler))
        .route("/call/status/{sessionId}", post(api::status_callback_handler))
        .route("/call/amd/{sessionId}", post(api::amd_callback_handler))
        .route(
            "/call/session/{sessionId}",
            get(api::session_snapshot_handler),
        )
        .route("/call/media/{sessionId}", get(api_media::media_ws_handler))
        .route(
            "/call/transcript/{sessionId}",
            get(api_observe::transcript_ws_handler),
        )
        .merge(protected_routes)
        .layer(Extension(Arc::new(state)))
}
