//! Outcall server binary — the voice-agent call engine entry point.
//!
//! Starts the axum control plane with structured logging, wires the
//! vendor adapters into the engine, and shuts down gracefully on
//! SIGTERM/SIGINT, draining in-flight calls up to a short deadline.

use outcall_adapters::{AsrClient, LlmClient, TelephonyClient, TtsClient};
use outcall_audio::{ResponseCache, Transcoder};
use outcall_engine::{EngineDeps, ObserverRelay, SessionEvent, SessionRegistry};
use outcall_server::{app, background, config, AppState};
use outcall_types::CallEndReason;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Deadline for draining in-flight calls at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("OUTCALL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("outcall.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    if config.telephony.account_sid.is_empty() || config.auth.shared_secret.is_empty() {
        tracing::warn!(
            "telephony credentials or shared secret missing; calls cannot be placed until configured"
        );
    }

    // Wire the vendor adapters into the engine.
    let relay = Arc::new(ObserverRelay::new());
    let registry = Arc::new(SessionRegistry::new());
    let cache = Arc::new(ResponseCache::default());
    let tts = Arc::new(TtsClient::new(
        config.tts.api_key.clone(),
        config.tts.voice_id.clone(),
        Arc::clone(&cache),
        Transcoder::default(),
    ));
    if !config.tts.api_key.is_empty() {
        Arc::clone(&tts).warm_in_background();
    }

    let deps = EngineDeps {
        llm: Arc::new(LlmClient::with_model(
            config.llm.api_key.clone(),
            config.llm.model.clone(),
        )),
        tts: Arc::clone(&tts) as Arc<dyn outcall_adapters::SpeechSynthesizer>,
        control: Arc::new(TelephonyClient::new(outcall_adapters::TelephonyConfig {
            account_sid: config.telephony.account_sid.clone(),
            auth_token: config.telephony.auth_token.clone(),
            from_number: config.telephony.from_number.clone(),
            public_host: config.server.public_host.clone(),
        })),
        recognizer: Arc::new(AsrClient::new(config.asr.api_key.clone())),
        relay: Arc::clone(&relay),
    };

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = AppState {
        config: Arc::new(config),
        registry: Arc::clone(&registry),
        relay: Arc::clone(&relay),
        deps,
        rate_limiter: outcall_server::middleware::RateLimiter::new(),
        preview_tts: Some(tts),
        started_at: Instant::now(),
    };

    let shared_state = Arc::new(state.clone());
    tokio::spawn(outcall_engine::start_purge_task(
        Arc::clone(&registry),
        Arc::clone(&relay),
    ));
    tokio::spawn(background::start_heartbeat_task(shared_state));

    let app = app(state);

    tracing::info!(%addr, "starting outcall server");
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    // Drain: tell every live session to wrap up, then give the
    // orchestrators a short deadline to broadcast their call-ended events.
    let active = registry.active_count().await;
    if active > 0 {
        tracing::info!(active, "draining in-flight calls");
        for session_id in registry.session_ids().await {
            if let Some(session) = registry.get(&session_id).await {
                session.enqueue(SessionEvent::EndCall {
                    reason: CallEndReason::Shutdown,
                });
            }
        }
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
    }

    tracing::info!("outcall server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
