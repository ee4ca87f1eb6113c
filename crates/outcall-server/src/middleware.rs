//! Authentication and rate-limiting middleware for the control plane.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

/// Compares two byte strings in time independent of their contents.
///
/// Length is allowed to leak; the secret bytes are not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Middleware authenticating state-changing requests via
/// `Authorization: Bearer <shared-secret>`.
///
/// Failures carry the same `{error}` JSON envelope as the handlers'
/// 400/500 responses.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Response {
    let Some(state) = req.extensions().get::<Arc<AppState>>().cloned() else {
        return crate::api::error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server state unavailable",
        )
        .into_response();
    };

    let unauthorized =
        || crate::api::error_response(StatusCode::UNAUTHORIZED, "unauthorized").into_response();

    let secret = state.config.auth.shared_secret.as_bytes();
    if secret.is_empty() {
        tracing::error!("shared secret is not configured; refusing state-changing request");
        return unauthorized();
    }

    let Some(presented) = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return unauthorized();
    };

    if !constant_time_eq(presented.as_bytes(), secret) {
        return unauthorized();
    }

    next.run(req).await
}

/// Per-key sliding window state.
///
/// Stores the previous window count, the current window count, and the
/// start instant of the current window. The effective rate at any point
/// is `prev_count * (1 - elapsed_ratio) + current_count`, which prevents
/// the 2x burst a fixed window allows at its boundary.
#[derive(Debug, Clone)]
struct SlidingWindowEntry {
    prev_count: u32,
    curr_count: u32,
    window_start: Instant,
}

/// Rate limit window duration.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// In-memory sliding-window rate limiter, keyed by client IP.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, SlidingWindowEntry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether a request from `key` is allowed under `limit`
    /// requests per window.
    pub fn check(&self, key: IpAddr, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Recover with stale counters rather than refusing all
                // placements.
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Evict entries whose previous and current windows have both
        // expired, bounding memory.
        if state.len() > 10_000 {
            let two_windows = RATE_LIMIT_WINDOW * 2;
            state.retain(|_, entry| now.duration_since(entry.window_start) <= two_windows);
        }

        let entry = state.entry(key).or_insert(SlidingWindowEntry {
            prev_count: 0,
            curr_count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) > RATE_LIMIT_WINDOW {
            entry.prev_count = entry.curr_count;
            entry.curr_count = 0;
            entry.window_start = now;
        }

        let elapsed_secs = now.duration_since(entry.window_start).as_secs_f64();
        let window_secs = RATE_LIMIT_WINDOW.as_secs_f64();
        let overlap_ratio = 1.0 - (elapsed_secs / window_secs).min(1.0);
        let estimated = (f64::from(entry.prev_count) * overlap_ratio) + f64::from(entry.curr_count);

        if estimated >= f64::from(limit) {
            false
        } else {
            entry.curr_count += 1;
            true
        }
    }
}

/// Rate-limiting middleware for call initiation.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    // Fall back to a fixed key when connect info is absent (router-level
    // tests); all such requests then share one window.
    let key = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

    if !state.rate_limiter.check(key, state.config.auth.initiate_limit) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from_static("60"),
        );
        return Ok(response);
    }

    Ok(next.run(req).await)
}
