//! Background tasks for the outcall server.
//!
//! Includes:
//! - The supervisor heartbeat (pid, uptime, session count, memory).

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Emits a heartbeat log line every five minutes. Runs indefinitely.
pub async fn start_heartbeat_task(state: Arc<AppState>) {
    {
        tracing::info!(
            interval_secs = HEARTBEAT_INTERVAL.as_secs(),
            "starting heartbeat task"
        );
    }
    loop {
        sleep(HEARTBEAT_INTERVAL).await;
        let active_calls = state.registry.active_count().await;
        {
            tracing::info!(
                pid = std::process::id(),
                uptime_secs = state.started_at.elapsed().as_secs(),
                active_calls = active_calls,
                rss_kb = resident_memory_kb().unwrap_or(0),
                "heartbeat"
            );
        }
    }
}

/// Resident set size in kilobytes, best-effort (Linux only).
fn resident_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_memory_is_readable_on_linux() {
        if cfg!(target_os = "linux") {
            assert!(resident_memory_kb().unwrap_or(0) > 0);
        }
    }
}
