//! Registry of active call sessions.
//!
//! A session stays addressable for the lifetime of its call plus a
//! five-minute grace after the first terminal transition, so debrief
//! reads keep working; after the grace it is purged by the sweep task.

use crate::relay::ObserverRelay;
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;

/// Retention after the first terminal status.
pub const TERMINAL_GRACE: Duration = Duration::from_secs(300);

/// Sweep cadence for the purge task.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Removes sessions whose terminal grace has elapsed. Returns the
    /// purged session ids.
    pub async fn purge_expired(&self, grace: Duration) -> Vec<String> {
        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            let mut expired = Vec::new();
            for (id, session) in sessions.iter() {
                let state = session.state.read().await;
                if let Some(terminal_at) = state.terminal_at {
                    if terminal_at.elapsed() >= grace {
                        expired.push(id.clone());
                    }
                }
            }
            expired
        };

        if !expired.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &expired {
                sessions.remove(id);
            }
        }
        expired
    }
}

/// Starts the background purge task. Runs indefinitely.
pub async fn start_purge_task(registry: Arc<SessionRegistry>, relay: Arc<ObserverRelay>) {
    tracing::info!(
        grace_secs = TERMINAL_GRACE.as_secs(),
        "starting session purge task"
    );
    loop {
        sleep(SWEEP_INTERVAL).await;
        let purged = registry.purge_expired(TERMINAL_GRACE).await;
        for session_id in &purged {
            relay.remove_session(session_id).await;
        }
        if !purged.is_empty() {
            tracing::info!(count = purged.len(), "purged completed sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SessionEvent;
    use outcall_types::OperatorProfile;
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn profile() -> OperatorProfile {
        OperatorProfile {
            first_name: "John".into(),
            last_name: None,
            phone: "+15551234567".into(),
            company: "Acme".into(),
            selling: "widgets".into(),
            tone: None,
            industry: None,
            target_role: None,
            value_props: None,
            common_objections: None,
            additional_context: None,
            email: None,
        }
    }

    fn make_session(id: &str) -> Arc<Session> {
        let (events_tx, _events_rx) = mpsc::unbounded_channel::<SessionEvent>();
        let (audio_tx, _audio_rx) = mpsc::unbounded_channel();
        Arc::new(Session::new(id.to_string(), profile(), events_tx, audio_tx))
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let registry = SessionRegistry::new();
        registry.insert(make_session("a")).await;
        assert!(registry.get("a").await.is_some());
        assert!(registry.get("b").await.is_none());
        assert_eq!(registry.active_count().await, 1);
        registry.remove("a").await;
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn purge_only_touches_expired_terminal_sessions() {
        let registry = SessionRegistry::new();

        let live = make_session("live");
        let fresh_terminal = make_session("fresh");
        let old_terminal = make_session("old");
        fresh_terminal.state.write().await.terminal_at = Some(Instant::now());
        old_terminal.state.write().await.terminal_at =
            Some(Instant::now() - Duration::from_secs(301));

        registry.insert(live).await;
        registry.insert(fresh_terminal).await;
        registry.insert(old_terminal).await;

        let purged = registry.purge_expired(TERMINAL_GRACE).await;
        assert_eq!(purged, vec!["old".to_string()]);
        assert!(registry.get("live").await.is_some());
        assert!(registry.get("fresh").await.is_some());
        assert!(registry.get("old").await.is_none());

        // A second sweep does not purge anything twice.
        let purged = registry.purge_expired(TERMINAL_GRACE).await;
        assert!(purged.is_empty());
    }
}
