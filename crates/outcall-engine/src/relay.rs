//! Observer relay: read-only subscribers to a session's event stream.
//!
//! Observers connect keyed by session id; every broadcast from the
//! orchestrator or control plane is serialized once and fanned out to
//! each connected observer in order. Sends are best-effort: a dropped
//! observer never affects the call.

use outcall_types::ObserverEvent;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

struct Observer {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// Process-global observer registry.
#[derive(Default)]
pub struct ObserverRelay {
    observers: RwLock<HashMap<String, Vec<Observer>>>,
}

impl ObserverRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for a session. Returns the observer id used
    /// to remove it on disconnect.
    pub async fn add(&self, session_id: &str, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.observers
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(Observer { id, tx });
        id
    }

    /// Removes one observer; drops the session entry when empty.
    pub async fn remove(&self, session_id: &str, observer_id: Uuid) {
        let mut observers = self.observers.write().await;
        if let Some(list) = observers.get_mut(session_id) {
            list.retain(|o| o.id != observer_id);
            if list.is_empty() {
                observers.remove(session_id);
            }
        }
    }

    /// Broadcasts one event to every observer of a session.
    ///
    /// Dead observers are pruned as a side effect.
    pub async fn broadcast(&self, session_id: &str, event: &ObserverEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(session_id, error = %e, "failed to serialize observer event");
                return;
            }
        };

        let mut observers = self.observers.write().await;
        if let Some(list) = observers.get_mut(session_id) {
            list.retain(|o| o.tx.send(payload.clone()).is_ok());
            if list.is_empty() {
                observers.remove(session_id);
            }
        }
    }

    /// Drops all observers for a session (used at purge time).
    pub async fn remove_session(&self, session_id: &str) {
        self.observers.write().await.remove(session_id);
    }

    pub async fn observer_count(&self, session_id: &str) -> usize {
        self.observers
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }
}
