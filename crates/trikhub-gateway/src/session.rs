//! In-memory per-trik sessions with bounded history.
//!
//! History records input and agent-visible data only; passthrough content
//! never enters a session. Sessions expire after `max_duration_ms` of
//! inactivity and drop their oldest entries past `max_history_entries`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use trikhub_core::ids::SessionId;
use trikhub_core::skill::{HistoryEntry, SessionContext};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: SessionId,
    pub trik_id: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub expires_at: i64,
    pub history: Vec<HistoryEntry>,
    max_duration_ms: u64,
    max_history_entries: usize,
}

impl Session {
    pub fn context(&self) -> SessionContext {
        SessionContext {
            session_id: self.session_id.clone(),
            history: self.history.clone(),
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        trik_id: &str,
        max_duration_ms: u64,
        max_history_entries: usize,
    ) -> Session {
        let now = now_ms();
        let session = Session {
            session_id: SessionId::new(),
            trik_id: trik_id.to_string(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + max_duration_ms as i64,
            history: Vec::new(),
            max_duration_ms,
            max_history_entries,
        };
        self.sessions
            .lock()
            .insert(session.session_id.clone(), session.clone());
        session
    }

    /// Fetch a live session, refreshing its inactivity window. Expired
    /// sessions are dropped and reported as absent.
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let now = now_ms();
        let expired = sessions
            .get(session_id)
            .map(|session| now > session.expires_at)
            .unwrap_or(false);
        if expired {
            sessions.remove(session_id);
            return None;
        }
        let session = sessions.get_mut(session_id)?;
        session.last_activity_at = now;
        session.expires_at = now + session.max_duration_ms as i64;
        Some(session.clone())
    }

    /// Append a history entry, evicting the oldest past the bound.
    pub fn add_history(
        &self,
        session_id: &SessionId,
        action: &str,
        input: Value,
        agent_data: Option<Value>,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        session.history.push(HistoryEntry {
            timestamp: now_ms(),
            action: action.to_string(),
            input,
            agent_data,
        });
        if session.history.len() > session.max_history_entries {
            let excess = session.history.len() - session.max_history_entries;
            session.history.drain(..excess);
        }
        true
    }

    pub fn delete(&self, session_id: &SessionId) {
        self.sessions.lock().remove(session_id);
    }

    /// Sweep expired sessions, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let now = now_ms();
        let before = sessions.len();
        sessions.retain(|_, session| now <= session.expires_at);
        before - sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Drop every session (gateway shutdown).
    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_and_get() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 60_000, 20);
        assert!(session.session_id.as_str().starts_with("sess_"));
        let fetched = store.get(&session.session_id).unwrap();
        assert_eq!(fetched.trik_id, "@demo/t");
        assert!(fetched.history.is_empty());
    }

    #[test]
    fn get_missing_is_none() {
        let store = SessionStore::new();
        assert!(store.get(&SessionId::from_raw("sess_missing")).is_none());
    }

    #[test]
    fn history_appends_in_order() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 60_000, 20);
        store.add_history(&session.session_id, "a", json!({"n": 1}), Some(json!({"r": 1})));
        store.add_history(&session.session_id, "b", json!({"n": 2}), None);

        let fetched = store.get(&session.session_id).unwrap();
        assert_eq!(fetched.history.len(), 2);
        assert_eq!(fetched.history[0].action, "a");
        assert_eq!(fetched.history[1].action, "b");
        assert!(fetched.history[1].agent_data.is_none());
    }

    #[test]
    fn history_bound_drops_oldest() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 60_000, 3);
        for i in 0..5 {
            store.add_history(&session.session_id, &format!("action{i}"), json!({}), None);
        }
        let fetched = store.get(&session.session_id).unwrap();
        assert_eq!(fetched.history.len(), 3);
        assert_eq!(fetched.history[0].action, "action2");
        assert_eq!(fetched.history[2].action, "action4");
    }

    #[test]
    fn history_at_exact_bound_keeps_all() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 60_000, 3);
        for i in 0..3 {
            store.add_history(&session.session_id, &format!("action{i}"), json!({}), None);
        }
        let fetched = store.get(&session.session_id).unwrap();
        assert_eq!(fetched.history.len(), 3);
        assert_eq!(fetched.history[0].action, "action0");
    }

    #[test]
    fn inactivity_expiry() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 0, 20);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.get(&session.session_id).is_none());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn activity_refreshes_expiry() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 50, 20);
        for _ in 0..4 {
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(store.get(&session.session_id).is_some(), "touch keeps it alive");
        }
    }

    #[test]
    fn delete_session() {
        let store = SessionStore::new();
        let session = store.create("@demo/t", 60_000, 20);
        store.delete(&session.session_id);
        assert!(store.get(&session.session_id).is_none());
    }

    #[test]
    fn cleanup_sweeps_expired() {
        let store = SessionStore::new();
        store.create("@demo/t", 0, 20);
        store.create("@demo/t", 60_000, 20);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn add_history_to_missing_session_is_false() {
        let store = SessionStore::new();
        assert!(!store.add_history(&SessionId::from_raw("sess_x"), "a", json!({}), None));
    }
}
