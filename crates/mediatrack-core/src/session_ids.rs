//! Session lifecycle bookkeeping for persisted sessions
//!
//! ```text
//! Active ──► Complete ──► Reported
//!   │           │
//!   ▼           ▼
//! Invalid    Failed ──► Failed (retry) ──► purged past the cap
//! ```
//!
//! Sessions are reported in creation order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Failures after which a session is no longer reported
pub const MAX_ALLOWED_FAILURE: u32 = 2;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Unknown or past the retry cap
    Invalid,
    /// Still receiving hits
    Active,
    /// Waiting to be reported
    Complete,
    /// Delivered, persisted hits can go
    Reported,
    /// Delivery failed, retried until the cap is exceeded
    Failed,
}

#[derive(Debug, Default)]
pub struct SessionIdManager {
    /// Creation order
    order: Vec<String>,
    states: HashMap<String, SessionState>,
    failures: HashMap<String, u32>,
}

impl SessionIdManager {
    /// Sessions found in the store are complete and eligible for reporting
    pub fn new<I, S>(persisted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut manager = Self::default();
        for id in persisted {
            manager.insert(id.into(), SessionState::Complete);
        }
        manager
    }

    fn insert(&mut self, id: String, state: SessionState) {
        if self.states.insert(id.clone(), state).is_none() {
            self.order.push(id);
        }
    }

    pub fn start_active_session(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert(id.clone(), SessionState::Active);
        id
    }

    pub fn is_session_active(&self, id: &str) -> bool {
        self.states.get(id) == Some(&SessionState::Active)
    }

    pub fn state(&self, id: &str) -> Option<SessionState> {
        self.states.get(id).copied()
    }

    pub fn failure_count(&self, id: &str) -> u32 {
        self.failures.get(id).copied().unwrap_or(0)
    }

    /// Unknown ids are ignored. Moving to `Failed` bumps the failure count.
    pub fn update_session_state(&mut self, id: &str, state: SessionState) {
        let Some(current) = self.states.get_mut(id) else {
            return;
        };
        *current = state;

        if state == SessionState::Failed {
            *self.failures.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    /// First complete session, or first failed one still within the cap
    pub fn session_to_report(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|id| match self.states.get(id.as_str()) {
                Some(SessionState::Complete) => true,
                Some(SessionState::Failed) => self.failure_count(id) <= MAX_ALLOWED_FAILURE,
                _ => false,
            })
            .map(String::as_str)
    }

    /// Whether persisted hits for the session may be deleted
    pub fn should_clear_session(&self, id: &str) -> bool {
        match self.states.get(id) {
            None => true,
            Some(SessionState::Reported | SessionState::Invalid) => true,
            Some(SessionState::Failed) => self.failure_count(id) > MAX_ALLOWED_FAILURE,
            Some(SessionState::Active | SessionState::Complete) => false,
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.states.clear();
        self.failures.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_sessions_are_complete() {
        let manager = SessionIdManager::new(["a", "b"]);
        assert_eq!(manager.state("a"), Some(SessionState::Complete));
        assert_eq!(manager.session_to_report(), Some("a"));
        assert!(!manager.should_clear_session("a"));
    }

    #[test]
    fn test_active_sessions_not_reported() {
        let mut manager = SessionIdManager::default();
        let id = manager.start_active_session();
        assert!(manager.is_session_active(&id));
        assert_eq!(manager.session_to_report(), None);

        manager.update_session_state(&id, SessionState::Complete);
        assert!(!manager.is_session_active(&id));
        assert_eq!(manager.session_to_report(), Some(id.as_str()));
    }

    #[test]
    fn test_creation_order() {
        let mut manager = SessionIdManager::default();
        let first = manager.start_active_session();
        let second = manager.start_active_session();
        manager.update_session_state(&second, SessionState::Complete);
        assert_eq!(manager.session_to_report(), Some(second.as_str()));

        manager.update_session_state(&first, SessionState::Complete);
        assert_eq!(manager.session_to_report(), Some(first.as_str()));
    }

    #[test]
    fn test_failure_cap() {
        let mut manager = SessionIdManager::new(["s"]);

        for expected in 1..=MAX_ALLOWED_FAILURE {
            manager.update_session_state("s", SessionState::Failed);
            assert_eq!(manager.failure_count("s"), expected);
            assert_eq!(manager.session_to_report(), Some("s"));
            assert!(!manager.should_clear_session("s"));
        }

        manager.update_session_state("s", SessionState::Failed);
        assert_eq!(manager.failure_count("s"), MAX_ALLOWED_FAILURE + 1);
        assert_eq!(manager.session_to_report(), None);
        assert!(manager.should_clear_session("s"));
    }

    #[test]
    fn test_should_clear() {
        let mut manager = SessionIdManager::new(["r", "i"]);
        assert!(manager.should_clear_session("unknown"));
        manager.update_session_state("r", SessionState::Reported);
        manager.update_session_state("i", SessionState::Invalid);
        assert!(manager.should_clear_session("r"));
        assert!(manager.should_clear_session("i"));
    }

    #[test]
    fn test_unknown_update_ignored_and_clear() {
        let mut manager = SessionIdManager::new(["a"]);
        manager.update_session_state("ghost", SessionState::Failed);
        assert_eq!(manager.state("ghost"), None);
        assert_eq!(manager.failure_count("ghost"), 0);

        manager.update_session_state("a", SessionState::Failed);
        manager.clear();
        assert!(manager.is_empty());
        assert_eq!(manager.failure_count("a"), 0);
    }
}
