//! Hit processor interface
//!
//! The seam between hit generation and delivery. [`crate::RealTimeService`]
//! and [`crate::OfflineService`] are the two delivery implementations;
//! [`DisabledProcessor`] stands in when a service could not be built and
//! [`RecordingProcessor`] keeps hits in memory for inspection.

use crate::hit::{EventType, Hit};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Receives generated hits grouped by session
pub trait HitProcessor: Send + Sync {
    /// Register a new session. `None` when privacy forbids tracking.
    fn start_session(&self) -> Option<String>;

    /// Queue a hit for an active session, dropped otherwise
    fn process_hit(&self, session_id: &str, hit: Hit);

    /// Mark the session finished
    fn end_session(&self, session_id: &str);

    /// Drop every session and unsent hit
    fn reset(&self);

    /// Re-read the shared privacy status and react to it
    fn notify_privacy_change(&self);

    /// Stop background work
    fn destroy(&self) {}
}

/// Processor that accepts nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProcessor;

impl HitProcessor for DisabledProcessor {
    fn start_session(&self) -> Option<String> {
        trace!("Hit processor disabled, not starting a session");
        None
    }

    fn process_hit(&self, session_id: &str, hit: Hit) {
        trace!(session_id, event_type = %hit.event_type, "Hit processor disabled, dropping hit");
    }

    fn end_session(&self, _session_id: &str) {}

    fn reset(&self) {}

    fn notify_privacy_change(&self) {}
}

/// Processor that keeps every hit in memory
///
/// Sessions are always granted. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    inner: Mutex<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    started: usize,
    hits: Vec<(String, Hit)>,
    ended: Vec<String>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Recorded hits with their session ids
    pub fn hits(&self) -> Vec<(String, Hit)> {
        self.lock().hits.clone()
    }

    /// Drain the recorded hits
    pub fn take_hits(&self) -> Vec<(String, Hit)> {
        std::mem::take(&mut self.lock().hits)
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.lock().hits.iter().map(|(_, hit)| hit.event_type).collect()
    }

    pub fn sessions_started(&self) -> usize {
        self.lock().started
    }

    pub fn ended_sessions(&self) -> Vec<String> {
        self.lock().ended.clone()
    }
}

impl HitProcessor for RecordingProcessor {
    fn start_session(&self) -> Option<String> {
        let mut recorded = self.lock();
        recorded.started += 1;
        Some(format!("session-{}", recorded.started))
    }

    fn process_hit(&self, session_id: &str, hit: Hit) {
        trace!(session_id, event_type = %hit.event_type, "Recording hit");
        self.lock().hits.push((session_id.to_string(), hit));
    }

    fn end_session(&self, session_id: &str) {
        self.lock().ended.push(session_id.to_string());
    }

    fn reset(&self) {
        let mut recorded = self.lock();
        recorded.hits.clear();
        recorded.ended.clear();
    }

    fn notify_privacy_change(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_processor_is_inert() {
        let processor = DisabledProcessor;
        assert!(processor.start_session().is_none());
        processor.process_hit("s", Hit::new(EventType::Play, 0.0, 0));
        processor.end_session("s");
        processor.reset();
        processor.notify_privacy_change();
        processor.destroy();
    }

    #[test]
    fn test_recording_processor() {
        let processor = RecordingProcessor::new();
        let first = processor.start_session().unwrap();
        let second = processor.start_session().unwrap();
        assert_ne!(first, second);

        processor.process_hit(&first, Hit::new(EventType::SessionStart, 0.0, 0));
        processor.process_hit(&first, Hit::new(EventType::Play, 0.0, 10));
        processor.end_session(&first);

        assert_eq!(processor.sessions_started(), 2);
        assert_eq!(processor.event_types(), vec![EventType::SessionStart, EventType::Play]);
        assert_eq!(processor.ended_sessions(), vec![first.clone()]);
        assert_eq!(processor.take_hits().len(), 2);
        assert!(processor.hits().is_empty());
    }
}
