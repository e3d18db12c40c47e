//! Offline hit delivery
//!
//! Hits are persisted per session while it is active. Once a session
//! completes, all of its hits are sent as one batched report. Only one
//! report is in flight at a time:
//!
//! - success marks the session reported and its hits are deleted
//! - failure keeps the hits for a later attempt until the retry cap is exceeded
//! - a session whose hits cannot form a report is invalid and deleted
//!
//! Sessions found in the store at startup are treated as complete.

use crate::config::SharedMediaState;
use crate::error::Result;
use crate::hit::Hit;
use crate::network::{HttpRequest, HttpResponse, Transport};
use crate::processor::HitProcessor;
use crate::report;
use crate::session_ids::{SessionIdManager, SessionState};
use crate::store::HitStore;
use crate::timer::RepeatingTimer;
use crate::types::PrivacyStatus;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, trace, warn};

/// Interval between attempts to report completed sessions
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct Inner {
    manager: SessionIdManager,
    store: Box<dyn HitStore>,
    /// Session whose report is in flight
    reporting: Option<String>,
}

impl Inner {
    fn purge(&mut self, session_id: &str) {
        if let Err(e) = self.store.delete(session_id) {
            warn!(session_id, error = %e, "Failed to delete persisted hits");
        }
    }

    fn load_hits(&self, session_id: &str) -> Result<Vec<Hit>> {
        let rows = self.store.hits(session_id)?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            match Hit::from_persisted(&row) {
                Ok(hit) => hits.push(hit),
                Err(e) => warn!(session_id, error = %e, "Skipping unreadable persisted hit"),
            }
        }
        Ok(hits)
    }
}

struct Shared {
    state: SharedMediaState,
    transport: Arc<dyn Transport>,
    handle: Handle,
    inner: Mutex<Inner>,
}

impl Shared {
    fn report_completed_sessions(self: &Arc<Self>) -> bool {
        let (session_id, request) = {
            let mut inner = lock(&self.inner);

            if let Some(current) = &inner.reporting {
                trace!(session_id = %current, "Report already in flight");
                return false;
            }

            let Some(session_id) = inner.manager.session_to_report().map(str::to_string) else {
                trace!("No completed sessions to report");
                return false;
            };

            let state = self.state.snapshot();
            if !state.is_ready_to_send() {
                return false;
            }

            let hits = match inner.load_hits(&session_id) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, code = e.error_code(), "Failed to read persisted hits");
                    return false;
                }
            };

            let server = state.collection_server.as_deref().unwrap_or_default();
            let url = report::tracking_url(server);
            let body = report::download_report(&state, &hits);

            if url.is_empty() || body.is_empty() {
                warn!(session_id = %session_id, hits = hits.len(), "Unable to build report, discarding session");
                inner.manager.update_session_state(&session_id, SessionState::Invalid);
                if inner.manager.should_clear_session(&session_id) {
                    inner.purge(&session_id);
                }
                return false;
            }

            inner.reporting = Some(session_id.clone());
            (session_id, HttpRequest::post_json(url, body))
        };

        debug!(session_id = %session_id, url = %request.url, "Sending session report");

        let shared = Arc::clone(self);
        self.handle.spawn(async move {
            let result = shared.transport.post(request).await;
            if shared.complete_report(&session_id, result) {
                shared.report_completed_sessions();
            }
        });

        true
    }

    /// Returns whether the report was delivered
    fn complete_report(&self, session_id: &str, result: Result<HttpResponse>) -> bool {
        let success = match result.and_then(HttpResponse::error_for_status) {
            Ok(_) => true,
            Err(e) => {
                debug!(
                    session_id,
                    error = %e,
                    code = e.error_code(),
                    recoverable = e.is_recoverable(),
                    "Session report failed"
                );
                false
            }
        };

        let mut inner = lock(&self.inner);
        if inner.reporting.as_deref() != Some(session_id) {
            // Sessions were reset while the request was in flight
            debug!(session_id, "Discarding result for a cleared session");
            return false;
        }

        let new_state = if success {
            SessionState::Reported
        } else {
            SessionState::Failed
        };
        inner.manager.update_session_state(session_id, new_state);

        if inner.manager.should_clear_session(session_id) {
            trace!(session_id, ?new_state, "Deleting persisted hits");
            inner.purge(session_id);
        }
        inner.reporting = None;

        success
    }

    fn report_async(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        self.handle.spawn(async move {
            shared.report_completed_sessions();
        });
    }

    fn abort_all(&self) {
        let mut inner = lock(&self.inner);
        inner.manager.clear();
        if let Err(e) = inner.store.delete_all() {
            warn!(error = %e, "Failed to delete persisted hits");
        }
        inner.reporting = None;
    }
}

/// [`HitProcessor`] persisting hits and reporting whole sessions
pub struct OfflineService {
    shared: Arc<Shared>,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl OfflineService {
    /// Loads persisted session ids from `store`
    ///
    /// With the flush timer enabled, persisted sessions are reported right
    /// away and then every [`FLUSH_INTERVAL`].
    pub fn new(
        state: SharedMediaState,
        transport: Arc<dyn Transport>,
        store: Box<dyn HitStore>,
        handle: Handle,
        enable_flush_timer: bool,
    ) -> Result<Self> {
        let persisted = store.session_ids()?;
        if !persisted.is_empty() {
            info!(sessions = persisted.len(), "Loaded persisted sessions");
        }

        let shared = Arc::new(Shared {
            state,
            transport,
            handle,
            inner: Mutex::new(Inner {
                manager: SessionIdManager::new(persisted),
                store,
                reporting: None,
            }),
        });

        let timer = enable_flush_timer.then(|| {
            shared.report_async();
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            RepeatingTimer::start(&shared.handle, FLUSH_INTERVAL, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.report_completed_sessions();
                }
            })
        });

        Ok(Self {
            shared,
            timer: Mutex::new(timer),
        })
    }

    /// Send the first eligible completed session
    ///
    /// Returns `true` when a report request was started. `false` when one
    /// is already in flight, nothing is eligible, sending is not possible
    /// or the session could not be turned into a report.
    #[instrument(skip(self))]
    pub fn report_completed_sessions(&self) -> bool {
        self.shared.report_completed_sessions()
    }

    pub fn is_reporting(&self) -> bool {
        lock(&self.shared.inner).reporting.is_some()
    }

    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        lock(&self.shared.inner).manager.state(session_id)
    }

    pub fn session_count(&self) -> usize {
        lock(&self.shared.inner).manager.len()
    }

    /// A report is in flight or a completed session is waiting for one
    pub fn has_pending_reports(&self) -> bool {
        let inner = lock(&self.shared.inner);
        inner.reporting.is_some() || inner.manager.session_to_report().is_some()
    }
}

impl HitProcessor for OfflineService {
    fn start_session(&self) -> Option<String> {
        let privacy = self.shared.state.privacy_status();
        if privacy != PrivacyStatus::OptIn {
            debug!(%privacy, "Cannot start session, privacy is not opted in");
            return None;
        }

        let session_id = lock(&self.shared.inner).manager.start_active_session();
        trace!(session_id = %session_id, "Session started");
        Some(session_id)
    }

    fn process_hit(&self, session_id: &str, hit: Hit) {
        let mut inner = lock(&self.shared.inner);
        if !inner.manager.is_session_active(session_id) {
            debug!(session_id, event_type = %hit.event_type, "Session not active, dropping hit");
            return;
        }

        let persisted = match hit.to_persisted() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to serialize hit");
                return;
            }
        };

        if let Err(e) = inner.store.append(session_id, &persisted) {
            warn!(session_id, error = %e, code = e.error_code(), "Failed to persist hit");
        }
    }

    fn end_session(&self, session_id: &str) {
        {
            let mut inner = lock(&self.shared.inner);
            if !inner.manager.is_session_active(session_id) {
                debug!(session_id, "Session not active, ignoring end");
                return;
            }
            inner
                .manager
                .update_session_state(session_id, SessionState::Complete);
        }
        trace!(session_id, "Session complete");
        self.shared.report_async();
    }

    fn reset(&self) {
        trace!("Aborting all sessions");
        self.shared.abort_all();
    }

    fn notify_privacy_change(&self) {
        if self.shared.state.privacy_status() == PrivacyStatus::OptOut {
            debug!("Privacy opted out, deleting persisted sessions");
            self.shared.abort_all();
        } else {
            self.shared.report_async();
        }
    }

    fn destroy(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaState;
    use crate::hit::EventType;
    use crate::store::MemoryHitStore;
    use crate::testing::{ready_state, FakeTransport};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn service(
        state: MediaState,
        transport: Arc<dyn Transport>,
        store: &MemoryHitStore,
    ) -> OfflineService {
        OfflineService::new(
            SharedMediaState::new(state),
            transport,
            Box::new(store.clone()),
            Handle::current(),
            false,
        )
        .unwrap()
    }

    fn record_session(service: &OfflineService) -> String {
        let id = service.start_session().unwrap();
        service.process_hit(&id, Hit::new(EventType::SessionStart, 0.0, 0));
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 100));
        service.process_hit(&id, Hit::new(EventType::SessionComplete, 5.0, 5000));
        service.end_session(&id);
        id
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    /// Holds every request until released
    struct GatedTransport {
        gate: Notify,
        inner: FakeTransport,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.gate.notified().await;
            self.inner.post(request).await
        }
    }

    #[tokio::test]
    async fn test_success_purges_session() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);

        let id = record_session(&service);
        assert_eq!(store.len(), 3);
        assert_eq!(service.session_state(&id), Some(SessionState::Complete));

        assert!(service.report_completed_sessions());
        assert!(service.is_reporting());
        settle().await;

        assert!(!service.is_reporting());
        assert_eq!(service.session_state(&id), Some(SessionState::Reported));
        assert!(store.is_empty());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://collection.example.com/api/v1/sessions");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["eventType"], "sessionStart");
    }

    #[tokio::test]
    async fn test_end_session_only_completes_active_sessions() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);

        let id = record_session(&service);
        assert!(service.report_completed_sessions());
        settle().await;
        assert_eq!(service.session_state(&id), Some(SessionState::Reported));

        // Ending again must not make the session reportable
        service.end_session(&id);
        settle().await;
        assert_eq!(service.session_state(&id), Some(SessionState::Reported));
        assert!(!service.has_pending_reports());

        service.end_session("unknown");
        settle().await;
        assert_eq!(service.session_state("unknown"), None);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let transport = Arc::new(FakeTransport::with_status(200));
        transport.push(Ok(HttpResponse { status: 301, location: None }));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);
        let id = record_session(&service);

        assert!(service.report_completed_sessions());
        settle().await;
        assert_eq!(service.session_state(&id), Some(SessionState::Failed));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_retry_until_cap() {
        let transport = Arc::new(FakeTransport::with_status(404));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);
        let id = record_session(&service);

        for _ in 0..2 {
            assert!(service.report_completed_sessions());
            settle().await;
            assert_eq!(service.session_state(&id), Some(SessionState::Failed));
            assert_eq!(store.len(), 3);
        }

        assert!(service.report_completed_sessions());
        settle().await;
        assert!(store.is_empty());
        assert!(!service.report_completed_sessions());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_network_error_counts_as_failure() {
        let transport = Arc::new(FakeTransport::with_status(200));
        transport.push(Err(crate::error::Error::ConnectionTimeout));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);
        let id = record_session(&service);

        assert!(service.report_completed_sessions());
        settle().await;
        assert_eq!(service.session_state(&id), Some(SessionState::Failed));
        assert_eq!(store.len(), 3);

        assert!(service.report_completed_sessions());
        settle().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_single_report_in_flight() {
        let transport = Arc::new(GatedTransport {
            gate: Notify::new(),
            inner: FakeTransport::with_status(200),
        });
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);
        let first = record_session(&service);
        let second = record_session(&service);

        assert!(service.report_completed_sessions());
        assert!(!service.report_completed_sessions());
        settle().await;
        assert!(service.is_reporting());

        // Success reports the next session on its own
        transport.gate.notify_one();
        settle().await;
        assert_eq!(service.session_state(&first), Some(SessionState::Reported));
        assert!(service.is_reporting());

        transport.gate.notify_one();
        settle().await;
        assert_eq!(service.session_state(&second), Some(SessionState::Reported));
        assert!(!service.is_reporting());
        assert_eq!(transport.inner.request_count(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_sessions_reported_after_restart() {
        let store = MemoryHitStore::new();
        let mut hits = store.clone();
        for (ts, event_type) in [(0, EventType::SessionStart), (100, EventType::Play)] {
            let hit = Hit::new(event_type, 0.0, ts).to_persisted().unwrap();
            hits.append("previous", &hit).unwrap();
        }

        let transport = Arc::new(FakeTransport::with_status(204));
        let service = service(ready_state(), transport.clone(), &store);
        assert_eq!(service.session_state("previous"), Some(SessionState::Complete));

        assert!(service.report_completed_sessions());
        settle().await;
        assert!(store.is_empty());

        // Closed with a synthesized sessionEnd
        let body: serde_json::Value = serde_json::from_str(&transport.requests()[0].body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[2]["eventType"], "sessionEnd");
    }

    #[tokio::test]
    async fn test_unreportable_session_is_discarded() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);

        let id = service.start_session().unwrap();
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 0));
        service.end_session(&id);

        assert!(!service.report_completed_sessions());
        assert_eq!(service.session_state(&id), Some(SessionState::Invalid));
        assert!(store.is_empty());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_not_ready_keeps_sessions() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let mut state = ready_state();
        state.network_available = false;
        let service = service(state, transport.clone(), &store);
        let id = record_session(&service);

        assert!(!service.report_completed_sessions());
        settle().await;
        assert_eq!(service.session_state(&id), Some(SessionState::Complete));
        assert_eq!(store.len(), 3);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_hits_only_persisted_for_active_sessions() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let mut state = ready_state();
        state.network_available = false;
        let service = service(state, transport, &store);

        service.process_hit("unknown", Hit::new(EventType::Play, 0.0, 0));
        let id = record_session(&service);
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 9000));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_privacy_changes() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let store = MemoryHitStore::new();
        let state = SharedMediaState::new(ready_state());
        let service = OfflineService::new(
            state.clone(),
            transport.clone(),
            Box::new(store.clone()),
            Handle::current(),
            false,
        )
        .unwrap();

        state.update(|s| s.privacy_status = PrivacyStatus::Unknown);
        assert!(service.start_session().is_none());

        state.update(|s| s.privacy_status = PrivacyStatus::OptIn);
        let id = record_session(&service);
        state.update(|s| s.privacy_status = PrivacyStatus::OptOut);
        service.notify_privacy_change();

        assert!(store.is_empty());
        assert_eq!(service.session_state(&id), None);
        assert_eq!(service.session_count(), 0);
        settle().await;
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_result() {
        let transport = Arc::new(GatedTransport {
            gate: Notify::new(),
            inner: FakeTransport::with_status(200),
        });
        let store = MemoryHitStore::new();
        let service = service(ready_state(), transport.clone(), &store);
        record_session(&service);

        assert!(service.report_completed_sessions());
        service.reset();
        assert!(!service.is_reporting());
        assert!(store.is_empty());

        transport.gate.notify_one();
        settle().await;
        assert!(!service.is_reporting());
        assert_eq!(service.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_timer_reports_persisted_sessions() {
        let store = MemoryHitStore::new();
        let mut rows = store.clone();
        let hit = Hit::new(EventType::SessionStart, 0.0, 0).to_persisted().unwrap();
        rows.append("previous", &hit).unwrap();

        let transport = Arc::new(FakeTransport::with_status(404));
        let service = OfflineService::new(
            SharedMediaState::new(ready_state()),
            transport.clone(),
            Box::new(store.clone()),
            Handle::current(),
            true,
        )
        .unwrap();

        // Immediate attempt at startup
        settle().await;
        assert_eq!(transport.request_count(), 1);

        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(transport.request_count(), 2);

        service.destroy();
        tokio::time::sleep(FLUSH_INTERVAL * 2).await;
        settle().await;
        assert_eq!(transport.request_count(), 2);
    }
}
