//! Real-time hit delivery
//!
//! Each internal session owns a queue of hits that is drained one request
//! at a time. The first hit must be a sessionStart, whose response carries
//! the backend session id every later hit is posted under. A 250 ms tick
//! drives all sessions and reaps the ones that finished.

use crate::config::SharedMediaState;
use crate::hit::{EventType, Hit};
use crate::network::{HttpRequest, HttpResponse, Transport};
use crate::processor::HitProcessor;
use crate::report;
use crate::timer::RepeatingTimer;
use crate::types::PrivacyStatus;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Interval between session processing ticks
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Extra attempts for a sessionStart that yielded no backend id
const SESSION_START_RETRY_COUNT: u32 = 2;

/// Hit timestamp gap that indicates a stalled clock
const MAX_HIT_GAP_MS: i64 = 60_000;

/// Notification sent when the backend assigned a session id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCreated {
    /// Caller-side session id from the tracker event, if any
    pub client_session_id: Option<String>,
    pub backend_session_id: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Default)]
struct SessionQueue {
    hits: VecDeque<Hit>,
    backend_session_id: Option<String>,
    ended: bool,
    aborted: bool,
    sending: bool,
    session_start_retries: u32,
    last_ts: i64,
}

/// One internal session posting hits as they come
pub struct RealTimeSession {
    state: SharedMediaState,
    transport: Arc<dyn Transport>,
    handle: Handle,
    events: broadcast::Sender<SessionCreated>,
    queue: Arc<Mutex<SessionQueue>>,
}

impl RealTimeSession {
    pub fn new(
        state: SharedMediaState,
        transport: Arc<dyn Transport>,
        handle: Handle,
        events: broadcast::Sender<SessionCreated>,
    ) -> Self {
        Self {
            state,
            transport,
            handle,
            events,
            queue: Arc::new(Mutex::new(SessionQueue::default())),
        }
    }

    pub fn queue_size(&self) -> usize {
        lock(&self.queue).hits.len()
    }

    pub fn backend_session_id(&self) -> Option<String> {
        lock(&self.queue).backend_session_id.clone()
    }

    /// Accepted until the session is aborted
    pub fn queue_hit(&self, hit: Hit) {
        let mut queue = lock(&self.queue);
        if queue.aborted {
            debug!(event_type = %hit.event_type, "Session aborted, dropping hit");
            return;
        }
        queue.hits.push_back(hit);
    }

    /// Drain what is queued, then finish
    pub fn end(&self) {
        let mut queue = lock(&self.queue);
        if queue.ended {
            trace!("Session already ended");
            return;
        }
        queue.ended = true;
    }

    /// Stop right away, discarding unsent hits
    pub fn abort(&self) {
        let mut queue = lock(&self.queue);
        if queue.aborted {
            trace!("Session already aborted");
            return;
        }
        queue.aborted = true;
        queue.hits.clear();
    }

    pub fn finished_processing(&self) -> bool {
        let queue = lock(&self.queue);
        (queue.ended || queue.aborted) && !queue.sending && queue.hits.is_empty()
    }

    /// Send the head of the queue unless a request is already in flight
    pub fn process(&self) {
        let mut queue = lock(&self.queue);
        if queue.hits.is_empty() || queue.sending {
            return;
        }

        let state = self.state.snapshot();
        if !state.is_ready_to_send() {
            return;
        }

        let Some(hit) = queue.hits.front().cloned() else {
            return;
        };
        let is_session_start = hit.event_type == EventType::SessionStart;

        let server = state.collection_server.as_deref().unwrap_or_default();
        let url = match (queue.backend_session_id.clone(), is_session_start) {
            (_, true) => report::tracking_url(server),
            (Some(backend_id), false) => report::events_url(server, &backend_id),
            (None, false) => {
                debug!(event_type = %hit.event_type, "Dropping hit, backend session id unavailable");
                queue.hits.pop_front();
                return;
            }
        };

        if url.is_empty() {
            warn!(event_type = %hit.event_type, "Unable to build tracking URL, dropping hit");
            queue.hits.pop_front();
            return;
        }

        if is_session_start {
            queue.last_ts = hit.timestamp;
        }

        let gap = hit.timestamp.saturating_sub(queue.last_ts);
        if gap >= MAX_HIT_GAP_MS {
            warn!(
                event_type = %hit.event_type,
                gap_ms = gap,
                "Timestamp difference from previous hit is greater than 60 seconds"
            );
        }
        queue.last_ts = hit.timestamp;
        queue.sending = true;
        drop(queue);

        let client_session_id = report::client_session_id(&hit);
        let request = HttpRequest::post_json(url, report::hit_report(&state, &hit))
            .with_validation_token(state.assurance_integration_id.as_deref());

        debug!(event_type = %hit.event_type, url = %request.url, "Sending hit");

        let transport = self.transport.clone();
        let queue = self.queue.clone();
        let events = self.events.clone();
        let event_type = hit.event_type;

        self.handle.spawn(async move {
            let result = transport
                .post(request)
                .await
                .and_then(HttpResponse::error_for_status);
            let backend_session_id = match result {
                Ok(response) if is_session_start => response
                    .location
                    .as_deref()
                    .and_then(report::extract_backend_session_id),
                Ok(_) => None,
                Err(e) => {
                    debug!(
                        %event_type,
                        error = %e,
                        code = e.error_code(),
                        recoverable = e.is_recoverable(),
                        "Hit delivery failed"
                    );
                    None
                }
            };

            let mut queue = lock(&queue);
            let mut retry = false;

            if is_session_start {
                match backend_session_id {
                    Some(backend_session_id) => {
                        debug!(%backend_session_id, "Collection server created session");
                        queue.backend_session_id = Some(backend_session_id.clone());
                        let created = SessionCreated {
                            client_session_id,
                            backend_session_id,
                        };
                        if events.send(created).is_err() {
                            trace!("No session listeners, dropping SessionCreated");
                        }
                    }
                    None => {
                        retry = queue.session_start_retries < SESSION_START_RETRY_COUNT;
                        queue.session_start_retries += 1;
                    }
                }
            }

            queue.sending = false;
            if !retry {
                queue.hits.pop_front();
            }
        });
    }
}

// =============================================================================
// Service
// =============================================================================

struct Shared {
    state: SharedMediaState,
    transport: Arc<dyn Transport>,
    handle: Handle,
    events: broadcast::Sender<SessionCreated>,
    sessions: Mutex<HashMap<String, RealTimeSession>>,
}

impl Shared {
    fn tick(&self) {
        let mut sessions = lock(&self.sessions);
        sessions.retain(|id, session| {
            session.process();
            let finished = session.finished_processing();
            if finished {
                trace!(session_id = %id, "Session finished processing, removing it");
            }
            !finished
        });
    }

    fn abort_all(&self) {
        let mut sessions = lock(&self.sessions);
        for session in sessions.values() {
            session.abort();
        }
        sessions.clear();
    }
}

/// [`HitProcessor`] delivering hits while they are tracked
pub struct RealTimeService {
    shared: Arc<Shared>,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl RealTimeService {
    pub fn new(state: SharedMediaState, transport: Arc<dyn Transport>, handle: Handle) -> Self {
        Self::with_options(state, transport, handle, true)
    }

    /// Without the tick timer sessions only advance on [`RealTimeService::tick`]
    pub fn with_options(
        state: SharedMediaState,
        transport: Arc<dyn Transport>,
        handle: Handle,
        enable_tick_timer: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            state,
            transport,
            handle,
            events,
            sessions: Mutex::new(HashMap::new()),
        });

        let timer = enable_tick_timer.then(|| {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            RepeatingTimer::start(&shared.handle, TICK_INTERVAL, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.tick();
                }
            })
        });

        Self {
            shared,
            timer: Mutex::new(timer),
        }
    }

    /// Process every session once and reap the finished ones
    pub fn tick(&self) {
        self.shared.tick();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionCreated> {
        self.shared.events.subscribe()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.shared.sessions).len()
    }

    pub fn queue_size(&self, session_id: &str) -> Option<usize> {
        lock(&self.shared.sessions)
            .get(session_id)
            .map(RealTimeSession::queue_size)
    }

    pub fn backend_session_id(&self, session_id: &str) -> Option<String> {
        lock(&self.shared.sessions)
            .get(session_id)
            .and_then(RealTimeSession::backend_session_id)
    }
}

impl HitProcessor for RealTimeService {
    fn start_session(&self) -> Option<String> {
        let privacy = self.shared.state.privacy_status();
        if privacy != PrivacyStatus::OptIn {
            debug!(%privacy, "Cannot start session, privacy is not opted in");
            return None;
        }

        let session_id = Uuid::new_v4().to_string();
        let session = RealTimeSession::new(
            self.shared.state.clone(),
            self.shared.transport.clone(),
            self.shared.handle.clone(),
            self.shared.events.clone(),
        );
        lock(&self.shared.sessions).insert(session_id.clone(), session);
        trace!(session_id = %session_id, "Session started");
        Some(session_id)
    }

    fn process_hit(&self, session_id: &str, hit: Hit) {
        match lock(&self.shared.sessions).get(session_id) {
            Some(session) => {
                trace!(session_id, event_type = %hit.event_type, "Queueing hit");
                session.queue_hit(hit);
            }
            None => debug!(session_id, "Session missing, dropping hit"),
        }
    }

    fn end_session(&self, session_id: &str) {
        match lock(&self.shared.sessions).get(session_id) {
            Some(session) => {
                session.end();
                trace!(session_id, "Session ended");
            }
            None => debug!(session_id, "Session missing, cannot end it"),
        }
    }

    fn reset(&self) {
        trace!("Aborting all sessions");
        self.shared.abort_all();
    }

    fn notify_privacy_change(&self) {
        if self.shared.state.privacy_status() == PrivacyStatus::OptOut {
            debug!("Privacy opted out, aborting all sessions");
            self.shared.abort_all();
        }
    }

    fn destroy(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.cancel();
        }
        self.shared.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaState;
    use crate::keys::info;
    use crate::network::VALIDATION_TOKEN_HEADER;
    use crate::testing::{ready_state, FakeTransport};
    use crate::types::Params;
    use serde_json::json;

    fn created(location: &str) -> HttpResponse {
        HttpResponse {
            status: 201,
            location: Some(location.to_string()),
        }
    }

    fn session_start(ts: i64) -> Hit {
        let mut params = Params::new();
        params.insert(info::SESSION_ID.into(), json!("client-1"));
        Hit::new(EventType::SessionStart, 0.0, ts).with_params(params)
    }

    fn service(state: MediaState, transport: Arc<FakeTransport>) -> RealTimeService {
        RealTimeService::with_options(
            SharedMediaState::new(state),
            transport,
            Handle::current(),
            false,
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_session_start_then_events() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let service = service(ready_state(), transport.clone());
        let mut created_rx = service.subscribe();

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(1000));
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 1500));
        assert_eq!(service.queue_size(&id), Some(2));

        service.tick();
        // One request in flight at a time
        service.tick();
        assert_eq!(transport.request_count(), 1);
        settle().await;

        assert_eq!(service.backend_session_id(&id).as_deref(), Some("abc"));
        let event = created_rx.try_recv().unwrap();
        assert_eq!(event.client_session_id.as_deref(), Some("client-1"));
        assert_eq!(event.backend_session_id, "abc");

        service.tick();
        settle().await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "https://collection.example.com/api/v1/sessions");
        assert_eq!(
            requests[1].url,
            "https://collection.example.com/api/v1/sessions/abc/events"
        );
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert!(body["params"].get(info::SESSION_ID).is_none());
        assert_eq!(service.queue_size(&id), Some(0));
    }

    #[tokio::test]
    async fn test_session_start_retries_then_drops() {
        let transport = Arc::new(FakeTransport::with_status(500));
        let service = service(ready_state(), transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 10));

        for _ in 0..3 {
            service.tick();
            settle().await;
        }
        assert_eq!(transport.request_count(), 3);
        assert_eq!(service.queue_size(&id), Some(1));

        // No backend id, the play hit is dropped without a request
        service.tick();
        settle().await;
        assert_eq!(transport.request_count(), 3);
        assert_eq!(service.queue_size(&id), Some(0));
    }

    #[tokio::test]
    async fn test_session_created_without_listeners() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let service = service(ready_state(), transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.process_hit(&id, Hit::new(EventType::Play, 0.0, 10));
        service.tick();
        settle().await;
        assert_eq!(service.backend_session_id(&id).as_deref(), Some("abc"));

        // A late subscriber does not see earlier sessions
        let mut created_rx = service.subscribe();
        service.tick();
        settle().await;
        assert_eq!(transport.request_count(), 2);
        assert_eq!(service.queue_size(&id), Some(0));
        assert!(created_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_session_start_ignores_location() {
        let transport = Arc::new(FakeTransport::new(HttpResponse {
            status: 403,
            location: Some("/api/v1/sessions/abc".into()),
        }));
        let service = service(ready_state(), transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.tick();
        settle().await;

        assert!(service.backend_session_id(&id).is_none());
        assert_eq!(service.queue_size(&id), Some(1));
    }

    #[tokio::test]
    async fn test_missing_location_is_failure() {
        let transport = Arc::new(FakeTransport::with_status(201));
        let service = service(ready_state(), transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.tick();
        settle().await;

        assert!(service.backend_session_id(&id).is_none());
        assert_eq!(service.queue_size(&id), Some(1));
    }

    #[tokio::test]
    async fn test_validation_token_header() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let mut state = ready_state();
        state.assurance_integration_id = Some("debug".into());
        let service = service(state, transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.tick();
        settle().await;

        let headers = &transport.requests()[0].headers;
        assert!(headers.contains(&(VALIDATION_TOKEN_HEADER.to_string(), "debug".to_string())));
    }

    #[tokio::test]
    async fn test_not_ready_holds_hits() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let mut state = ready_state();
        state.network_available = false;
        let service = service(state, transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.tick();
        settle().await;
        assert_eq!(transport.request_count(), 0);
        assert_eq!(service.queue_size(&id), Some(1));
    }

    #[tokio::test]
    async fn test_end_drains_then_reaps() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let service = service(ready_state(), transport.clone());

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        service.end_session(&id);
        // Still accepted after a graceful end
        service.process_hit(&id, Hit::new(EventType::SessionComplete, 0.0, 10));
        assert_eq!(service.queue_size(&id), Some(2));

        for _ in 0..3 {
            service.tick();
            settle().await;
        }
        assert_eq!(transport.request_count(), 2);
        assert_eq!(service.session_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_discards_hits() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let session = RealTimeSession::new(
            SharedMediaState::new(ready_state()),
            transport.clone(),
            Handle::current(),
            broadcast::channel(1).0,
        );

        session.queue_hit(session_start(0));
        assert!(!session.finished_processing());
        session.abort();
        session.queue_hit(Hit::new(EventType::Play, 0.0, 0));
        assert_eq!(session.queue_size(), 0);
        assert!(session.finished_processing());
        session.process();
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_privacy_gates_sessions() {
        let transport = Arc::new(FakeTransport::with_status(200));
        let state = SharedMediaState::new(ready_state());
        let service =
            RealTimeService::with_options(state.clone(), transport, Handle::current(), false);

        let id = service.start_session().unwrap();
        state.update(|s| s.privacy_status = PrivacyStatus::Unknown);
        assert!(service.start_session().is_none());
        service.notify_privacy_change();
        assert_eq!(service.session_count(), 1);

        state.update(|s| s.privacy_status = PrivacyStatus::OptOut);
        service.notify_privacy_change();
        assert_eq!(service.session_count(), 0);
        service.process_hit(&id, session_start(0));
        assert_eq!(service.queue_size(&id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_timer_drives_sessions() {
        let transport = Arc::new(FakeTransport::new(created("/api/v1/sessions/abc")));
        let service = RealTimeService::new(
            SharedMediaState::new(ready_state()),
            transport.clone(),
            Handle::current(),
        );

        let id = service.start_session().unwrap();
        service.process_hit(&id, session_start(0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(transport.request_count(), 1);

        service.destroy();
        assert_eq!(service.session_count(), 0);
    }
}
