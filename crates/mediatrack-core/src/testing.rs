//! Shared fixtures for unit tests

use crate::config::MediaState;
use crate::error::Result;
use crate::network::{HttpRequest, HttpResponse, Transport};
use crate::types::PrivacyStatus;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Opted-in state with every required tracking setting
pub(crate) fn ready_state() -> MediaState {
    MediaState {
        privacy_status: PrivacyStatus::OptIn,
        collection_server: Some("collection.example.com".into()),
        channel: Some("channel".into()),
        player_name: Some("player".into()),
        analytics_tracking_server: Some("analytics.example.com".into()),
        analytics_report_suite: Some("rsid".into()),
        org_id: Some("org@AdobeOrg".into()),
        visitor_id: Some("ecid".into()),
        ..Default::default()
    }
}

/// Transport answering from a script, then with a default response
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<Result<HttpResponse>>>,
    default: HttpResponse,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new(default: HttpResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `status` and no location
    pub(crate) fn with_status(status: u16) -> Self {
        Self::new(HttpResponse { status, location: None })
    }

    /// Queue the next response
    pub(crate) fn push(&self, response: Result<HttpResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default.clone()))
    }
}
