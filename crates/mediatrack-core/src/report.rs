//! Report bodies and collection endpoints
//!
//! - Per-hit report objects for real-time delivery
//! - Batched session reports for offline delivery
//! - Tracking URLs and backend session id extraction

use crate::config::MediaState;
use crate::hit::{EventType, Hit};
use crate::keys::{ad, analytics, info, media, report};
use serde_json::{json, Map, Value};
use tracing::trace;
use url::Url;

/// Collection endpoint for session start and batched reports
///
/// Empty when the server does not form a valid URL.
pub fn tracking_url(server: &str) -> String {
    build_url(server, &["api", "v1", "sessions"])
}

/// Collection endpoint for events of an established backend session
pub fn events_url(server: &str, backend_session_id: &str) -> String {
    build_url(server, &["api", "v1", "sessions", backend_session_id, "events"])
}

fn build_url(server: &str, segments: &[&str]) -> String {
    if server.is_empty() {
        return String::new();
    }

    let Ok(mut url) = Url::parse(&format!("https://{}", server)) else {
        trace!(server, "Collection server does not form a valid URL");
        return String::new();
    };

    match url.path_segments_mut() {
        Ok(mut path) => {
            path.clear().extend(segments);
        }
        Err(()) => return String::new(),
    }

    url.to_string()
}

/// Backend session id from a `Location` header
///
/// Accepts `/api/{version}/sessions/{id}` or an absolute URL with that path.
pub fn extract_backend_session_id(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.to_string(),
    };

    let id = path
        .strip_prefix("/api/")
        .and_then(|rest| rest.rfind("/sessions/").map(|at| &rest[at + "/sessions/".len()..]))
        .filter(|id| !id.is_empty());

    match id {
        Some(id) => {
            trace!(backend_session_id = id, "Extracted backend session id");
            Some(id.to_string())
        }
        None => {
            trace!(location, "Failed to extract backend session id");
            None
        }
    }
}

/// Client session id carried by a sessionStart hit
pub fn client_session_id(hit: &Hit) -> Option<String> {
    if hit.event_type != EventType::SessionStart {
        return None;
    }

    hit.params
        .get(info::SESSION_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Report object for one hit
pub fn hit_to_report_value(state: &MediaState, hit: &Hit) -> Value {
    let mut object = Map::new();
    object.insert(report::EVENT_TYPE.into(), json!(hit.event_type.as_str()));

    if !hit.custom_metadata.is_empty() {
        object.insert(report::CUSTOM_METADATA.into(), json!(hit.custom_metadata));
    }

    if !hit.qoe_data.is_empty() {
        object.insert(report::QOE_DATA.into(), Value::Object(hit.qoe_data.clone()));
    }

    object.insert(
        report::PLAYER_TIME.into(),
        json!({ report::TS: hit.timestamp, report::PLAYHEAD: hit.playhead }),
    );

    let mut params = hit.params.clone();
    match hit.event_type {
        EventType::SessionStart => add_session_start_params(state, &mut params),
        EventType::AdStart => {
            if let Some(player_name) = &state.player_name {
                params.insert(ad::PLAYER_NAME.into(), json!(player_name));
            }
        }
        _ => {}
    }

    if !params.is_empty() {
        object.insert(report::PARAMS.into(), Value::Object(params));
    }

    Value::Object(object)
}

fn add_session_start_params(state: &MediaState, params: &mut Map<String, Value>) {
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            params.insert(key.to_string(), value);
        }
    };

    put(
        analytics::TRACKING_SERVER,
        state.analytics_tracking_server.as_ref().map(|s| json!(s)),
    );
    put(analytics::ENABLE_SSL, Some(json!(state.ssl)));
    put(
        analytics::REPORT_SUITE,
        state.analytics_report_suite.as_ref().map(|s| json!(s)),
    );
    put(
        analytics::VISITOR_ID,
        state.analytics_visitor_id.as_ref().map(|s| json!(s)),
    );
    put(analytics::AID, state.analytics_aid.as_ref().map(|s| json!(s)));
    put(analytics::ORG_ID, state.org_id.as_ref().map(|s| json!(s)));
    put(analytics::USER_ID, state.visitor_id.as_ref().map(|s| json!(s)));
    put(analytics::LOCATION_HINT, state.location_hint.map(|h| json!(h)));

    if !params.contains_key(media::CHANNEL) {
        if let Some(channel) = &state.channel {
            params.insert(media::CHANNEL.into(), json!(channel));
        }
    }

    if let Some(player_name) = &state.player_name {
        params.insert(media::PLAYER_NAME.into(), json!(player_name));
    }

    if let Some(app_version) = state.app_version.as_deref().filter(|v| !v.is_empty()) {
        params.insert(media::SDK_VERSION.into(), json!(app_version));
    }

    params.insert(media::LIBRARY_VERSION.into(), json!(crate::VERSION));
    params.remove(info::SESSION_ID);
}

/// JSON body for one real-time hit
pub fn hit_report(state: &MediaState, hit: &Hit) -> String {
    hit_to_report_value(state, hit).to_string()
}

/// Batched JSON body for one offline session
///
/// Empty when the hits contain no sessionStart.
pub fn download_report(state: &MediaState, hits: &[Hit]) -> String {
    let mut reports = Vec::new();
    let mut started = false;
    let mut ended = false;
    let mut last_playhead = 0.0;
    let mut last_ts = 0;

    for hit in hits {
        if !started {
            started = hit.event_type == EventType::SessionStart;
        }

        if !started {
            trace!(event_type = %hit.event_type, "Dropping hit received before sessionStart");
            continue;
        }

        ended = hit.event_type.is_session_end();
        reports.push(hit_to_report_value(state, hit));
        last_playhead = hit.playhead;
        last_ts = hit.timestamp;

        if ended {
            trace!("Session ended, dropping remaining hits");
            break;
        }
    }

    if !started {
        return String::new();
    }

    if !ended {
        let end = Hit::new(EventType::SessionEnd, last_playhead, last_ts);
        reports.push(hit_to_report_value(state, &end));
    }

    Value::Array(reports).to_string()
}
