//! Inbound event contract
//!
//! A [`TrackerEvent`] is the only input the tracker consumes. Event names
//! resolve to rules through a fixed lookup table.

use crate::rules::RuleName;
use crate::types::{Metadata, Params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Event name to rule table
const EVENT_RULES: &[(&str, RuleName)] = &[
    ("sessionstart", RuleName::MediaStart),
    ("complete", RuleName::MediaComplete),
    ("sessionend", RuleName::MediaSkip),
    ("adbreakstart", RuleName::AdBreakStart),
    ("adbreakcomplete", RuleName::AdBreakComplete),
    ("adstart", RuleName::AdStart),
    ("adcomplete", RuleName::AdComplete),
    ("adskip", RuleName::AdSkip),
    ("chapterstart", RuleName::ChapterStart),
    ("chaptercomplete", RuleName::ChapterComplete),
    ("chapterskip", RuleName::ChapterSkip),
    ("play", RuleName::Play),
    ("pause", RuleName::Pause),
    ("seekstart", RuleName::SeekStart),
    ("seekcomplete", RuleName::SeekComplete),
    ("bufferstart", RuleName::BufferStart),
    ("buffercomplete", RuleName::BufferComplete),
    ("bitratechange", RuleName::BitrateChange),
    ("error", RuleName::Error),
    ("qoeupdate", RuleName::QoEUpdate),
    ("playheadupdate", RuleName::PlayheadUpdate),
    ("statestart", RuleName::StateStart),
    ("stateend", RuleName::StateEnd),
];

impl RuleName {
    /// Resolve an external event name
    pub fn from_event_name(name: &str) -> Option<Self> {
        EVENT_RULES
            .iter()
            .find(|(event, _)| *event == name)
            .map(|(_, rule)| *rule)
    }

    /// External event name for this rule
    pub fn event_name(&self) -> &'static str {
        EVENT_RULES
            .iter()
            .find(|(_, rule)| rule == self)
            .map(|(event, _)| *event)
            .unwrap_or("")
    }
}

/// Raw event handed to [`crate::Tracker::track`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerEvent {
    /// Symbolic event name, e.g. `play` or `adbreakstart`
    pub name: String,
    /// Event timestamp in milliseconds, required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Caller-side session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Untyped payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Raw metadata, cleaned before use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl TrackerEvent {
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_metadata<K, V>(mut self, metadata: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = Some(
            metadata
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        );
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Keep only string entries whose key matches `[a-zA-Z0-9_.]+`
pub fn clean_metadata(raw: &serde_json::Map<String, Value>) -> Metadata {
    let mut cleaned = Metadata::new();
    for (key, value) in raw {
        let Some(value) = value.as_str() else {
            debug!(key = %key, "Dropping metadata entry with null or non-string value");
            continue;
        };

        let valid_key = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid_key {
            debug!(
                key = %key,
                value,
                "Dropping metadata entry. Key should contain only alphabets, digits, '_' and '.'"
            );
            continue;
        }

        cleaned.insert(key.clone(), value.to_string());
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_name_table() {
        assert_eq!(RuleName::from_event_name("sessionstart"), Some(RuleName::MediaStart));
        assert_eq!(RuleName::from_event_name("complete"), Some(RuleName::MediaComplete));
        assert_eq!(RuleName::from_event_name("sessionend"), Some(RuleName::MediaSkip));
        assert_eq!(RuleName::from_event_name("qoeupdate"), Some(RuleName::QoEUpdate));
        assert_eq!(RuleName::from_event_name("adbreakskip"), None);
        assert_eq!(RuleName::from_event_name("Play"), None);
        assert_eq!(EVENT_RULES.len(), 23);
    }

    #[test]
    fn test_event_name_round_trip() {
        for (name, rule) in EVENT_RULES {
            assert_eq!(rule.event_name(), *name);
        }
    }

    #[test]
    fn test_clean_metadata() {
        let raw = json!({
            "show": "Show",
            "a.media.show": "Show",
            "bad key": "x",
            "bad-key": "x",
            "null_value": null,
            "number": 5,
        });
        let cleaned = clean_metadata(raw.as_object().unwrap());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.get("show").map(String::as_str), Some("Show"));
        assert!(cleaned.contains_key("a.media.show"));
    }

    #[test]
    fn test_event_from_json() {
        let event: TrackerEvent = serde_json::from_str(
            r#"{"name": "play", "timestamp": 1000, "params": {"time.playhead": 3}}"#,
        )
        .unwrap();
        assert_eq!(event.name, "play");
        assert_eq!(event.timestamp, Some(1000));
        assert!(event.metadata.is_none());
    }
}
