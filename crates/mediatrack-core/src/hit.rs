//! Analytics hit records

use crate::error::Result;
use crate::types::{Metadata, Params};
use serde::{Deserialize, Serialize};

/// Hit event types understood by the collection backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    SessionStart,
    SessionComplete,
    SessionEnd,
    AdBreakStart,
    AdBreakComplete,
    AdStart,
    AdComplete,
    AdSkip,
    ChapterStart,
    ChapterComplete,
    ChapterSkip,
    Play,
    Ping,
    BufferStart,
    PauseStart,
    BitrateChange,
    Error,
    StateStart,
    StateEnd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "sessionStart",
            EventType::SessionComplete => "sessionComplete",
            EventType::SessionEnd => "sessionEnd",
            EventType::AdBreakStart => "adBreakStart",
            EventType::AdBreakComplete => "adBreakComplete",
            EventType::AdStart => "adStart",
            EventType::AdComplete => "adComplete",
            EventType::AdSkip => "adSkip",
            EventType::ChapterStart => "chapterStart",
            EventType::ChapterComplete => "chapterComplete",
            EventType::ChapterSkip => "chapterSkip",
            EventType::Play => "play",
            EventType::Ping => "ping",
            EventType::BufferStart => "bufferStart",
            EventType::PauseStart => "pauseStart",
            EventType::BitrateChange => "bitrateChange",
            EventType::Error => "error",
            EventType::StateStart => "stateStart",
            EventType::StateEnd => "stateEnd",
        }
    }

    /// Ends the backend session
    pub fn is_session_end(&self) -> bool {
        matches!(self, EventType::SessionComplete | EventType::SessionEnd)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped analytics record
///
/// The serde form is the persisted layout: `eventtype`, `params`,
/// `metadata`, `qoedata`, `playhead`, `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "eventtype")]
    pub event_type: EventType,
    #[serde(default)]
    pub params: Params,
    #[serde(rename = "metadata", default)]
    pub custom_metadata: Metadata,
    #[serde(rename = "qoedata", default)]
    pub qoe_data: Params,
    pub playhead: f64,
    /// Milliseconds
    pub timestamp: i64,
}

impl Hit {
    pub fn new(event_type: EventType, playhead: f64, timestamp: i64) -> Self {
        Self {
            event_type,
            params: Params::new(),
            custom_metadata: Metadata::new(),
            qoe_data: Params::new(),
            playhead,
            timestamp,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.custom_metadata = metadata;
        self
    }

    pub fn with_qoe(mut self, qoe_data: Params) -> Self {
        self.qoe_data = qoe_data;
        self
    }

    /// Persisted JSON string
    pub fn to_persisted(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_persisted(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
