//! Core types for MediaTrack
//!
//! Descriptors are parsed from the untyped parameter payload carried by a
//! [`crate::TrackerEvent`]. A descriptor that fails validation parses to
//! `None`, which the rule table reports as an invalid-info violation.

use crate::keys::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Untyped parameter payload (event params, hit params, QoE data)
pub type Params = serde_json::Map<String, Value>;

/// Cleaned string metadata
pub type Metadata = BTreeMap<String, String>;

/// Default preroll wait time in milliseconds
pub const DEFAULT_PREROLL_WAIT_MS: i64 = 250;

/// Maximum length of a named state
const STATE_NAME_MAX_LEN: usize = 64;

/// User privacy status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrivacyStatus {
    #[serde(rename = "optedin")]
    OptIn,
    #[serde(rename = "optedout")]
    OptOut,
    #[default]
    #[serde(rename = "optunknown")]
    Unknown,
}

impl std::fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyStatus::OptIn => write!(f, "optedin"),
            PrivacyStatus::OptOut => write!(f, "optedout"),
            PrivacyStatus::Unknown => write!(f, "optunknown"),
        }
    }
}

/// Kind of media being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    /// Parse case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("video") {
            Some(MediaType::Video)
        } else if value.eq_ignore_ascii_case("audio") {
            Some(MediaType::Audio)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content being played. Fixed for the lifetime of a tracking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Content id
    pub id: String,
    /// Friendly name
    pub name: String,
    /// Stream type (vod, live, linear, ...)
    pub stream_type: String,
    /// Audio or video
    pub media_type: MediaType,
    /// Length in seconds, 0 for live
    pub length: f64,
    /// Resuming a previously closed session
    pub resumed: bool,
    /// Preroll wait time in milliseconds
    pub preroll_wait_ms: i64,
    /// Send 1s pings while inside an ad
    pub granular_ad_tracking: bool,
}

impl MediaInfo {
    pub fn from_params(params: &Params) -> Option<Self> {
        let id = non_empty_str(params, info::MEDIA_ID)?;
        let name = non_empty_str(params, info::MEDIA_NAME)?;
        let stream_type = non_empty_str(params, info::MEDIA_STREAM_TYPE)?;
        let media_type = params
            .get(info::MEDIA_TYPE)
            .and_then(Value::as_str)
            .and_then(MediaType::parse)?;
        let length = non_negative_f64(params, info::MEDIA_LENGTH)?;

        Some(Self {
            id,
            name,
            stream_type,
            media_type,
            length,
            resumed: opt_bool(params, info::MEDIA_RESUMED).unwrap_or(false),
            preroll_wait_ms: params
                .get(info::MEDIA_PREROLL_WAIT_TIME)
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_PREROLL_WAIT_MS),
            granular_ad_tracking: opt_bool(params, info::MEDIA_GRANULAR_AD_TRACKING)
                .unwrap_or(false),
        })
    }
}

// Preroll wait time only steers local deferral, it does not identify the content.
impl PartialEq for MediaInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.stream_type == other.stream_type
            && self.media_type == other.media_type
            && self.length == other.length
            && self.resumed == other.resumed
            && self.granular_ad_tracking == other.granular_ad_tracking
    }
}

/// Ad break (pod)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdBreakInfo {
    pub name: String,
    /// 1-based index of the break within the content
    pub position: i64,
    /// Playhead offset of the break in seconds
    pub start_time: f64,
}

impl AdBreakInfo {
    pub fn from_params(params: &Params) -> Option<Self> {
        Some(Self {
            name: non_empty_str(params, info::AD_BREAK_NAME)?,
            position: positive_i64(params, info::AD_BREAK_POSITION)?,
            start_time: non_negative_f64(params, info::AD_BREAK_START_TIME)?,
        })
    }
}

/// Single ad inside a break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdInfo {
    pub id: String,
    pub name: String,
    /// 1-based position inside the break
    pub position: i64,
    /// Length in seconds
    pub length: f64,
}

impl AdInfo {
    pub fn from_params(params: &Params) -> Option<Self> {
        Some(Self {
            id: non_empty_str(params, info::AD_ID)?,
            name: non_empty_str(params, info::AD_NAME)?,
            position: positive_i64(params, info::AD_POSITION)?,
            length: non_negative_f64(params, info::AD_LENGTH)?,
        })
    }
}

/// Chapter of the main content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub name: String,
    pub position: i64,
    pub start_time: f64,
    pub length: f64,
}

impl ChapterInfo {
    pub fn from_params(params: &Params) -> Option<Self> {
        Some(Self {
            name: non_empty_str(params, info::CHAPTER_NAME)?,
            position: positive_i64(params, info::CHAPTER_POSITION)?,
            start_time: non_negative_f64(params, info::CHAPTER_START_TIME)?,
            length: non_negative_f64(params, info::CHAPTER_LENGTH)?,
        })
    }
}

/// Quality of experience snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QoEInfo {
    pub bitrate: f64,
    pub dropped_frames: f64,
    pub fps: f64,
    pub startup_time: f64,
}

impl QoEInfo {
    pub fn from_params(params: &Params) -> Option<Self> {
        Some(Self {
            bitrate: non_negative_f64(params, info::QOE_BITRATE)?,
            dropped_frames: non_negative_f64(params, info::QOE_DROPPED_FRAMES)?,
            fps: non_negative_f64(params, info::QOE_FPS)?,
            startup_time: non_negative_f64(params, info::QOE_STARTUP_TIME)?,
        })
    }
}

/// Custom named player state (fullscreen, mute, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateInfo {
    pub name: String,
}

impl StateInfo {
    /// Names are 1-64 characters of `[a-zA-Z0-9_.]`
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= STATE_NAME_MAX_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        valid.then_some(Self { name })
    }

    pub fn from_params(params: &Params) -> Option<Self> {
        params
            .get(info::STATE_NAME)
            .and_then(Value::as_str)
            .and_then(StateInfo::new)
    }
}

fn non_empty_str(params: &Params, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_negative_f64(params: &Params, key: &str) -> Option<f64> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| *v >= 0.0)
}

fn positive_i64(params: &Params, key: &str) -> Option<i64> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .filter(|v| *v >= 1)
}

fn opt_bool(params: &Params, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}
