//! Hit generation
//!
//! Turns tracker transitions into [`Hit`]s for one internal session:
//! - session, chapter, ad break and ad lifecycle hits
//! - playback hits on state change, pings when a state lasts longer than
//!   the ping interval
//! - QoE data attached only when it changed since it was last sent
//!
//! A generator that could not obtain a session from its processor stays
//! silent until restarted.

use crate::config::TrackerConfig;
use crate::context::{MediaContext, PlaybackState};
use crate::hit::{EventType, Hit};
use crate::keys::{self, ad, ad_break, chapter, info, media, qoe, state};
use crate::processor::HitProcessor;
use crate::types::{Metadata, Params, StateInfo};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Ping interval for downloaded content
pub const OFFLINE_PING_INTERVAL_MS: i64 = 50_000;

/// Ping interval for online content
pub const ONLINE_PING_INTERVAL_MS: i64 = 10_000;

/// Ping interval inside an ad with granular ad tracking
pub const GRANULAR_AD_PING_INTERVAL_MS: i64 = 1_000;

pub struct HitGenerator {
    processor: Arc<dyn HitProcessor>,
    config: TrackerConfig,
    /// Last QoE snapshot attached to a hit
    last_qoe: Params,
    /// `Some` while tracking
    session_id: Option<String>,
    interval_ms: i64,
    ref_ts: i64,
    previous_state: PlaybackState,
    previous_state_ts: i64,
    /// Caller-side session id linked to the backend session
    ref_session_id: Option<String>,
}

impl HitGenerator {
    /// Starts an internal session right away
    pub fn new(
        processor: Arc<dyn HitProcessor>,
        config: TrackerConfig,
        ref_ts: i64,
        ref_session_id: Option<String>,
    ) -> Self {
        let interval_ms = default_interval(config.downloaded_content);
        let mut generator = Self {
            processor,
            config,
            last_qoe: Params::new(),
            session_id: None,
            interval_ms,
            ref_ts,
            previous_state: PlaybackState::Init,
            previous_state_ts: ref_ts,
            ref_session_id,
        };
        generator.start_tracking_session();
        generator
    }

    pub fn is_tracking(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn ref_ts(&self) -> i64 {
        self.ref_ts
    }

    /// Timestamp stamped on every subsequent hit
    pub fn set_ref_ts(&mut self, ts: i64) {
        self.ref_ts = ts;
    }

    fn start_tracking_session(&mut self) {
        self.session_id = self.processor.start_session();
        match &self.session_id {
            Some(id) => debug!(session_id = %id, "Started tracking session"),
            None => debug!("Unable to create a tracking session"),
        }
    }

    fn end_tracking_session(&mut self) {
        if let Some(id) = self.session_id.take() {
            debug!(session_id = %id, "Ending tracking session");
            self.processor.end_session(&id);
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub fn process_media_start(&mut self, ctx: &MediaContext, force_resume: bool) {
        let mut params = media_params(ctx);
        if force_resume {
            params.insert(media::RESUME.into(), json!(true));
        }
        params.insert(media::DOWNLOADED.into(), json!(self.config.downloaded_content));

        if let Some(ref_session_id) = &self.ref_session_id {
            params.insert(info::SESSION_ID.into(), json!(ref_session_id));
        }

        if let Some(channel) = &self.config.channel {
            params.insert(media::CHANNEL.into(), json!(channel));
        }

        let metadata = custom_metadata(ctx.media_metadata(), keys::STANDARD_MEDIA_METADATA);
        self.generate_hit(ctx, EventType::SessionStart, params, metadata);
    }

    pub fn process_media_complete(&mut self, ctx: &MediaContext) {
        self.generate_hit(ctx, EventType::SessionComplete, Params::new(), Metadata::new());
        self.end_tracking_session();
    }

    pub fn process_media_skip(&mut self, ctx: &MediaContext) {
        self.generate_hit(ctx, EventType::SessionEnd, Params::new(), Metadata::new());
        self.end_tracking_session();
    }

    /// Ends the internal session after an idle or session timeout
    pub fn process_session_abort(&mut self, ctx: &MediaContext) {
        self.process_media_skip(ctx);
    }

    /// Starts a fresh internal session and replays the current context into it
    pub fn process_session_restart(&mut self, ctx: &MediaContext) {
        self.previous_state = PlaybackState::Init;
        self.previous_state_ts = self.ref_ts;
        self.last_qoe.clear();
        self.start_tracking_session();

        self.process_media_start(ctx, true);

        if ctx.is_in_chapter() {
            self.process_chapter_start(ctx);
        }

        if ctx.is_in_ad_break() {
            self.process_ad_break_start(ctx);
        }

        if ctx.is_in_ad() {
            self.process_ad_start(ctx);
        }

        for state in ctx.active_states() {
            self.process_state_start(ctx, &state);
        }

        self.process_playback(ctx, true);
    }

    // =========================================================================
    // Ad breaks / ads / chapters
    // =========================================================================

    pub fn process_ad_break_start(&mut self, ctx: &MediaContext) {
        let mut params = Params::new();
        if let Some(info) = ctx.ad_break_info() {
            params.insert(ad_break::POD_FRIENDLY_NAME.into(), json!(info.name));
            params.insert(ad_break::POD_INDEX.into(), json!(info.position));
            params.insert(ad_break::POD_SECOND.into(), json!(info.start_time));
        }
        self.generate_hit(ctx, EventType::AdBreakStart, params, Metadata::new());
    }

    pub fn process_ad_break_complete(&mut self, ctx: &MediaContext) {
        self.generate_hit(ctx, EventType::AdBreakComplete, Params::new(), Metadata::new());
    }

    /// The backend has no skip for ad breaks
    pub fn process_ad_break_skip(&mut self, ctx: &MediaContext) {
        self.process_ad_break_complete(ctx);
    }

    pub fn process_ad_start(&mut self, ctx: &MediaContext) {
        self.interval_ms = if self.config.downloaded_content {
            OFFLINE_PING_INTERVAL_MS
        } else if ctx.media_info().granular_ad_tracking {
            GRANULAR_AD_PING_INTERVAL_MS
        } else {
            ONLINE_PING_INTERVAL_MS
        };

        let mut params = Params::new();
        if let Some(info) = ctx.ad_info() {
            params.insert(ad::NAME.into(), json!(info.name));
            params.insert(ad::ID.into(), json!(info.id));
            params.insert(ad::LENGTH.into(), json!(info.length));
            params.insert(ad::POD_POSITION.into(), json!(info.position));
        }
        standard_params(ctx.ad_metadata(), keys::STANDARD_AD_METADATA, &mut params);

        let metadata = custom_metadata(ctx.ad_metadata(), keys::STANDARD_AD_METADATA);
        self.generate_hit(ctx, EventType::AdStart, params, metadata);
    }

    pub fn process_ad_complete(&mut self, ctx: &MediaContext) {
        self.interval_ms = default_interval(self.config.downloaded_content);
        self.generate_hit(ctx, EventType::AdComplete, Params::new(), Metadata::new());
    }

    pub fn process_ad_skip(&mut self, ctx: &MediaContext) {
        self.interval_ms = default_interval(self.config.downloaded_content);
        self.generate_hit(ctx, EventType::AdSkip, Params::new(), Metadata::new());
    }

    pub fn process_chapter_start(&mut self, ctx: &MediaContext) {
        let mut params = Params::new();
        if let Some(info) = ctx.chapter_info() {
            params.insert(chapter::FRIENDLY_NAME.into(), json!(info.name));
            params.insert(chapter::LENGTH.into(), json!(info.length));
            params.insert(chapter::OFFSET.into(), json!(info.start_time));
            params.insert(chapter::INDEX.into(), json!(info.position));
        }
        let metadata = ctx.chapter_metadata().clone();
        self.generate_hit(ctx, EventType::ChapterStart, params, metadata);
    }

    pub fn process_chapter_complete(&mut self, ctx: &MediaContext) {
        self.generate_hit(ctx, EventType::ChapterComplete, Params::new(), Metadata::new());
    }

    pub fn process_chapter_skip(&mut self, ctx: &MediaContext) {
        self.generate_hit(ctx, EventType::ChapterSkip, Params::new(), Metadata::new());
    }

    // =========================================================================
    // QoE / errors / named states
    // =========================================================================

    pub fn process_bitrate_change(&mut self, ctx: &MediaContext) {
        let data = qoe_data(ctx);
        self.send_hit(ctx, EventType::BitrateChange, Params::new(), Metadata::new(), data);
    }

    pub fn process_error(&mut self, ctx: &MediaContext, error_id: &str) {
        let mut data = qoe_data(ctx);
        data.insert(qoe::ERROR_ID.into(), json!(error_id));
        data.insert(qoe::ERROR_SOURCE.into(), json!(qoe::ERROR_SOURCE_PLAYER));
        self.send_hit(ctx, EventType::Error, Params::new(), Metadata::new(), data);
    }

    pub fn process_state_start(&mut self, ctx: &MediaContext, info: &StateInfo) {
        let mut params = Params::new();
        params.insert(state::NAME.into(), json!(info.name));
        self.send_hit(ctx, EventType::StateStart, params, Metadata::new(), Params::new());
    }

    pub fn process_state_end(&mut self, ctx: &MediaContext, info: &StateInfo) {
        let mut params = Params::new();
        params.insert(state::NAME.into(), json!(info.name));
        self.send_hit(ctx, EventType::StateEnd, params, Metadata::new(), Params::new());
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Sends the playback state when it changed or `flush` is set, otherwise
    /// a ping once the state has lasted the ping interval
    pub fn process_playback(&mut self, ctx: &MediaContext, flush: bool) {
        if !self.is_tracking() {
            return;
        }

        let current = playback_state(ctx);
        if self.previous_state != current || flush {
            self.generate_hit(ctx, playback_event(current), Params::new(), Metadata::new());
            self.previous_state = current;
            self.previous_state_ts = self.ref_ts;
        } else if self.ref_ts.saturating_sub(self.previous_state_ts) >= self.interval_ms {
            self.generate_hit(ctx, EventType::Ping, Params::new(), Metadata::new());
            self.previous_state_ts = self.ref_ts;
        }
    }

    /// Attaches QoE data only when it changed since it was last sent
    fn generate_hit(
        &mut self,
        ctx: &MediaContext,
        event_type: EventType,
        params: Params,
        metadata: Metadata,
    ) {
        let data = qoe_data(ctx);
        let data = if data != self.last_qoe { data } else { Params::new() };
        self.send_hit(ctx, event_type, params, metadata, data);
    }

    fn send_hit(
        &mut self,
        ctx: &MediaContext,
        event_type: EventType,
        params: Params,
        metadata: Metadata,
        qoe_params: Params,
    ) {
        if !qoe_params.is_empty() {
            self.last_qoe = qoe_params.clone();
        }

        let Some(session_id) = &self.session_id else {
            debug!(%event_type, "Dropping hit, internal tracking stopped");
            return;
        };

        let hit = Hit::new(event_type, ctx.playhead(), self.ref_ts)
            .with_params(params)
            .with_metadata(metadata)
            .with_qoe(qoe_params);
        self.processor.process_hit(session_id, hit);
    }
}

fn default_interval(downloaded_content: bool) -> i64 {
    if downloaded_content {
        OFFLINE_PING_INTERVAL_MS
    } else {
        ONLINE_PING_INTERVAL_MS
    }
}

/// Overlays win over the exclusive state
fn playback_state(ctx: &MediaContext) -> PlaybackState {
    [
        PlaybackState::Buffer,
        PlaybackState::Seek,
        PlaybackState::Play,
        PlaybackState::Pause,
        PlaybackState::Stall,
    ]
    .into_iter()
    .find(|state| ctx.is_in_state(*state))
    .unwrap_or(PlaybackState::Init)
}

fn playback_event(state: PlaybackState) -> EventType {
    match state {
        PlaybackState::Buffer => EventType::BufferStart,
        PlaybackState::Seek | PlaybackState::Pause => EventType::PauseStart,
        // Stall is reported as play
        PlaybackState::Play | PlaybackState::Stall => EventType::Play,
        PlaybackState::Init => EventType::Ping,
    }
}

fn media_params(ctx: &MediaContext) -> Params {
    let info = ctx.media_info();
    let mut params = Params::new();
    params.insert(media::ID.into(), json!(info.id));
    params.insert(media::NAME.into(), json!(info.name));
    params.insert(media::LENGTH.into(), json!(info.length));
    // The backend calls the stream type content type, and the media type stream type
    params.insert(media::CONTENT_TYPE.into(), json!(info.stream_type));
    params.insert(media::STREAM_TYPE.into(), json!(info.media_type.as_str()));
    params.insert(media::RESUME.into(), json!(info.resumed));
    standard_params(ctx.media_metadata(), keys::STANDARD_MEDIA_METADATA, &mut params);
    params
}

fn standard_params(metadata: &Metadata, table: &[(&str, &'static str)], params: &mut Params) {
    for (key, value) in metadata {
        if let Some(param) = keys::standard_key(table, key) {
            params.insert(param.into(), json!(value));
        }
    }
}

fn custom_metadata(metadata: &Metadata, table: &[(&str, &'static str)]) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| keys::standard_key(table, key).is_none())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// QoE values are reported as integers
fn qoe_data(ctx: &MediaContext) -> Params {
    let mut data = Params::new();
    if let Some(info) = ctx.qoe_info() {
        data.insert(qoe::BITRATE.into(), json!(info.bitrate as i64));
        data.insert(qoe::DROPPED_FRAMES.into(), json!(info.dropped_frames as i64));
        data.insert(qoe::FPS.into(), json!(info.fps as i64));
        data.insert(qoe::TIME_TO_START.into(), json!(info.startup_time as i64));
    }
    data
}
