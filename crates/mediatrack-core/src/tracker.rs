//! Event orchestration for one caller-visible tracking session
//!
//! The [`Tracker`] resolves inbound [`TrackerEvent`]s to rules, runs them
//! through the rule table against the playback state machine and drives the
//! hit generator. On top of the rule table it applies:
//! - preroll deferral, queueing rules until the preroll window closes
//! - idle detection, aborting the internal session after 30 idle minutes
//! - a 24 hour session timeout, restarting the internal session
//! - a content start ping once main content has played for one second

use crate::config::TrackerConfig;
use crate::context::{MediaContext, PlaybackState};
use crate::event::{clean_metadata, TrackerEvent};
use crate::generator::HitGenerator;
use crate::processor::HitProcessor;
use crate::rules::{Rule, RuleContext, RuleEngine, RuleName, RuleResponse};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Media idle time after which the internal session is aborted
pub const IDLE_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Continuous session time after which the internal session is restarted
pub const SESSION_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1000;

/// Main content play time before the content start ping
pub const CONTENT_START_DURATION_MS: i64 = 1000;

/// Response message for an unknown event name
pub const INVALID_EVENT_NAME: &str = "Invalid event name passed in track event data";

/// Response message for an event without timestamp
pub const MISSING_TIMESTAMP: &str = "Event timestamp is missing in track event data";

/// Rule violation messages
pub mod messages {
    pub const NOT_IN_MEDIA: &str = "Media tracker is not in tracking session, call 'API:trackSessionStart' to begin a new tracking session.";
    pub const IN_MEDIA: &str = "Media tracker is in active tracking session, call 'API:trackSessionEnd' or 'API:trackComplete' to end current tracking session.";
    pub const IN_BUFFER: &str = "Media tracker is tracking buffer events, call 'API:trackEvent(BufferComplete)' first to stop tracking buffer events.";
    pub const NOT_IN_BUFFER: &str = "Media tracker is not tracking buffer events, call 'API:trackEvent(BufferStart)' before 'API:trackEvent(BufferComplete)'.";
    pub const IN_SEEK: &str = "Media tracker is tracking seek events, call 'API:trackEvent(SeekComplete)' first to stop tracking seek events.";
    pub const NOT_IN_SEEK: &str = "Media tracker is not tracking seek events, call 'API:trackEvent(SeekStart)' before 'API:trackEvent(SeekComplete)'.";
    pub const NOT_IN_AD_BREAK: &str = "Media tracker is not tracking any AdBreak, call 'API:trackEvent(AdBreakStart)' to begin tracking AdBreak.";
    pub const NOT_IN_AD: &str = "Media tracker is not tracking any Ad, call 'API:trackEvent(AdStart)' to begin tracking Ad.";
    pub const NOT_IN_CHAPTER: &str = "Media tracker is not tracking any Chapter, call 'API:trackEvent(ChapterStart)' to begin tracking Chapter.";
    pub const INVALID_MEDIA_INFO: &str = "MediaInfo passed into 'API:trackSessionStart' is invalid.";
    pub const INVALID_AD_BREAK_INFO: &str = "AdBreakInfo passed into 'API:trackEvent(AdBreakStart)' is invalid.";
    pub const DUPLICATE_AD_BREAK_INFO: &str = "Media tracker is currently tracking the AdBreak passed into 'API:trackEvent(AdBreakStart)'.";
    pub const INVALID_AD_INFO: &str = "AdInfo passed into 'API:trackEvent(AdStart)' is invalid.";
    pub const DUPLICATE_AD_INFO: &str = "Media tracker is currently tracking the Ad passed into 'API:trackEvent(AdStart)'.";
    pub const INVALID_CHAPTER_INFO: &str = "ChapterInfo passed into 'API:trackEvent(ChapterStart)' is invalid.";
    pub const DUPLICATE_CHAPTER_INFO: &str = "Media tracker is currently tracking the Chapter passed into 'API:trackEvent(ChapterStart)'.";
    pub const INVALID_QOE_INFO: &str = "QoEInfo passed into 'API:updateQoEInfo' is invalid.";
    pub const INVALID_PLAYBACK_STATE: &str = "Media tracker is tracking an AdBreak but not tracking any Ad and will drop any calls to track playback state (Play, Pause, Buffer or Seek) in this state.";
    pub const INVALID_STATE_INFO: &str = "StateInfo passed into 'API:trackEvent(StateStart)' or 'API:trackEvent(StateEnd)' is invalid.";
    pub const IN_TRACKED_STATE: &str = "Media tracker is already tracking the State passed into 'API:trackEvent(StateStart)'.";
    pub const NOT_IN_TRACKED_STATE: &str = "Media tracker is not tracking the State passed into 'API:trackEvent(StateEnd)'.";
    pub const TRACKED_STATES_LIMIT_REACHED: &str = "Media tracker is already tracking maximum allowed states (10) per session.";
    pub const INVALID_ERROR_ID: &str = "ErrorId passed into 'API:trackError' is invalid. Please pass valid non-empty non-null string for ErrorId.";
}

/// Playback context and hit generator, created and dropped together
struct ActiveMedia {
    context: MediaContext,
    generator: HitGenerator,
}

/// State guarded by the rule table
struct TrackerState {
    processor: Arc<dyn HitProcessor>,
    config: TrackerConfig,
    media: Option<ActiveMedia>,
    /// Internal session aborted after the idle timeout
    tracker_idle: bool,
    media_idle: bool,
    media_idle_start_ts: i64,
    content_started: bool,
    content_start_ref_ts: Option<i64>,
    session_ref_ts: i64,
    in_preroll: bool,
    preroll_ref_ts: i64,
    preroll_queue: Vec<(RuleName, RuleContext)>,
}

impl TrackerState {
    fn context(&self) -> Option<&MediaContext> {
        self.media.as_ref().map(|media| &media.context)
    }

    fn active(&mut self) -> Option<(&mut MediaContext, &mut HitGenerator)> {
        self.media
            .as_mut()
            .map(|media| (&mut media.context, &mut media.generator))
    }

    fn detect_idle(&mut self, ts: i64) {
        let Some(media) = self.media.as_mut() else {
            return;
        };

        if media.context.is_idle() {
            let idle_ms = ts.saturating_sub(self.media_idle_start_ts);
            if self.media_idle && !self.tracker_idle && idle_ms >= IDLE_TIMEOUT_MS {
                info!(idle_ms, "Media idle timeout, aborting session");
                media.generator.process_session_abort(&media.context);
                self.tracker_idle = true;
            } else if !self.media_idle {
                self.media_idle = true;
                self.media_idle_start_ts = ts;
            }
        } else {
            if self.tracker_idle {
                info!("Playback resumed after idle timeout, restarting session");
                media.generator.process_session_restart(&media.context);
                self.tracker_idle = false;
                self.session_ref_ts = ts;
                self.content_started = false;
                self.content_start_ref_ts = None;
            }
            self.media_idle = false;
        }
    }

    fn detect_session_timeout(&mut self, ts: i64) {
        let Some(media) = self.media.as_mut() else {
            return;
        };

        if !self.tracker_idle && ts.saturating_sub(self.session_ref_ts) >= SESSION_TIMEOUT_MS {
            info!("Session timeout, restarting session");
            media.generator.process_session_abort(&media.context);
            media.generator.process_session_restart(&media.context);
            self.session_ref_ts = ts;
            self.content_started = false;
            self.content_start_ref_ts = None;
        }
    }

    fn detect_content_start(&mut self, ts: i64) {
        let Some(media) = self.media.as_mut() else {
            return;
        };

        if self.content_started {
            return;
        }

        if media.context.is_idle() || media.context.is_in_ad_break() {
            self.content_start_ref_ts = None;
            return;
        }

        let ref_ts = *self.content_start_ref_ts.get_or_insert(ts);
        if ts.saturating_sub(ref_ts) >= CONTENT_START_DURATION_MS {
            debug!("Main content started");
            media.generator.process_playback(&media.context, true);
            self.content_started = true;
        }
    }
}

/// Tracks one media session at a time from a stream of [`TrackerEvent`]s
///
/// Not synchronized: every call for one tracker must come from a single
/// owner. Independent trackers may run concurrently.
pub struct Tracker {
    engine: RuleEngine<TrackerState>,
    state: TrackerState,
}

impl Tracker {
    pub fn new(processor: Arc<dyn HitProcessor>, config: TrackerConfig) -> Self {
        Self {
            engine: rule_table(),
            state: TrackerState {
                processor,
                config,
                media: None,
                tracker_idle: false,
                media_idle: false,
                media_idle_start_ts: 0,
                content_started: false,
                content_start_ref_ts: None,
                session_ref_ts: 0,
                in_preroll: false,
                preroll_ref_ts: 0,
                preroll_queue: Vec::new(),
            },
        }
    }

    /// Track one event, returning whether it was accepted
    pub fn track(&mut self, event: &TrackerEvent) -> bool {
        self.track_event(event).valid
    }

    /// Track one event, returning the rule response
    ///
    /// Events deferred during the preroll window are always reported valid.
    pub fn track_event(&mut self, event: &TrackerEvent) -> RuleResponse {
        let Some(rule) = RuleName::from_event_name(&event.name) else {
            debug!(name = %event.name, "{}", INVALID_EVENT_NAME);
            return RuleResponse::invalid(INVALID_EVENT_NAME);
        };

        let Some(timestamp) = event.timestamp else {
            debug!(name = %event.name, "{}", MISSING_TIMESTAMP);
            return RuleResponse::invalid(MISSING_TIMESTAMP);
        };

        let context = RuleContext {
            timestamp,
            session_id: event.session_id.clone(),
            params: event.params.clone(),
            metadata: event.metadata.as_ref().map(clean_metadata),
        };

        if rule != RuleName::PlayheadUpdate {
            trace!(event = %event.name, timestamp, "Processing event");
        }

        if self.defer_preroll(rule, context.clone()) {
            return RuleResponse::ok();
        }

        self.process_rule(rule, &context)
    }

    pub fn has_active_session(&self) -> bool {
        self.state.media.is_some()
    }

    pub fn is_in_preroll(&self) -> bool {
        self.state.in_preroll
    }

    /// Internal session was aborted after the idle timeout
    pub fn is_idle(&self) -> bool {
        self.state.tracker_idle
    }

    /// Playback context of the active session
    pub fn media_context(&self) -> Option<&MediaContext> {
        self.state.context()
    }

    fn process_rule(&mut self, rule: RuleName, context: &RuleContext) -> RuleResponse {
        let response = self.engine.process(&mut self.state, rule, context);
        if !response.valid {
            let description = self.engine.rule(rule).map(Rule::description).unwrap_or_default();
            warn!(%rule, description, "{}", response.message);
        }
        response
    }

    /// Queue the rule while the preroll window is open
    ///
    /// Returns `true` when the rule was queued. Once the window closes the
    /// queue is replayed: every Play before the first AdBreakStart is dropped.
    fn defer_preroll(&mut self, rule: RuleName, context: RuleContext) -> bool {
        if !self.state.in_preroll {
            return false;
        }

        let Some(wait_ms) = self
            .state
            .context()
            .map(|ctx| ctx.media_info().preroll_wait_ms)
        else {
            return false;
        };

        let ts = context.timestamp;
        self.state.preroll_queue.push((rule, context));

        let window_closed = ts.saturating_sub(self.state.preroll_ref_ts) >= wait_ms;
        let forces_flush = matches!(
            rule,
            RuleName::AdBreakStart | RuleName::MediaComplete | RuleName::MediaSkip
        );

        if window_closed || forces_flush {
            let queued = reorder_preroll(std::mem::take(&mut self.state.preroll_queue));
            debug!(rules = queued.len(), "Flushing preroll queue");
            for (rule, context) in &queued {
                self.process_rule(*rule, context);
            }
            self.state.in_preroll = false;
        }

        true
    }
}

fn reorder_preroll(queue: Vec<(RuleName, RuleContext)>) -> Vec<(RuleName, RuleContext)> {
    let Some(first_ad_break) = queue
        .iter()
        .position(|(rule, _)| *rule == RuleName::AdBreakStart)
    else {
        return queue;
    };

    queue
        .into_iter()
        .enumerate()
        .filter(|(index, (rule, _))| *index > first_ad_break || *rule != RuleName::Play)
        .map(|(_, entry)| entry)
        .collect()
}

// =============================================================================
// Hooks
// =============================================================================

fn enter_hook(s: &mut TrackerState, _: RuleName, ctx: &RuleContext) -> bool {
    if let Some(media) = s.media.as_mut() {
        media.generator.set_ref_ts(ctx.timestamp);
    }
    true
}

fn exit_hook(s: &mut TrackerState, rule: RuleName, ctx: &RuleContext) -> bool {
    let Some(media) = s.media.as_mut() else {
        return false;
    };

    let context = &mut media.context;

    // The backend switches to play on adStart
    if rule == RuleName::AdStart
        && context.is_in_state(PlaybackState::Init)
        && !context.is_in_state(PlaybackState::Buffer)
        && !context.is_in_state(PlaybackState::Seek)
    {
        context.enter_state(PlaybackState::Play);
    }

    // Init can never be re-entered
    if matches!(rule, RuleName::BufferComplete | RuleName::SeekComplete)
        && context.is_in_state(PlaybackState::Init)
    {
        context.enter_state(PlaybackState::Pause);
    }

    s.detect_idle(ctx.timestamp);
    s.detect_session_timeout(ctx.timestamp);
    s.detect_content_start(ctx.timestamp);

    let flush = matches!(rule, RuleName::AdStart | RuleName::AdBreakComplete);
    if let Some(media) = s.media.as_mut() {
        media.generator.process_playback(&media.context, flush);
    }

    true
}

// =============================================================================
// Predicates
// =============================================================================

fn is_in_media(s: &TrackerState, _: &RuleContext) -> bool {
    s.media.is_some()
}

fn is_valid_media_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.media_info().is_some()
}

fn is_valid_ad_break_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.ad_break_info().is_some()
}

fn is_valid_ad_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.ad_info().is_some()
}

fn is_valid_chapter_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.chapter_info().is_some()
}

fn is_valid_qoe_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.qoe_info().is_some()
}

fn is_valid_state_info(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.state_info().is_some()
}

fn is_valid_error_id(_: &TrackerState, ctx: &RuleContext) -> bool {
    ctx.error_id().is_some_and(|id| !id.is_empty())
}

fn is_in_ad_break(s: &TrackerState, _: &RuleContext) -> bool {
    s.context().is_some_and(MediaContext::is_in_ad_break)
}

fn is_in_ad(s: &TrackerState, _: &RuleContext) -> bool {
    s.context().is_some_and(MediaContext::is_in_ad)
}

fn is_in_chapter(s: &TrackerState, _: &RuleContext) -> bool {
    s.context().is_some_and(MediaContext::is_in_chapter)
}

fn is_buffering(s: &TrackerState, _: &RuleContext) -> bool {
    s.context()
        .is_some_and(|c| c.is_in_state(PlaybackState::Buffer))
}

fn is_seeking(s: &TrackerState, _: &RuleContext) -> bool {
    s.context().is_some_and(|c| c.is_in_state(PlaybackState::Seek))
}

/// Playback calls are dropped inside an ad break until an ad starts
fn allow_playback_state_change(s: &TrackerState, _: &RuleContext) -> bool {
    s.context()
        .is_some_and(|c| !c.is_in_ad_break() || c.is_in_ad())
}

fn is_different_ad_break_info(s: &TrackerState, ctx: &RuleContext) -> bool {
    match s.context().and_then(MediaContext::ad_break_info) {
        Some(current) => ctx.ad_break_info().as_ref() != Some(current),
        None => true,
    }
}

fn is_different_ad_info(s: &TrackerState, ctx: &RuleContext) -> bool {
    match s.context().and_then(MediaContext::ad_info) {
        Some(current) => ctx.ad_info().as_ref() != Some(current),
        None => true,
    }
}

fn is_different_chapter_info(s: &TrackerState, ctx: &RuleContext) -> bool {
    match s.context().and_then(MediaContext::chapter_info) {
        Some(current) => ctx.chapter_info().as_ref() != Some(current),
        None => true,
    }
}

fn is_in_tracked_state(s: &TrackerState, ctx: &RuleContext) -> bool {
    match (s.context(), ctx.state_info()) {
        (Some(c), Some(state)) => c.is_state_active(&state),
        _ => false,
    }
}

fn allow_state_track(s: &TrackerState, ctx: &RuleContext) -> bool {
    match (s.context(), ctx.state_info()) {
        (Some(c), Some(state)) => c.has_tracked_state(&state) || !c.has_reached_state_limit(),
        _ => false,
    }
}

// =============================================================================
// Actions
// =============================================================================

fn cmd_media_start(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let Some(media_info) = ctx.media_info() else {
        return false;
    };

    let context = MediaContext::new(media_info, ctx.metadata.clone().unwrap_or_default());
    let mut generator = HitGenerator::new(
        s.processor.clone(),
        s.config.clone(),
        ctx.timestamp,
        ctx.session_id.clone(),
    );
    generator.process_media_start(&context, false);

    s.tracker_idle = false;
    s.media_idle = false;
    s.content_started = false;
    s.content_start_ref_ts = None;
    s.session_ref_ts = ctx.timestamp;
    s.in_preroll = context.media_info().preroll_wait_ms > 0;
    s.preroll_ref_ts = ctx.timestamp;
    s.preroll_queue.clear();
    s.media = Some(ActiveMedia { context, generator });
    true
}

fn cmd_media_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    if let Some(mut media) = s.media.take() {
        media.generator.process_media_complete(&media.context);
    }
    true
}

fn cmd_media_skip(s: &mut TrackerState, _: &RuleContext) -> bool {
    if let Some(mut media) = s.media.take() {
        media.generator.process_media_skip(&media.context);
    }
    true
}

fn cmd_ad_break_start(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(info)) = (s.active(), ctx.ad_break_info()) else {
        return false;
    };
    context.set_ad_break_info(&info);
    generator.process_ad_break_start(context);
    true
}

fn cmd_ad_break_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    generator.process_ad_break_complete(context);
    context.clear_ad_break_info();
    true
}

fn cmd_ad_break_skip(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    if context.is_in_ad_break() {
        generator.process_ad_break_skip(context);
        context.clear_ad_break_info();
    }
    true
}

fn cmd_ad_start(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(info)) = (s.active(), ctx.ad_info()) else {
        return false;
    };
    context.set_ad_info(&info, ctx.metadata.as_ref());
    generator.process_ad_start(context);
    true
}

fn cmd_ad_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    generator.process_ad_complete(context);
    context.clear_ad_info();
    true
}

fn cmd_ad_skip(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    if context.is_in_ad() {
        generator.process_ad_skip(context);
        context.clear_ad_info();
    }
    true
}

fn cmd_chapter_start(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(info)) = (s.active(), ctx.chapter_info()) else {
        return false;
    };
    context.set_chapter_info(&info, ctx.metadata.as_ref());
    generator.process_chapter_start(context);
    true
}

fn cmd_chapter_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    generator.process_chapter_complete(context);
    context.clear_chapter_info();
    true
}

fn cmd_chapter_skip(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    if context.is_in_chapter() {
        generator.process_chapter_skip(context);
        context.clear_chapter_info();
    }
    true
}

fn enter_playback_state(s: &mut TrackerState, state: PlaybackState) -> bool {
    let Some((context, _)) = s.active() else {
        return false;
    };
    context.enter_state(state);
    true
}

fn exit_playback_state(s: &mut TrackerState, state: PlaybackState) -> bool {
    let Some((context, _)) = s.active() else {
        return false;
    };
    if context.is_in_state(state) {
        context.exit_state(state);
    }
    true
}

fn cmd_play(s: &mut TrackerState, _: &RuleContext) -> bool {
    enter_playback_state(s, PlaybackState::Play)
}

fn cmd_pause(s: &mut TrackerState, _: &RuleContext) -> bool {
    enter_playback_state(s, PlaybackState::Pause)
}

fn cmd_buffer_start(s: &mut TrackerState, _: &RuleContext) -> bool {
    enter_playback_state(s, PlaybackState::Buffer)
}

fn cmd_buffer_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    exit_playback_state(s, PlaybackState::Buffer)
}

fn cmd_seek_start(s: &mut TrackerState, _: &RuleContext) -> bool {
    enter_playback_state(s, PlaybackState::Seek)
}

fn cmd_seek_complete(s: &mut TrackerState, _: &RuleContext) -> bool {
    exit_playback_state(s, PlaybackState::Seek)
}

fn cmd_error(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(error_id)) = (s.active(), ctx.error_id()) else {
        return false;
    };
    generator.process_error(context, error_id);
    true
}

fn cmd_bitrate_change(s: &mut TrackerState, _: &RuleContext) -> bool {
    let Some((context, generator)) = s.active() else {
        return false;
    };
    generator.process_bitrate_change(context);
    true
}

fn cmd_qoe_update(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, _)), Some(info)) = (s.active(), ctx.qoe_info()) else {
        return false;
    };
    context.set_qoe_info(&info);
    true
}

fn cmd_playhead_update(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let Some((context, _)) = s.active() else {
        return false;
    };
    if let Some(playhead) = ctx.playhead().filter(|p| *p >= 0.0) {
        context.set_playhead(playhead);
    }
    true
}

fn cmd_state_start(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(state)) = (s.active(), ctx.state_info()) else {
        return false;
    };
    context.start_state(&state);
    generator.process_state_start(context, &state);
    true
}

fn cmd_state_end(s: &mut TrackerState, ctx: &RuleContext) -> bool {
    let (Some((context, generator)), Some(state)) = (s.active(), ctx.state_info()) else {
        return false;
    };
    context.end_state(&state);
    generator.process_state_end(context, &state);
    true
}

// =============================================================================
// Rule table
// =============================================================================

fn rule_table() -> RuleEngine<TrackerState> {
    use messages::*;
    use RuleName::*;

    let mut engine = RuleEngine::new();
    engine.on_enter(enter_hook);
    engine.on_exit(exit_hook);

    let rules = [
        Rule::new(MediaStart, "API::trackSessionStart")
            .predicate(is_in_media, false, IN_MEDIA)
            .predicate(is_valid_media_info, true, INVALID_MEDIA_INFO)
            .action(cmd_media_start),
        Rule::new(MediaComplete, "API::trackSessionComplete")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .action(cmd_ad_skip)
            .action(cmd_ad_break_skip)
            .action(cmd_chapter_skip)
            .action(cmd_media_complete),
        Rule::new(MediaSkip, "API::trackSessionEnd")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .action(cmd_ad_skip)
            .action(cmd_ad_break_skip)
            .action(cmd_chapter_skip)
            .action(cmd_media_skip),
        Rule::new(Error, "API::trackError")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_error_id, true, INVALID_ERROR_ID)
            .action(cmd_error),
        Rule::new(Play, "API::trackPlay")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .action(cmd_seek_complete)
            .action(cmd_buffer_complete)
            .action(cmd_play),
        Rule::new(Pause, "API::trackPause")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .predicate(is_buffering, false, IN_BUFFER)
            .predicate(is_seeking, false, IN_SEEK)
            .action(cmd_seek_complete)
            .action(cmd_buffer_complete)
            .action(cmd_pause),
        Rule::new(BufferStart, "API::trackEvent(BufferStart)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .predicate(is_buffering, false, IN_BUFFER)
            .predicate(is_seeking, false, IN_SEEK)
            .action(cmd_buffer_start),
        Rule::new(BufferComplete, "API::trackEvent(BufferComplete)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .predicate(is_buffering, true, NOT_IN_BUFFER)
            .action(cmd_buffer_complete),
        Rule::new(SeekStart, "API::trackEvent(SeekStart)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .predicate(is_seeking, false, IN_SEEK)
            .predicate(is_buffering, false, IN_BUFFER)
            .action(cmd_seek_start),
        Rule::new(SeekComplete, "API::trackEvent(SeekComplete)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(allow_playback_state_change, true, INVALID_PLAYBACK_STATE)
            .predicate(is_seeking, true, NOT_IN_SEEK)
            .action(cmd_seek_complete),
        Rule::new(AdBreakStart, "API::trackEvent(AdBreakStart)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_ad_break_info, true, INVALID_AD_BREAK_INFO)
            .predicate(is_different_ad_break_info, true, DUPLICATE_AD_BREAK_INFO)
            .action(cmd_ad_skip)
            .action(cmd_ad_break_skip)
            .action(cmd_ad_break_start),
        Rule::new(AdBreakComplete, "API::trackEvent(AdBreakComplete)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_ad_break, true, NOT_IN_AD_BREAK)
            .action(cmd_ad_skip)
            .action(cmd_ad_break_complete),
        Rule::new(AdStart, "API::trackEvent(AdStart)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_ad_break, true, NOT_IN_AD_BREAK)
            .predicate(is_valid_ad_info, true, INVALID_AD_INFO)
            .predicate(is_different_ad_info, true, DUPLICATE_AD_INFO)
            .action(cmd_ad_skip)
            .action(cmd_ad_start),
        Rule::new(AdComplete, "API::trackEvent(AdComplete)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_ad_break, true, NOT_IN_AD_BREAK)
            .predicate(is_in_ad, true, NOT_IN_AD)
            .action(cmd_ad_complete),
        Rule::new(AdSkip, "API::trackEvent(AdSkip)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_ad_break, true, NOT_IN_AD_BREAK)
            .predicate(is_in_ad, true, NOT_IN_AD)
            .action(cmd_ad_skip),
        Rule::new(ChapterStart, "API::trackEvent(ChapterStart)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_chapter_info, true, INVALID_CHAPTER_INFO)
            .predicate(is_different_chapter_info, true, DUPLICATE_CHAPTER_INFO)
            .action(cmd_chapter_skip)
            .action(cmd_chapter_start),
        Rule::new(ChapterComplete, "API::trackEvent(ChapterComplete)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_chapter, true, NOT_IN_CHAPTER)
            .action(cmd_chapter_complete),
        Rule::new(ChapterSkip, "API::trackEvent(ChapterSkip)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_in_chapter, true, NOT_IN_CHAPTER)
            .action(cmd_chapter_skip),
        Rule::new(BitrateChange, "API::trackEvent(BitrateChange)")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .action(cmd_bitrate_change),
        Rule::new(QoEUpdate, "API::updateQoEInfo")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_qoe_info, true, INVALID_QOE_INFO)
            .action(cmd_qoe_update),
        Rule::new(PlayheadUpdate, "API::updatePlayhead")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .action(cmd_playhead_update),
        Rule::new(StateStart, "API::stateStart")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_state_info, true, INVALID_STATE_INFO)
            .predicate(is_in_tracked_state, false, IN_TRACKED_STATE)
            .predicate(allow_state_track, true, TRACKED_STATES_LIMIT_REACHED)
            .action(cmd_state_start),
        Rule::new(StateEnd, "API::stateEnd")
            .predicate(is_in_media, true, NOT_IN_MEDIA)
            .predicate(is_valid_state_info, true, INVALID_STATE_INFO)
            .predicate(is_in_tracked_state, true, NOT_IN_TRACKED_STATE)
            .action(cmd_state_end),
    ];

    for rule in rules {
        engine.add_rule(rule);
    }

    engine
}
