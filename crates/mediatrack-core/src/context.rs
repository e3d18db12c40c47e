//! Playback state machine
//!
//! Holds everything known about the media being tracked: the exclusive play
//! state, the buffering/seeking overlays, the active ad break, ad and chapter
//! with their metadata, the last QoE snapshot, named custom states and the
//! playhead. Pure in-memory state, no I/O.

use crate::types::{AdBreakInfo, AdInfo, ChapterInfo, MediaInfo, Metadata, QoEInfo, StateInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Maximum distinct named states per session
pub const STATE_LIMIT: usize = 10;

/// Playback state
///
/// `Play`, `Pause` and `Stall` are exclusive. `Buffer` and `Seek` are
/// overlays that can be set on top of any exclusive state. `Init` is the
/// initial state and can never be re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Init,
    Play,
    Pause,
    Buffer,
    Seek,
    Stall,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Init => write!(f, "Init"),
            PlaybackState::Play => write!(f, "Play"),
            PlaybackState::Pause => write!(f, "Pause"),
            PlaybackState::Buffer => write!(f, "Buffer"),
            PlaybackState::Seek => write!(f, "Seek"),
            PlaybackState::Stall => write!(f, "Stall"),
        }
    }
}

/// Tracking state for one media session
#[derive(Debug, Clone)]
pub struct MediaContext {
    media_info: MediaInfo,
    media_metadata: Metadata,
    ad_break_info: Option<AdBreakInfo>,
    ad_info: Option<AdInfo>,
    ad_metadata: Metadata,
    chapter_info: Option<ChapterInfo>,
    chapter_metadata: Metadata,
    qoe_info: Option<QoEInfo>,
    play_state: PlaybackState,
    buffering: bool,
    seeking: bool,
    playhead: f64,
    /// Named states seen this session, value is the active flag
    states: BTreeMap<String, bool>,
}

impl MediaContext {
    pub fn new(media_info: MediaInfo, metadata: Metadata) -> Self {
        Self {
            media_info,
            media_metadata: metadata,
            ad_break_info: None,
            ad_info: None,
            ad_metadata: Metadata::new(),
            chapter_info: None,
            chapter_metadata: Metadata::new(),
            qoe_info: None,
            play_state: PlaybackState::Init,
            buffering: false,
            seeking: false,
            playhead: 0.0,
            states: BTreeMap::new(),
        }
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn media_metadata(&self) -> &Metadata {
        &self.media_metadata
    }

    // =========================================================================
    // Ad break / ad / chapter
    // =========================================================================

    pub fn is_in_ad_break(&self) -> bool {
        self.ad_break_info.is_some()
    }

    pub fn is_in_ad(&self) -> bool {
        self.ad_info.is_some()
    }

    pub fn is_in_chapter(&self) -> bool {
        self.chapter_info.is_some()
    }

    pub fn ad_break_info(&self) -> Option<&AdBreakInfo> {
        self.ad_break_info.as_ref()
    }

    pub fn ad_info(&self) -> Option<&AdInfo> {
        self.ad_info.as_ref()
    }

    pub fn ad_metadata(&self) -> &Metadata {
        &self.ad_metadata
    }

    pub fn chapter_info(&self) -> Option<&ChapterInfo> {
        self.chapter_info.as_ref()
    }

    pub fn chapter_metadata(&self) -> &Metadata {
        &self.chapter_metadata
    }

    pub fn set_ad_break_info(&mut self, info: &AdBreakInfo) {
        self.ad_break_info = Some(info.clone());
    }

    pub fn clear_ad_break_info(&mut self) {
        self.ad_break_info = None;
    }

    /// Metadata is replaced wholesale, `None` keeps the previous map
    pub fn set_ad_info(&mut self, info: &AdInfo, metadata: Option<&Metadata>) {
        self.ad_info = Some(info.clone());
        if let Some(metadata) = metadata {
            self.ad_metadata = metadata.clone();
        }
    }

    pub fn clear_ad_info(&mut self) {
        self.ad_info = None;
        self.ad_metadata.clear();
    }

    pub fn set_chapter_info(&mut self, info: &ChapterInfo, metadata: Option<&Metadata>) {
        self.chapter_info = Some(info.clone());
        if let Some(metadata) = metadata {
            self.chapter_metadata = metadata.clone();
        }
    }

    pub fn clear_chapter_info(&mut self) {
        self.chapter_info = None;
        self.chapter_metadata.clear();
    }

    // =========================================================================
    // QoE / playhead
    // =========================================================================

    pub fn qoe_info(&self) -> Option<&QoEInfo> {
        self.qoe_info.as_ref()
    }

    pub fn set_qoe_info(&mut self, info: &QoEInfo) {
        self.qoe_info = Some(info.clone());
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn set_playhead(&mut self, playhead: f64) {
        self.playhead = playhead;
    }

    // =========================================================================
    // Playback state
    // =========================================================================

    pub fn enter_state(&mut self, state: PlaybackState) {
        trace!(%state, "Enter playback state");
        match state {
            PlaybackState::Play | PlaybackState::Pause | PlaybackState::Stall => {
                self.play_state = state;
            }
            PlaybackState::Buffer => self.buffering = true,
            PlaybackState::Seek => self.seeking = true,
            PlaybackState::Init => trace!("Ignoring attempt to re-enter Init"),
        }
    }

    /// Only the overlays can be exited
    pub fn exit_state(&mut self, state: PlaybackState) {
        trace!(%state, "Exit playback state");
        match state {
            PlaybackState::Buffer => self.buffering = false,
            PlaybackState::Seek => self.seeking = false,
            _ => trace!(%state, "Ignoring exit of exclusive state"),
        }
    }

    pub fn is_in_state(&self, state: PlaybackState) -> bool {
        match state {
            PlaybackState::Init
            | PlaybackState::Play
            | PlaybackState::Pause
            | PlaybackState::Stall => self.play_state == state,
            PlaybackState::Buffer => self.buffering,
            PlaybackState::Seek => self.seeking,
        }
    }

    /// Anything but a clean, unbuffered, unseeking Play
    pub fn is_idle(&self) -> bool {
        !self.is_in_state(PlaybackState::Play)
            || self.is_in_state(PlaybackState::Buffer)
            || self.is_in_state(PlaybackState::Seek)
    }

    // =========================================================================
    // Named states
    // =========================================================================

    /// Fails when the state is already active, or when it is new and the
    /// session has already seen [`STATE_LIMIT`] distinct names.
    pub fn start_state(&mut self, state: &StateInfo) -> bool {
        if !self.has_tracked_state(state) && self.has_reached_state_limit() {
            trace!(state = %state.name, limit = STATE_LIMIT, "Named state limit reached");
            return false;
        }

        if self.is_state_active(state) {
            trace!(state = %state.name, "Named state already active");
            return false;
        }

        self.states.insert(state.name.clone(), true);
        true
    }

    /// Deactivates the state. The name still counts against the limit.
    pub fn end_state(&mut self, state: &StateInfo) -> bool {
        if !self.is_state_active(state) {
            trace!(state = %state.name, "Named state not active");
            return false;
        }

        self.states.insert(state.name.clone(), false);
        true
    }

    pub fn is_state_active(&self, state: &StateInfo) -> bool {
        self.states.get(&state.name).copied().unwrap_or(false)
    }

    pub fn has_tracked_state(&self, state: &StateInfo) -> bool {
        self.states.contains_key(&state.name)
    }

    pub fn has_reached_state_limit(&self) -> bool {
        self.states.len() >= STATE_LIMIT
    }

    pub fn active_states(&self) -> Vec<StateInfo> {
        self.states
            .iter()
            .filter(|(_, active)| **active)
            .map(|(name, _)| StateInfo { name: name.clone() })
            .collect()
    }

    /// Forget every named state, freeing the whole limit
    pub fn clear_states(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;

    fn context() -> MediaContext {
        let info = MediaInfo {
            id: "id".into(),
            name: "name".into(),
            stream_type: "vod".into(),
            media_type: MediaType::Video,
            length: 60.0,
            resumed: false,
            preroll_wait_ms: 0,
            granular_ad_tracking: false,
        };
        MediaContext::new(info, Metadata::new())
    }

    fn state(name: &str) -> StateInfo {
        StateInfo::new(name).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let ctx = context();
        assert!(ctx.is_in_state(PlaybackState::Init));
        assert!(ctx.is_idle());
        assert_eq!(ctx.playhead(), 0.0);
    }

    #[test]
    fn test_init_is_never_reentered() {
        let mut ctx = context();
        ctx.enter_state(PlaybackState::Play);
        ctx.enter_state(PlaybackState::Init);
        assert!(ctx.is_in_state(PlaybackState::Play));
        assert!(!ctx.is_in_state(PlaybackState::Init));

        ctx.exit_state(PlaybackState::Play);
        assert!(ctx.is_in_state(PlaybackState::Play));
    }

    #[test]
    fn test_overlays_are_independent() {
        let mut ctx = context();
        ctx.enter_state(PlaybackState::Pause);
        ctx.enter_state(PlaybackState::Buffer);
        ctx.enter_state(PlaybackState::Seek);
        assert!(ctx.is_in_state(PlaybackState::Pause));
        assert!(ctx.is_in_state(PlaybackState::Buffer));
        assert!(ctx.is_in_state(PlaybackState::Seek));

        ctx.exit_state(PlaybackState::Buffer);
        assert!(!ctx.is_in_state(PlaybackState::Buffer));
        assert!(ctx.is_in_state(PlaybackState::Seek));
    }

    #[test]
    fn test_is_idle_truth_table() {
        let exclusive = [
            None,
            Some(PlaybackState::Play),
            Some(PlaybackState::Pause),
            Some(PlaybackState::Stall),
        ];
        for play_state in exclusive {
            for buffering in [false, true] {
                for seeking in [false, true] {
                    let mut ctx = context();
                    if let Some(s) = play_state {
                        ctx.enter_state(s);
                    }
                    if buffering {
                        ctx.enter_state(PlaybackState::Buffer);
                    }
                    if seeking {
                        ctx.enter_state(PlaybackState::Seek);
                    }
                    let playing = play_state == Some(PlaybackState::Play);
                    let expected = !playing || buffering || seeking;
                    assert_eq!(
                        ctx.is_idle(),
                        expected,
                        "state={:?} buffering={} seeking={}",
                        play_state,
                        buffering,
                        seeking
                    );
                }
            }
        }
    }

    #[test]
    fn test_state_limit() {
        let mut ctx = context();
        for i in 0..STATE_LIMIT {
            assert!(ctx.start_state(&state(&format!("state{}", i))));
        }
        assert!(ctx.has_reached_state_limit());
        assert!(!ctx.start_state(&state("eleventh")));

        // Ending does not free a slot
        assert!(ctx.end_state(&state("state0")));
        assert!(!ctx.start_state(&state("eleventh")));

        // A name already seen can be restarted
        assert!(ctx.start_state(&state("state0")));

        ctx.clear_states();
        assert!(ctx.start_state(&state("eleventh")));
    }

    #[test]
    fn test_start_end_state() {
        let mut ctx = context();
        let mute = state("mute");
        assert!(!ctx.end_state(&mute));
        assert!(ctx.start_state(&mute));
        assert!(!ctx.start_state(&mute));
        assert_eq!(ctx.active_states(), vec![mute.clone()]);
        assert!(ctx.end_state(&mute));
        assert!(ctx.active_states().is_empty());
        assert!(ctx.has_tracked_state(&mute));
    }

    #[test]
    fn test_ad_metadata_replaced_and_cleared() {
        let mut ctx = context();
        let ad = AdInfo { id: "a".into(), name: "ad".into(), position: 1, length: 10.0 };
        let mut metadata = Metadata::new();
        metadata.insert("k".into(), "v".into());

        ctx.set_ad_info(&ad, Some(&metadata));
        metadata.insert("later".into(), "x".into());
        assert_eq!(ctx.ad_metadata().len(), 1);
        assert_eq!(ctx.ad_info(), Some(&ad));

        ctx.clear_ad_info();
        assert!(!ctx.is_in_ad());
        assert!(ctx.ad_metadata().is_empty());
    }
}
