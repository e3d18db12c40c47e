//! MediaTrack Core - Client-side media analytics tracker
//!
//! This crate turns a stream of player events into analytics hits:
//! - Playback rules validating every event against the session state
//! - Hit generation with pings, QoE snapshots and session restarts
//! - Idle, session timeout, content start and preroll handling
//! - Real-time delivery, one request in flight per session
//! - Offline delivery of persisted sessions as batched reports
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MediaTrack Core                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │   TrackerEvent ──► ┌──────────────┐   ┌──────────────┐       │
//! │                    │   Tracker    │──►│    Rule      │       │
//! │                    │              │   │   Engine     │       │
//! │                    └──────┬───────┘   └──────────────┘       │
//! │                           │                                  │
//! │                    ┌──────┴───────┐   ┌──────────────┐       │
//! │                    │     Hit      │──►│    Media     │       │
//! │                    │  Generator   │   │   Context    │       │
//! │                    └──────┬───────┘   └──────────────┘       │
//! │                           │ HitProcessor                     │
//! │              ┌────────────┴────────────┐                     │
//! │       ┌──────┴───────┐          ┌──────┴───────┐             │
//! │       │  Real-time   │          │   Offline    │──► HitStore │
//! │       │   Service    │          │   Service    │             │
//! │       └──────┬───────┘          └──────┬───────┘             │
//! │              └──────── Transport ──────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod generator;
pub mod hit;
pub mod keys;
pub mod network;
pub mod offline;
pub mod processor;
pub mod realtime;
pub mod report;
pub mod rules;
pub mod session_ids;
pub mod store;
pub mod timer;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use analytics::MediaAnalytics;
pub use config::{MediaState, SharedMediaState, TrackerConfig};
pub use context::{MediaContext, PlaybackState};
pub use error::{Error, Result};
pub use event::TrackerEvent;
pub use hit::{EventType, Hit};
pub use network::{HttpRequest, HttpResponse, HttpTransport, Transport};
pub use offline::OfflineService;
pub use processor::{DisabledProcessor, HitProcessor, RecordingProcessor};
pub use realtime::{RealTimeService, SessionCreated};
pub use rules::{RuleName, RuleResponse};
pub use session_ids::{SessionIdManager, SessionState};
pub use store::{HitStore, MemoryHitStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteHitStore;
pub use tracker::Tracker;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracker library
pub fn init() {
    tracing::info!(version = VERSION, "MediaTrack Core initialized");
}
