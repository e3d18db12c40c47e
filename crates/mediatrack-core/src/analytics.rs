//! Library entry point
//!
//! [`MediaAnalytics`] owns the shared configuration and both delivery
//! services. Trackers created from it route hits to the offline service
//! for downloaded content and to the real-time service otherwise.

use crate::config::{MediaState, SharedMediaState, TrackerConfig};
use crate::error::{Error, Result};
use crate::network::Transport;
use crate::offline::OfflineService;
use crate::processor::{DisabledProcessor, HitProcessor};
use crate::realtime::{RealTimeService, SessionCreated};
use crate::store::HitStore;
use crate::tracker::Tracker;
use crate::types::PrivacyStatus;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

pub struct MediaAnalytics {
    state: SharedMediaState,
    realtime: Option<Arc<RealTimeService>>,
    offline: Option<Arc<OfflineService>>,
}

impl MediaAnalytics {
    /// Services run on the current tokio runtime
    ///
    /// Without a runtime every tracker is disabled. When the store could
    /// not be opened downloaded content is not tracked.
    pub fn new(
        state: MediaState,
        transport: Arc<dyn Transport>,
        store: Result<Box<dyn HitStore>>,
    ) -> Self {
        match Handle::try_current() {
            Ok(handle) => Self::with_handle(state, transport, store, handle, true),
            Err(_) => {
                error!(error = %Error::NoRuntime, "Media tracking disabled");
                Self {
                    state: SharedMediaState::new(state),
                    realtime: None,
                    offline: None,
                }
            }
        }
    }

    /// Without timers real-time sessions and offline reports only advance
    /// when driven by hand
    pub fn with_handle(
        state: MediaState,
        transport: Arc<dyn Transport>,
        store: Result<Box<dyn HitStore>>,
        handle: Handle,
        enable_timers: bool,
    ) -> Self {
        let state = SharedMediaState::new(state);

        let realtime = Arc::new(RealTimeService::with_options(
            state.clone(),
            transport.clone(),
            handle.clone(),
            enable_timers,
        ));

        let offline = store
            .and_then(|store| {
                OfflineService::new(state.clone(), transport, store, handle, enable_timers)
            })
            .map(Arc::new)
            .map_err(|e| {
                error!(error = %e, code = e.error_code(), "Offline tracking disabled, hit store unavailable");
            })
            .ok();

        info!(offline = offline.is_some(), "Media analytics ready");

        Self {
            state,
            realtime: Some(realtime),
            offline,
        }
    }

    pub fn shared_state(&self) -> SharedMediaState {
        self.state.clone()
    }

    pub fn realtime_service(&self) -> Option<&Arc<RealTimeService>> {
        self.realtime.as_ref()
    }

    pub fn offline_service(&self) -> Option<&Arc<OfflineService>> {
        self.offline.as_ref()
    }

    fn processors(&self) -> Vec<Arc<dyn HitProcessor>> {
        let mut processors: Vec<Arc<dyn HitProcessor>> = Vec::with_capacity(2);
        if let Some(realtime) = &self.realtime {
            processors.push(realtime.clone());
        }
        if let Some(offline) = &self.offline {
            processors.push(offline.clone());
        }
        processors
    }

    /// Tracker delivering through the service matching `config`
    #[instrument(skip(self))]
    pub fn create_tracker(&self, config: TrackerConfig) -> Tracker {
        let processor: Arc<dyn HitProcessor> = if config.downloaded_content {
            match &self.offline {
                Some(offline) => offline.clone(),
                None => Arc::new(DisabledProcessor),
            }
        } else {
            match &self.realtime {
                Some(realtime) => realtime.clone(),
                None => Arc::new(DisabledProcessor),
            }
        };

        Tracker::new(processor, config)
    }

    /// Notifications for sessions created by the collection server
    pub fn subscribe_sessions(&self) -> Option<broadcast::Receiver<SessionCreated>> {
        self.realtime.as_ref().map(|realtime| realtime.subscribe())
    }

    #[instrument(skip(self))]
    pub fn set_privacy_status(&self, status: PrivacyStatus) {
        self.state.update(|state| state.privacy_status = status);
        info!(privacy = %status, "Privacy status changed");
        for processor in self.processors() {
            processor.notify_privacy_change();
        }
    }

    /// Apply a configuration change, then let the services react to it
    pub fn update_configuration(&self, f: impl FnOnce(&mut MediaState)) {
        self.state.update(f);
        for processor in self.processors() {
            processor.notify_privacy_change();
        }
    }

    /// Drop every session and unsent hit
    pub fn reset(&self) {
        for processor in self.processors() {
            processor.reset();
        }
    }

    /// Stop background work
    pub fn destroy(&self) {
        for processor in self.processors() {
            processor.destroy();
        }
    }
}
