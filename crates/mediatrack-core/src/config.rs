//! Tracker and collection configuration

use crate::types::PrivacyStatus;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Per-tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Channel reported on sessionStart, overrides the shared channel
    pub channel: Option<String>,
    /// Content was downloaded and is played offline
    pub downloaded_content: bool,
}

/// Configuration and device state shared by every tracker and service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaState {
    /// Current privacy status
    pub privacy_status: PrivacyStatus,
    /// Whether the device currently has connectivity
    pub network_available: bool,
    /// Media collection endpoint host
    pub collection_server: Option<String>,
    /// Default channel
    pub channel: Option<String>,
    /// Player name reported with every session
    pub player_name: Option<String>,
    /// Host application version
    pub app_version: Option<String>,
    /// Debug session integration id, sent as a validation token
    pub assurance_integration_id: Option<String>,
    /// Analytics tracking server
    pub analytics_tracking_server: Option<String>,
    /// Analytics report suite
    pub analytics_report_suite: Option<String>,
    /// Analytics visitor id
    pub analytics_visitor_id: Option<String>,
    /// Analytics legacy aid
    pub analytics_aid: Option<String>,
    /// Organization id
    pub org_id: Option<String>,
    /// Visitor (experience cloud) id
    pub visitor_id: Option<String>,
    /// Audience location hint
    pub location_hint: Option<i64>,
    /// Report over TLS
    pub ssl: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            privacy_status: PrivacyStatus::Unknown,
            network_available: true,
            collection_server: None,
            channel: None,
            player_name: None,
            app_version: None,
            assurance_integration_id: None,
            analytics_tracking_server: None,
            analytics_report_suite: None,
            analytics_visitor_id: None,
            analytics_aid: None,
            org_id: None,
            visitor_id: None,
            location_hint: None,
            ssl: true,
        }
    }
}

impl MediaState {
    /// Name of the first required tracking setting that is missing
    pub fn missing_tracking_param(&self) -> Option<&'static str> {
        let required = [
            ("media.collectionServer", &self.collection_server),
            ("analytics.server", &self.analytics_tracking_server),
            ("analytics.rsids", &self.analytics_report_suite),
            ("experienceCloud.org", &self.org_id),
            ("mid", &self.visitor_id),
        ];

        required
            .into_iter()
            .find(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| name)
    }

    /// Privacy, connectivity and configuration all allow sending hits
    pub fn is_ready_to_send(&self) -> bool {
        if self.privacy_status != PrivacyStatus::OptIn {
            trace!(privacy = %self.privacy_status, "Not ready to send: privacy is not opted in");
            return false;
        }

        if !self.network_available {
            trace!("Not ready to send: no network connection");
            return false;
        }

        if let Some(missing) = self.missing_tracking_param() {
            trace!(missing, "Not ready to send: missing tracking configuration");
            return false;
        }

        true
    }
}

/// Handle to the shared [`MediaState`]
#[derive(Debug, Clone, Default)]
pub struct SharedMediaState(Arc<RwLock<MediaState>>);

impl SharedMediaState {
    pub fn new(state: MediaState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> MediaState {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn privacy_status(&self) -> PrivacyStatus {
        match self.0.read() {
            Ok(guard) => guard.privacy_status,
            Err(poisoned) => poisoned.into_inner().privacy_status,
        }
    }

    /// Apply a change to the shared state
    pub fn update(&self, f: impl FnOnce(&mut MediaState)) {
        match self.0.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
