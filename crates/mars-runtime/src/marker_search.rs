//! Starting-room discovery through reference markers.
//!
//! Before a session exists the user's room is unknown.  [`MarkerSearch`]
//! asks the tracking provider to look for every marker in the building; the
//! first recognized marker names the room the session starts in.

use std::sync::Arc;

use mars_spatial::graph::Building;
use mars_types::MarsError;
use tracing::{info, warn};

use crate::config::LocalizationConfig;
use crate::provider::TrackingProvider;
use crate::session::LocalizationSession;

/// A pending search for the starting room.
pub struct MarkerSearch {
    building: Arc<Building>,
    provider: Option<Box<dyn TrackingProvider>>,
    config: LocalizationConfig,
}

impl std::fmt::Debug for MarkerSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerSearch")
            .field("building", &self.building.name())
            .field("finished", &self.provider.is_none())
            .finish()
    }
}

impl MarkerSearch {
    /// Configure `provider` to look for every marker of `building`.
    pub fn start(
        building: Arc<Building>,
        mut provider: Box<dyn TrackingProvider>,
        config: LocalizationConfig,
    ) -> Result<Self, MarsError> {
        config.validate()?;
        let markers = building.markers();
        if markers.is_empty() {
            warn!(building = building.name(), "building declares no reference markers");
        }
        provider.configure_for_marker_search(&markers)?;
        info!(building = building.name(), markers = markers.len(), "marker search started");
        Ok(Self {
            building,
            provider: Some(provider),
            config,
        })
    }

    /// True once a session has been created from this search.
    pub fn is_finished(&self) -> bool {
        self.provider.is_none()
    }

    /// The provider recognized `marker`: start a session in its room.
    ///
    /// An unknown marker leaves the search running.
    pub fn on_marker_recognized(&mut self, marker: &str) -> Result<LocalizationSession, MarsError> {
        if self.building.room_for_marker(marker).is_none() {
            warn!(marker, "recognized marker does not belong to this building");
            return Err(MarsError::UnknownMarker(marker.to_string()));
        }
        let provider = self
            .provider
            .take()
            .ok_or_else(|| MarsError::Provider("marker search already finished".to_string()))?;
        info!(marker, "reference marker recognized");
        LocalizationSession::from_marker(Arc::clone(&self.building), marker, provider, self.config.clone())
    }
}
