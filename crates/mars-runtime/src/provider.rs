//! Seam to the external visual-tracking provider.
//!
//! MARS never talks to a tracking SDK directly.  The host implements
//! [`TrackingProvider`] and hands it to the session, which calls it whenever
//! the provider needs to look for different anchors.

use mars_spatial::graph::{ReferenceMarker, Room};
use mars_types::MarsError;

/// Commands the engine sends to the tracking provider.
///
/// # Contract
///
/// * `configure_for_room` – load the saved anchoring data of `room` so raw
///   poses are registered to that room's frame.  Called on session start and
///   on every room or floor switch.
/// * `configure_for_marker_search` – look for any of `markers` so the
///   starting room can be identified.
/// * `request_assisted_recovery` – ask the user to help re-localize (e.g. by
///   showing a coaching overlay).  Sent at most once per degraded period.
///
/// Failures are logged by the session and never abort a pose update.
pub trait TrackingProvider: Send {
    fn configure_for_room(&mut self, floor: &str, room: &Room) -> Result<(), MarsError>;

    fn configure_for_marker_search(&mut self, markers: &[ReferenceMarker]) -> Result<(), MarsError>;

    fn request_assisted_recovery(&mut self) -> Result<(), MarsError> {
        Ok(())
    }
}

/// One command received by a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCommand {
    ConfigureForRoom { floor: String, room: String },
    ConfigureForMarkerSearch { markers: Vec<String> },
    RequestAssistedRecovery,
}

/// Provider that records every command, for hosts running without a live
/// tracker (replays, tests).
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    commands: std::sync::Arc<std::sync::Mutex<Vec<ProviderCommand>>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every command received so far, by this provider or any of
    /// its clones.
    pub fn commands(&self) -> Vec<ProviderCommand> {
        match self.commands.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, command: ProviderCommand) {
        match self.commands.lock() {
            Ok(mut guard) => guard.push(command),
            Err(poisoned) => poisoned.into_inner().push(command),
        }
    }
}

impl TrackingProvider for RecordingProvider {
    fn configure_for_room(&mut self, floor: &str, room: &Room) -> Result<(), MarsError> {
        self.record(ProviderCommand::ConfigureForRoom {
            floor: floor.to_string(),
            room: room.name().to_string(),
        });
        Ok(())
    }

    fn configure_for_marker_search(&mut self, markers: &[ReferenceMarker]) -> Result<(), MarsError> {
        self.record(ProviderCommand::ConfigureForMarkerSearch {
            markers: markers.iter().map(|m| m.name.clone()).collect(),
        });
        Ok(())
    }

    fn request_assisted_recovery(&mut self) -> Result<(), MarsError> {
        self.record(ProviderCommand::RequestAssistedRecovery);
        Ok(())
    }
}
