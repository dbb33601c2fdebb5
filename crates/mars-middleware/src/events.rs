//! Notification payloads emitted by a localization session.

use chrono::{DateTime, Utc};
use mars_spatial::transform::RigidTransform;
use mars_types::{IntegrityWarning, TrackingState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened during a pose update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LocationEvent {
    /// Emitted once per accepted pose sample.
    LocationUpdated {
        floor: String,
        room: String,
        /// `None` while the active room has no alignment and no floor pose
        /// was ever computed.
        floor_pose: Option<RigidTransform>,
        room_pose: RigidTransform,
        tracking_state: TrackingState,
    },
    RoomChanged {
        floor: String,
        from: String,
        to: String,
    },
    FloorChanged {
        from_floor: String,
        from_room: String,
        to_floor: String,
        to_room: String,
    },
    /// The session asked the provider for user-assisted recovery.
    AssistedRecoveryRequested { floor: String, room: String },
    Warning(IntegrityWarning),
}

/// Discriminant of [`LocationEvent`], used to filter bus subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LocationUpdated,
    RoomChanged,
    FloorChanged,
    AssistedRecoveryRequested,
    Warning,
}

impl LocationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LocationUpdated { .. } => EventKind::LocationUpdated,
            Self::RoomChanged { .. } => EventKind::RoomChanged,
            Self::FloorChanged { .. } => EventKind::FloorChanged,
            Self::AssistedRecoveryRequested { .. } => EventKind::AssistedRecoveryRequested,
            Self::Warning(_) => EventKind::Warning,
        }
    }
}

/// Envelope delivered to observers and bus subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Session that produced the event.
    pub session: Uuid,
    pub event: LocationEvent,
}

impl Notification {
    pub fn new(session: Uuid, event: LocationEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session,
            event,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_serializes_with_tagged_event() {
        let n = Notification::new(
            Uuid::new_v4(),
            LocationEvent::RoomChanged {
                floor: "F1".into(),
                from: "Hall".into(),
                to: "Kitchen".into(),
            },
        );
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"type\":\"RoomChanged\""));
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn warning_event_carries_kind() {
        let e = LocationEvent::Warning(IntegrityWarning::NoConnections { floor: "F1".into() });
        assert_eq!(e.kind(), EventKind::Warning);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"kind\":\"NoConnections\""));
    }

    #[test]
    fn location_update_round_trips_pose() {
        let e = LocationEvent::LocationUpdated {
            floor: "F1".into(),
            room: "Hall".into(),
            floor_pose: None,
            room_pose: RigidTransform::identity(),
            tracking_state: TrackingState::Normal,
        };
        let back: LocationEvent = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(back, e);
    }
}
