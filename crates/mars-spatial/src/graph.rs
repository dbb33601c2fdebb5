//! Building model: floors, rooms, connections and alignments.
//!
//! The graph is read-only once built.  Rooms refer to their floor by name
//! rather than by pointer, and every lookup goes through the owning
//! [`Building`].
//!
//! ```rust
//! use std::sync::Arc;
//! use mars_spatial::graph::{Building, Connection, Floor, Room};
//! use mars_spatial::transform::{RigidTransform, Vec3};
//! use mars_spatial::volume::BoxVolume;
//!
//! let lobby = Room::new("Lobby")
//!     .with_volume(Arc::new(BoxVolume::new(Vec3::zero(), Vec3::new(5.0, 3.0, 5.0))))
//!     .with_connection(Connection::new("F2", "Landing", 2.5));
//! let ground = Floor::new("F1")
//!     .with_room(lobby)
//!     .with_alignment("Lobby", RigidTransform::identity())
//!     .unwrap();
//! let upper = Floor::new("F2").with_room(Room::new("Landing"));
//!
//! let building = Building::new("HQ", vec![ground, upper]).unwrap();
//! assert_eq!(building.room("F1", "Lobby").unwrap().floor(), "F1");
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mars_types::{IntegrityWarning, MarsError};
use serde::{Deserialize, Serialize};

use crate::transform::RigidTransform;
use crate::volume::RoomVolume;

/// Half-width of the altitude window in which a connection is traversable.
pub const ALTITUDE_TOLERANCE: f64 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Connection & ReferenceMarker
// ────────────────────────────────────────────────────────────────────────────

/// A vertical passage (staircase, elevator) from one room to a room on
/// another floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub target_floor: String,
    pub target_room: String,
    /// Elevation in the source room's frame at which the passage is reached.
    pub altitude: f64,
}

impl Connection {
    pub fn new(target_floor: impl Into<String>, target_room: impl Into<String>, altitude: f64) -> Self {
        Self {
            target_floor: target_floor.into(),
            target_room: target_room.into(),
            altitude,
        }
    }

    /// True when `local_y` lies within [`ALTITUDE_TOLERANCE`] of the altitude.
    pub fn is_traversable_at(&self, local_y: f64) -> bool {
        (local_y - self.altitude).abs() <= ALTITUDE_TOLERANCE
    }
}

/// A recognizable image placed in a room, used to pick the starting room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMarker {
    pub name: String,
    /// Printed width in metres.
    pub physical_width: f64,
}

impl ReferenceMarker {
    pub fn new(name: impl Into<String>, physical_width: f64) -> Self {
        Self {
            name: name.into(),
            physical_width,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Room
// ────────────────────────────────────────────────────────────────────────────

/// A room: optional geometry in its own frame, markers and outgoing
/// connections.
#[derive(Debug, Clone)]
pub struct Room {
    name: String,
    floor: String,
    volume: Option<Arc<dyn RoomVolume>>,
    markers: Vec<ReferenceMarker>,
    connections: Vec<Connection>,
}

impl Room {
    /// A room with no geometry.  The floor key is set by [`Floor::with_room`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            floor: String::new(),
            volume: None,
            markers: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_volume(mut self, volume: Arc<dyn RoomVolume>) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_marker(mut self, marker: ReferenceMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the floor this room belongs to.
    pub fn floor(&self) -> &str {
        &self.floor
    }

    pub fn volume(&self) -> Option<&Arc<dyn RoomVolume>> {
        self.volume.as_ref()
    }

    pub fn markers(&self) -> &[ReferenceMarker] {
        &self.markers
    }

    /// Outgoing connections in declaration order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Floor
// ────────────────────────────────────────────────────────────────────────────

/// A floor: ordered rooms plus the room → floor alignment map.
#[derive(Debug, Clone)]
pub struct Floor {
    name: String,
    rooms: Vec<Room>,
    alignments: HashMap<String, RigidTransform>,
}

impl Floor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rooms: Vec::new(),
            alignments: HashMap::new(),
        }
    }

    /// Append a room, stamping it with this floor's name.
    pub fn with_room(mut self, mut room: Room) -> Self {
        room.floor = self.name.clone();
        self.rooms.push(room);
        self
    }

    /// Record the room-local → floor-global transform for `room`.
    ///
    /// The transform must be rigid.
    pub fn with_alignment(
        mut self,
        room: impl Into<String>,
        alignment: RigidTransform,
    ) -> Result<Self, MarsError> {
        alignment.validate()?;
        self.alignments.insert(room.into(), alignment);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rooms in insertion order.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.name == name)
    }

    pub fn alignment(&self, room: &str) -> Option<&RigidTransform> {
        self.alignments.get(room)
    }

    fn connection_count(&self) -> usize {
        self.rooms.iter().map(|r| r.connections.len()).sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Building
// ────────────────────────────────────────────────────────────────────────────

/// The whole building model.
#[derive(Debug, Clone)]
pub struct Building {
    name: String,
    floors: Vec<Floor>,
}

impl Building {
    /// Assemble a building, rejecting duplicate floor names and duplicate
    /// room names within a floor.
    pub fn new(name: impl Into<String>, floors: Vec<Floor>) -> Result<Self, MarsError> {
        let mut seen_floors = HashSet::new();
        for floor in &floors {
            if !seen_floors.insert(floor.name.as_str()) {
                return Err(MarsError::DuplicateFloor(floor.name.clone()));
            }
            let mut seen_rooms = HashSet::new();
            for room in &floor.rooms {
                if !seen_rooms.insert(room.name.as_str()) {
                    return Err(MarsError::DuplicateRoom {
                        floor: floor.name.clone(),
                        room: room.name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            name: name.into(),
            floors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    pub fn floor(&self, name: &str) -> Option<&Floor> {
        self.floors.iter().find(|f| f.name == name)
    }

    pub fn room(&self, floor: &str, room: &str) -> Option<&Room> {
        self.floor(floor)?.room(room)
    }

    /// Alignment for `room` on `floor`, if one was recorded.
    pub fn alignment(&self, floor: &str, room: &str) -> Option<&RigidTransform> {
        self.floor(floor)?.alignment(room)
    }

    /// The room holding a marker called `marker`, searching floors and rooms
    /// in order.
    pub fn room_for_marker(&self, marker: &str) -> Option<&Room> {
        self.floors
            .iter()
            .flat_map(|f| f.rooms.iter())
            .find(|r| r.markers.iter().any(|m| m.name == marker))
    }

    /// Every marker in the building, floor by floor.
    pub fn markers(&self) -> Vec<ReferenceMarker> {
        self.floors
            .iter()
            .flat_map(|f| f.rooms.iter())
            .flat_map(|r| r.markers.iter().cloned())
            .collect()
    }

    /// Data problems that degrade features without preventing operation.
    pub fn integrity_warnings(&self) -> Vec<IntegrityWarning> {
        let mut warnings = Vec::new();
        let total_connections: usize = self.floors.iter().map(Floor::connection_count).sum();

        for floor in &self.floors {
            for room in &floor.rooms {
                if !floor.alignments.contains_key(&room.name) {
                    warnings.push(IntegrityWarning::MissingAlignment {
                        floor: floor.name.clone(),
                        room: room.name.clone(),
                    });
                }
            }

            let mut orphans: Vec<&String> = floor
                .alignments
                .keys()
                .filter(|name| floor.room(name).is_none())
                .collect();
            orphans.sort();
            warnings.extend(orphans.into_iter().map(|room| IntegrityWarning::OrphanAlignment {
                floor: floor.name.clone(),
                room: room.clone(),
            }));

            if floor.rooms.len() > 1 && total_connections == 0 {
                warnings.push(IntegrityWarning::NoConnections {
                    floor: floor.name.clone(),
                });
            }
            if self.floors.len() > 1 && floor.connection_count() == 0 {
                warnings.push(IntegrityWarning::IsolatedFloor {
                    floor: floor.name.clone(),
                });
            }
        }
        warnings
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Vec3;
    use crate::volume::BoxVolume;

    fn two_floor_building() -> Building {
        let f1 = Floor::new("F1")
            .with_room(
                Room::new("Hall")
                    .with_volume(Arc::new(BoxVolume::new(Vec3::zero(), Vec3::new(4.0, 3.0, 4.0))))
                    .with_marker(ReferenceMarker::new("poster-hall", 0.3))
                    .with_connection(Connection::new("F2", "Landing", 2.0)),
            )
            .with_room(Room::new("Kitchen").with_marker(ReferenceMarker::new("fridge", 0.2)))
            .with_alignment("Hall", RigidTransform::identity())
            .unwrap()
            .with_alignment("Kitchen", RigidTransform::identity())
            .unwrap();
        let f2 = Floor::new("F2")
            .with_room(Room::new("Landing").with_connection(Connection::new("F1", "Hall", -2.0)))
            .with_alignment("Landing", RigidTransform::identity())
            .unwrap();
        Building::new("HQ", vec![f1, f2]).unwrap()
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn rooms_carry_their_floor_key() {
        let b = two_floor_building();
        assert_eq!(b.room("F2", "Landing").unwrap().floor(), "F2");
        assert_eq!(b.floor("F1").unwrap().rooms()[1].name(), "Kitchen");
    }

    #[test]
    fn duplicate_floor_is_rejected() {
        let err = Building::new("B", vec![Floor::new("F1"), Floor::new("F1")]).unwrap_err();
        assert_eq!(err, MarsError::DuplicateFloor("F1".into()));
    }

    #[test]
    fn duplicate_room_is_rejected() {
        let f = Floor::new("F1").with_room(Room::new("A")).with_room(Room::new("A"));
        let err = Building::new("B", vec![f]).unwrap_err();
        assert!(matches!(err, MarsError::DuplicateRoom { .. }));
    }

    // ── Lookups ─────────────────────────────────────────────────────────────

    #[test]
    fn unknown_names_return_none() {
        let b = two_floor_building();
        assert!(b.floor("F9").is_none());
        assert!(b.room("F1", "Attic").is_none());
        assert!(b.room("F9", "Hall").is_none());
        assert!(b.alignment("F2", "Hall").is_none());
    }

    #[test]
    fn marker_lookup_finds_room() {
        let b = two_floor_building();
        assert_eq!(b.room_for_marker("fridge").unwrap().name(), "Kitchen");
        assert!(b.room_for_marker("missing").is_none());
        assert_eq!(b.markers().len(), 2);
    }

    #[test]
    fn connection_window_is_inclusive() {
        let c = Connection::new("F2", "Landing", 2.0);
        assert!(c.is_traversable_at(2.5));
        assert!(c.is_traversable_at(1.5));
        assert!(!c.is_traversable_at(2.51));
    }

    #[test]
    fn connection_serializes_with_field_names() {
        let json = serde_json::to_string(&Connection::new("F2", "Landing", 2.0)).unwrap();
        assert!(json.contains("\"target_floor\":\"F2\""));
    }

    // ── Integrity ───────────────────────────────────────────────────────────

    #[test]
    fn healthy_building_has_no_warnings() {
        assert!(two_floor_building().integrity_warnings().is_empty());
    }

    #[test]
    fn missing_and_orphan_alignments_are_reported() {
        let f = Floor::new("F1")
            .with_room(Room::new("A"))
            .with_alignment("Ghost", RigidTransform::identity())
            .unwrap();
        let warnings = Building::new("B", vec![f]).unwrap().integrity_warnings();
        assert!(warnings.contains(&IntegrityWarning::MissingAlignment {
            floor: "F1".into(),
            room: "A".into()
        }));
        assert!(warnings.contains(&IntegrityWarning::OrphanAlignment {
            floor: "F1".into(),
            room: "Ghost".into()
        }));
    }

    #[test]
    fn multi_room_floor_without_connections_is_reported() {
        let f = Floor::new("F1")
            .with_room(Room::new("A"))
            .with_room(Room::new("B"))
            .with_alignment("A", RigidTransform::identity())
            .unwrap()
            .with_alignment("B", RigidTransform::identity())
            .unwrap();
        let warnings = Building::new("B", vec![f]).unwrap().integrity_warnings();
        assert_eq!(warnings, vec![IntegrityWarning::NoConnections { floor: "F1".into() }]);
    }

    #[test]
    fn isolated_floor_is_reported() {
        let f1 = Floor::new("F1")
            .with_room(Room::new("A").with_connection(Connection::new("F2", "B", 2.0)))
            .with_alignment("A", RigidTransform::identity())
            .unwrap();
        let f2 = Floor::new("F2")
            .with_room(Room::new("B"))
            .with_alignment("B", RigidTransform::identity())
            .unwrap();
        let warnings = Building::new("HQ", vec![f1, f2]).unwrap().integrity_warnings();
        assert_eq!(warnings, vec![IntegrityWarning::IsolatedFloor { floor: "F2".into() }]);
    }
}
