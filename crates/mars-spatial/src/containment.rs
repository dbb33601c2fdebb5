//! Containment resolver: which room holds a floor-frame point, and which
//! connection a room-frame elevation satisfies.
//!
//! Rooms are probed in the floor's declaration order.  When volumes overlap
//! the first room wins and the overlap is logged, so the answer is stable
//! for a given building.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::{Connection, Floor, Room};
use crate::transform::{RigidTransform, Vec3, to_room_frame};

/// Default probe length for the containment ray (metres).
///
/// Parity needs the ray to reach the far wall of the room, so the probe must
/// exceed the largest room extent along +Z.  A short segment would report
/// zero crossings from deep inside a large room and call it outside.
pub const DEFAULT_PROBE_DISTANCE: f64 = 100.0;

/// How to choose among several connections whose altitude windows all
/// contain the current elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionTieBreak {
    /// The first connection in the room's declaration order.
    #[default]
    FirstDeclared,
    /// The connection whose altitude is closest to the elevation; declaration
    /// order breaks exact ties.
    NearestAltitude,
}

/// Stateless room / connection lookups over a [`Floor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainmentResolver {
    probe_distance: f64,
    tie_break: ConnectionTieBreak,
}

impl Default for ContainmentResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_DISTANCE, ConnectionTieBreak::default())
    }
}

impl ContainmentResolver {
    pub fn new(probe_distance: f64, tie_break: ConnectionTieBreak) -> Self {
        Self {
            probe_distance,
            tie_break,
        }
    }

    pub fn probe_distance(&self) -> f64 {
        self.probe_distance
    }

    pub fn tie_break(&self) -> ConnectionTieBreak {
        self.tie_break
    }

    /// True when `room` contains the floor-frame `point`.
    ///
    /// Rooms without geometry or without an alignment never contain anything.
    pub fn room_contains(&self, floor: &Floor, room: &Room, point: Vec3) -> bool {
        let (Some(volume), Some(alignment)) = (room.volume(), floor.alignment(room.name())) else {
            return false;
        };
        let local = to_room_frame(&RigidTransform::from_translation(point), alignment).translation();
        if !volume.bounds().contains_point(local) {
            return false;
        }
        volume.contains(local, self.probe_distance)
    }

    /// Every room on `floor` containing `point`, in declaration order.
    pub fn rooms_containing<'a>(&self, floor: &'a Floor, point: Vec3) -> Vec<&'a Room> {
        floor
            .rooms()
            .iter()
            .filter(|room| self.room_contains(floor, room, point))
            .collect()
    }

    /// The room on `floor` containing the floor-frame `point`, if any.
    pub fn room_containing<'a>(&self, floor: &'a Floor, point: Vec3) -> Option<&'a Room> {
        let claimants = self.rooms_containing(floor, point);
        if claimants.len() > 1 {
            let names: Vec<&str> = claimants.iter().map(|r| r.name()).collect();
            warn!(
                floor = floor.name(),
                rooms = ?names,
                "overlapping room volumes; using the first declared"
            );
        }
        let found = claimants.first().copied();
        debug!(
            floor = floor.name(),
            x = point.x,
            y = point.y,
            z = point.z,
            room = found.map(Room::name),
            "containment probe"
        );
        found
    }

    /// First connection of `room` (declaration order) traversable at the
    /// room-frame elevation `local_y`.
    pub fn connection_satisfied<'a>(&self, room: &'a Room, local_y: f64) -> Option<&'a Connection> {
        room.connections().iter().find(|c| c.is_traversable_at(local_y))
    }

    /// Connection of `room` traversable at `local_y`, resolved with the
    /// configured tie-break when several qualify.
    pub fn select_connection<'a>(&self, room: &'a Room, local_y: f64) -> Option<&'a Connection> {
        self.select_among(room.connections().iter(), local_y)
    }

    /// Same as [`select_connection`][Self::select_connection] over an
    /// already filtered candidate list (kept in declaration order).
    pub fn select_among<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Connection>,
        local_y: f64,
    ) -> Option<&'a Connection> {
        let mut traversable = candidates.filter(|c| c.is_traversable_at(local_y));
        match self.tie_break {
            ConnectionTieBreak::FirstDeclared => traversable.next(),
            ConnectionTieBreak::NearestAltitude => {
                traversable.fold(None, |best: Option<&Connection>, c| match best {
                    Some(b) if (b.altitude - local_y).abs() <= (c.altitude - local_y).abs() => Some(b),
                    _ => Some(c),
                })
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
