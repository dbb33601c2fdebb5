//! `mars-spatial` – geometry and building model.
//!
//! Everything needed to answer "where is the user?" without any notion of
//! time or tracking state.
//!
//! # Modules
//!
//! - [`transform`] – [`RigidTransform`][transform::RigidTransform] and the
//!   coordinate alignment engine (room frame ↔ floor frame, yaw extraction,
//!   recovery offset).
//! - [`volume`] – [`RoomVolume`][volume::RoomVolume] implementations with
//!   ray-parity containment.
//! - [`graph`] – [`Building`][graph::Building], floors, rooms, connections
//!   and the integrity checks run over them.
//! - [`containment`] – [`ContainmentResolver`][containment::ContainmentResolver]:
//!   room lookup for a floor-frame point and connection lookup for a
//!   room-frame elevation.

pub mod containment;
pub mod graph;
pub mod transform;
pub mod volume;
