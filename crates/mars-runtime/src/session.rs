//! [`LocalizationSession`] – the per-user localization state machine.
//!
//! A session owns the answer to "which floor and room is the user in, and
//! where on the floor plan are they?".  It is driven by one call per pose
//! sample from the tracking provider and never blocks.
//!
//! # Phases
//!
//! | Phase | Floor pose | Containment |
//! |---|---|---|
//! | [`Phase::Normal`] | `alignment * raw` | every `containment_interval`-th sample; may switch room or floor |
//! | [`Phase::ReLocalizing`] | `recovery * raw` | records a pending room, never switches |
//! | [`Phase::Settling`] | `alignment * raw` | suppressed for `settle_samples` samples |
//!
//! ```text
//!            degraded label                      nominal label
//!   Normal ─────────────────▶ ReLocalizing ─────────────────▶ Settling ──▶ Normal
//!     ▲                          ▲      │  (pending room switch      │ (window
//!     │                          │      │   is applied here)         │  elapsed)
//!     │                          └──────┘                            │
//!     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A degraded label during `Settling` goes straight back to `ReLocalizing`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mars_runtime::{LocalizationConfig, LocalizationSession, RecordingProvider};
//! use mars_spatial::graph::{Building, Floor, Room};
//! use mars_spatial::transform::{RigidTransform, Vec3};
//! use mars_spatial::volume::BoxVolume;
//!
//! let floor = Floor::new("F1")
//!     .with_room(Room::new("Hall").with_volume(Arc::new(BoxVolume::new(
//!         Vec3::new(-5.0, -1.0, -5.0),
//!         Vec3::new(5.0, 4.0, 5.0),
//!     ))))
//!     .with_alignment("Hall", RigidTransform::identity())
//!     .unwrap();
//! let building = Arc::new(Building::new("HQ", vec![floor]).unwrap());
//!
//! let mut session = LocalizationSession::new(
//!     building,
//!     "F1",
//!     "Hall",
//!     Box::new(RecordingProvider::new()),
//!     LocalizationConfig::default(),
//! )
//! .unwrap();
//!
//! let report = session.on_pose_sample(RigidTransform::from_translation(Vec3::new(1.0, 1.5, 0.0)), "Normal");
//! assert!(report.accepted);
//! assert_eq!(session.active_room(), "Hall");
//! ```

use std::sync::Arc;

use mars_middleware::events::{LocationEvent, Notification};
use mars_middleware::observer::{DeliveryReport, LocationObserver, ObserverId, ObserverRegistry};
use mars_spatial::containment::ContainmentResolver;
use mars_spatial::graph::{Building, Room};
use mars_spatial::transform::{RigidTransform, Vec3, compute_recovery_offset, to_floor_frame};
use mars_types::{IntegrityWarning, MarsError, TrackingState};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LocalizationConfig;
use crate::provider::TrackingProvider;

// ─────────────────────────────────────────────────────────────────────────────
// Phase
// ─────────────────────────────────────────────────────────────────────────────

/// Where the session is in its tracking lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Tracking is nominal and the room alignment is trusted.
    Normal,
    /// The provider lost registration; floor poses are dead-reckoned from the
    /// last known floor pose.
    ReLocalizing {
        degraded_samples: u32,
        assist_requested: bool,
        /// Room the user appears to have walked into while degraded.
        pending_room: Option<String>,
        /// Floor pose at the moment tracking degraded.
        frozen_floor_pose: Option<RigidTransform>,
    },
    /// Tracking just recovered; containment is held off for `remaining`
    /// more nominal samples.
    Settling { remaining: u32 },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ReLocalizing { .. } => "re-localizing",
            Self::Settling { .. } => "settling",
        }
    }
}

/// What a single pose sample did to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleReport {
    /// False when the sample was rejected (invalid pose).
    pub accepted: bool,
    /// Floor-frame pose after this sample (held value when it could not be
    /// recomputed).
    pub floor_pose: Option<RigidTransform>,
    pub room_switched: bool,
    pub floor_switched: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// LocalizationSession
// ─────────────────────────────────────────────────────────────────────────────

/// One user's localization state inside one building.
///
/// Feed it with [`on_pose_sample`][Self::on_pose_sample]; read it through the
/// accessors or by registering observers.  Updates take `&mut self`, so a
/// session can never be updated re-entrantly.
pub struct LocalizationSession {
    id: Uuid,
    building: Arc<Building>,
    provider: Box<dyn TrackingProvider>,
    config: LocalizationConfig,
    resolver: ContainmentResolver,
    observers: ObserverRegistry,

    active_floor: String,
    active_room: String,
    previous_room: Option<String>,
    tracking_state: TrackingState,
    phase: Phase,

    /// Nominal samples since the last transition; drives the containment
    /// throttle.
    nominal_samples: u32,
    recovery: RigidTransform,
    last_floor_pose: Option<RigidTransform>,
    /// Set once the missing-alignment warning went out for the active room.
    alignment_warned: bool,
}

impl std::fmt::Debug for LocalizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizationSession")
            .field("id", &self.id)
            .field("building", &self.building.name())
            .field("active_floor", &self.active_floor)
            .field("active_room", &self.active_room)
            .field("previous_room", &self.previous_room)
            .field("tracking_state", &self.tracking_state)
            .field("phase", &self.phase)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl LocalizationSession {
    /// Start a session in `room` on `floor`.
    ///
    /// Validates `config`, checks that the room exists, logs the building's
    /// integrity warnings and configures the provider for the starting room.
    pub fn new(
        building: Arc<Building>,
        floor: &str,
        room: &str,
        mut provider: Box<dyn TrackingProvider>,
        config: LocalizationConfig,
    ) -> Result<Self, MarsError> {
        config.validate()?;
        let start = building
            .floor(floor)
            .ok_or_else(|| MarsError::UnknownFloor(floor.to_string()))?
            .room(room)
            .ok_or_else(|| MarsError::UnknownRoom {
                floor: floor.to_string(),
                room: room.to_string(),
            })?;

        for warning in building.integrity_warnings() {
            warn!(building = building.name(), %warning, "building integrity warning");
        }
        if let Err(e) = provider.configure_for_room(floor, start) {
            warn!(floor, room, error = %e, "tracking provider refused starting room");
        }

        let id = Uuid::new_v4();
        info!(session = %id, building = building.name(), floor, room, "localization session started");

        Ok(Self {
            id,
            resolver: config.resolver(),
            building,
            provider,
            config,
            observers: ObserverRegistry::new(),
            active_floor: floor.to_string(),
            active_room: room.to_string(),
            previous_room: None,
            tracking_state: TrackingState::NotAvailable,
            phase: Phase::Normal,
            nominal_samples: 0,
            recovery: RigidTransform::identity(),
            last_floor_pose: None,
            alignment_warned: false,
        })
    }

    /// Start a session in the room holding the recognized `marker`.
    pub fn from_marker(
        building: Arc<Building>,
        marker: &str,
        provider: Box<dyn TrackingProvider>,
        config: LocalizationConfig,
    ) -> Result<Self, MarsError> {
        let room = building
            .room_for_marker(marker)
            .ok_or_else(|| MarsError::UnknownMarker(marker.to_string()))?;
        let (floor, room) = (room.floor().to_string(), room.name().to_string());
        Self::new(building, &floor, &room, provider, config)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn building(&self) -> &Arc<Building> {
        &self.building
    }

    pub fn config(&self) -> &LocalizationConfig {
        &self.config
    }

    pub fn active_floor(&self) -> &str {
        &self.active_floor
    }

    pub fn active_room(&self) -> &str {
        &self.active_room
    }

    /// The active room's graph node.
    pub fn current_room(&self) -> Option<&Room> {
        self.building.room(&self.active_floor, &self.active_room)
    }

    pub fn previous_room(&self) -> Option<&str> {
        self.previous_room.as_deref()
    }

    pub fn tracking_state(&self) -> &TrackingState {
        &self.tracking_state
    }

    /// The provider's last label, verbatim.
    pub fn tracking_label(&self) -> &str {
        self.tracking_state.label()
    }

    pub fn recovery_transform(&self) -> &RigidTransform {
        &self.recovery
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Most recent floor-frame pose.
    pub fn last_floor_pose(&self) -> Option<&RigidTransform> {
        self.last_floor_pose.as_ref()
    }

    /// Floor pose frozen when tracking degraded, while re-localizing.
    pub fn frozen_floor_pose(&self) -> Option<&RigidTransform> {
        match &self.phase {
            Phase::ReLocalizing { frozen_floor_pose, .. } => frozen_floor_pose.as_ref(),
            _ => None,
        }
    }

    pub fn integrity_warnings(&self) -> Vec<IntegrityWarning> {
        self.building.integrity_warnings()
    }

    // ── Observers ───────────────────────────────────────────────────────────

    pub fn register_observer(
        &mut self,
        id: ObserverId,
        observer: Box<dyn LocationObserver>,
    ) -> Result<(), MarsError> {
        self.observers.register(id, observer)
    }

    /// Register under a fresh id and return it.
    pub fn add_observer(&mut self, observer: Box<dyn LocationObserver>) -> ObserverId {
        let id = ObserverId::new();
        // A fresh v4 id cannot collide with an existing registration.
        let _ = self.observers.register(id, observer);
        id
    }

    /// Returns whether `id` was registered.
    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Send every building integrity warning to the observers.
    pub fn announce_integrity_warnings(&mut self) -> usize {
        let warnings = self.building.integrity_warnings();
        let count = warnings.len();
        for warning in warnings {
            self.emit(LocationEvent::Warning(warning));
        }
        count
    }

    // ── Sample intake ───────────────────────────────────────────────────────

    /// Process one pose sample given as a flat column-major 4×4 matrix.
    pub fn on_raw_sample(&mut self, values: &[f64], label: &str) -> SampleReport {
        match RigidTransform::from_array(values) {
            Ok(pose) => self.on_pose_sample(pose, label),
            Err(e) => self.reject(e),
        }
    }

    /// Process one pose sample from the tracking provider.
    ///
    /// `label` is the provider's tracking state; anything other than
    /// `"Normal"` counts as degraded.  Never fails: problems are reported as
    /// warnings and the last valid state is kept.
    pub fn on_pose_sample(&mut self, pose: RigidTransform, label: &str) -> SampleReport {
        if let Err(e) = pose.validate() {
            return self.reject(e);
        }

        self.tracking_state = TrackingState::from_label(label);
        let nominal = self.tracking_state.is_nominal();
        let relocalizing = matches!(self.phase, Phase::ReLocalizing { .. });
        let mut report = SampleReport {
            accepted: true,
            ..SampleReport::default()
        };

        match (relocalizing, nominal) {
            (false, true) => self.nominal_sample(&pose, &mut report),
            (false, false) => {
                self.enter_relocalizing();
                self.degraded_sample(&pose);
            }
            (true, false) => self.degraded_sample(&pose),
            (true, true) => self.recover(&pose, &mut report),
        }

        report.floor_pose = self.last_floor_pose;
        self.emit(LocationEvent::LocationUpdated {
            floor: self.active_floor.clone(),
            room: self.active_room.clone(),
            floor_pose: self.last_floor_pose,
            room_pose: pose,
            tracking_state: self.tracking_state.clone(),
        });
        report
    }

    // ── Phase handlers ──────────────────────────────────────────────────────

    fn nominal_sample(&mut self, pose: &RigidTransform, report: &mut SampleReport) {
        let floor_pose = self.align(pose);
        self.refresh_floor_pose(floor_pose);

        if let Phase::Settling { remaining } = &mut self.phase {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                debug!(session = %self.id, "settle window closed");
                self.phase = Phase::Normal;
                self.nominal_samples = 0;
            }
            return;
        }

        self.nominal_samples = self.nominal_samples.wrapping_add(1);
        if self.nominal_samples % self.config.containment_interval != 0 {
            return;
        }
        let room_switched = match floor_pose {
            Some(fp) => self.check_room(fp.translation(), report),
            None => false,
        };
        // The raw pose is still in the old room's frame after a room switch.
        if !room_switched {
            self.check_floor(pose.translation().y, report);
        }
    }

    fn enter_relocalizing(&mut self) {
        info!(
            session = %self.id,
            label = %self.tracking_state,
            room = %self.active_room,
            "tracking degraded; holding floor frame"
        );
        self.nominal_samples = 0;
        self.phase = Phase::ReLocalizing {
            degraded_samples: 0,
            assist_requested: false,
            pending_room: None,
            frozen_floor_pose: self.last_floor_pose,
        };
    }

    fn degraded_sample(&mut self, pose: &RigidTransform) {
        let floor_pose = self.last_floor_pose.map(|_| self.recovery.compose(pose));
        if floor_pose.is_some() {
            self.last_floor_pose = floor_pose;
        }

        let assist_after = self.config.assist_after_samples;
        let (count, request_assist) = match &mut self.phase {
            Phase::ReLocalizing {
                degraded_samples,
                assist_requested,
                ..
            } => {
                *degraded_samples = degraded_samples.saturating_add(1);
                let fire = !*assist_requested && *degraded_samples >= assist_after;
                if fire {
                    *assist_requested = true;
                }
                (*degraded_samples, fire)
            }
            _ => return,
        };

        if request_assist {
            self.request_assisted_recovery();
        }

        if count % self.config.containment_interval != 0 {
            return;
        }
        let Some(fp) = floor_pose else { return };
        let Some(candidate) = self.resolve_room(fp.translation()) else {
            return;
        };
        if let Phase::ReLocalizing { pending_room, .. } = &mut self.phase {
            if candidate == self.active_room {
                *pending_room = None;
            } else {
                debug!(session = %self.id, room = %candidate, "room change pending recovery");
                *pending_room = Some(candidate);
            }
        }
    }

    fn recover(&mut self, pose: &RigidTransform, report: &mut SampleReport) {
        let pending = match std::mem::replace(&mut self.phase, Phase::Normal) {
            Phase::ReLocalizing { pending_room, .. } => pending_room,
            _ => None,
        };
        info!(session = %self.id, room = %self.active_room, "tracking recovered");

        // Registered against the anchors of the room the provider was
        // configured for, i.e. the pre-switch room.
        let floor_pose = self.align(pose);
        self.refresh_floor_pose(floor_pose);

        if let Some(next) = pending
            && next != self.active_room
        {
            self.switch_room(next, report);
        }

        self.nominal_samples = 0;
        self.phase = match self.config.settle_samples {
            0 => Phase::Normal,
            n => Phase::Settling { remaining: n },
        };
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    fn check_room(&mut self, point: Vec3, report: &mut SampleReport) -> bool {
        match self.resolve_room(point) {
            Some(next) if next != self.active_room => {
                self.switch_room(next, report);
                report.room_switched
            }
            _ => false,
        }
    }

    fn switch_room(&mut self, next: String, report: &mut SampleReport) {
        let building = Arc::clone(&self.building);
        let Some(room) = building.room(&self.active_floor, &next) else {
            warn!(floor = %self.active_floor, room = %next, "resolved room does not exist; keeping current room");
            return;
        };

        let from = std::mem::replace(&mut self.active_room, next);
        info!(session = %self.id, floor = %self.active_floor, from = %from, to = %self.active_room, "room changed");
        self.previous_room = Some(from.clone());
        self.alignment_warned = false;
        self.nominal_samples = 0;

        if let Err(e) = self.provider.configure_for_room(&self.active_floor, room) {
            warn!(room = %self.active_room, error = %e, "tracking provider reconfiguration failed");
        }
        report.room_switched = true;
        self.emit(LocationEvent::RoomChanged {
            floor: self.active_floor.clone(),
            from,
            to: self.active_room.clone(),
        });
    }

    fn check_floor(&mut self, local_y: f64, report: &mut SampleReport) {
        let building = Arc::clone(&self.building);
        let Some(room) = building.room(&self.active_floor, &self.active_room) else {
            return;
        };
        let candidates = room
            .connections()
            .iter()
            .filter(|c| c.target_floor != self.active_floor);
        let Some(connection) = self.resolver.select_among(candidates, local_y) else {
            return;
        };
        let Some(target) = building.room(&connection.target_floor, &connection.target_room) else {
            warn!(
                from = %self.active_room,
                floor = %connection.target_floor,
                room = %connection.target_room,
                "connection targets an unknown room"
            );
            return;
        };

        let from_floor = std::mem::replace(&mut self.active_floor, connection.target_floor.clone());
        let from_room = std::mem::replace(&mut self.active_room, connection.target_room.clone());
        info!(
            session = %self.id,
            from_floor = %from_floor,
            from_room = %from_room,
            to_floor = %self.active_floor,
            to_room = %self.active_room,
            elevation = local_y,
            "floor changed"
        );
        self.previous_room = Some(from_room.clone());
        self.alignment_warned = false;
        self.nominal_samples = 0;

        if let Err(e) = self.provider.configure_for_room(&self.active_floor, target) {
            warn!(room = %self.active_room, error = %e, "tracking provider reconfiguration failed");
        }
        report.floor_switched = true;
        self.emit(LocationEvent::FloorChanged {
            from_floor,
            from_room,
            to_floor: self.active_floor.clone(),
            to_room: self.active_room.clone(),
        });
    }

    fn request_assisted_recovery(&mut self) {
        warn!(session = %self.id, room = %self.active_room, "tracking still degraded; requesting assisted recovery");
        if let Err(e) = self.provider.request_assisted_recovery() {
            warn!(error = %e, "tracking provider could not start assisted recovery");
        }
        self.emit(LocationEvent::AssistedRecoveryRequested {
            floor: self.active_floor.clone(),
            room: self.active_room.clone(),
        });
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    /// Floor pose of `pose` through the active room's alignment, or `None`
    /// (warned once per room activation) when the room has none.
    fn align(&mut self, pose: &RigidTransform) -> Option<RigidTransform> {
        let alignment = self
            .building
            .alignment(&self.active_floor, &self.active_room)
            .copied();
        match alignment {
            Some(a) => Some(to_floor_frame(pose, &a)),
            None => {
                if !self.alignment_warned {
                    self.alignment_warned = true;
                    self.report_warning(IntegrityWarning::MissingAlignment {
                        floor: self.active_floor.clone(),
                        room: self.active_room.clone(),
                    });
                }
                None
            }
        }
    }

    fn refresh_floor_pose(&mut self, floor_pose: Option<RigidTransform>) {
        if let Some(fp) = floor_pose {
            self.last_floor_pose = Some(fp);
            self.recovery = compute_recovery_offset(&fp, fp.yaw());
        }
    }

    fn resolve_room(&self, point: Vec3) -> Option<String> {
        let floor = self.building.floor(&self.active_floor)?;
        self.resolver
            .room_containing(floor, point)
            .map(|room| room.name().to_string())
    }

    fn reject(&mut self, error: MarsError) -> SampleReport {
        self.report_warning(IntegrityWarning::InvalidPose {
            details: error.to_string(),
        });
        SampleReport {
            accepted: false,
            floor_pose: self.last_floor_pose,
            ..SampleReport::default()
        }
    }

    fn report_warning(&mut self, warning: IntegrityWarning) {
        warn!(session = %self.id, %warning, "integrity warning");
        self.emit(LocationEvent::Warning(warning));
    }

    fn emit(&mut self, event: LocationEvent) -> DeliveryReport {
        let notification = Notification::new(self.id, event);
        self.observers.notify(&notification)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
