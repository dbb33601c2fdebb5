use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label the tracking provider reports while tracking is nominal.
pub const NORMAL_LABEL: &str = "Normal";
/// Label the tracking provider reports while re-localizing against saved
/// anchoring data.
pub const RELOCALIZING_LABEL: &str = "Re-Localizing...";
/// Label the tracking provider reports when no tracking is available at all.
pub const NOT_AVAILABLE_LABEL: &str = "Not Available";

/// Tracking quality as reported by the external visual-tracking provider.
///
/// The provider speaks in free-form labels; [`TrackingState::from_label`]
/// classifies them while [`TrackingState::label`] gives back the exact text,
/// so the original label always passes through unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail")]
pub enum TrackingState {
    /// Tracking is nominal; raw poses are registered to the room's anchors.
    Normal,
    /// The provider lost registration and is trying to recover it.
    Relocalizing,
    /// Tracking quality is reduced.  Holds the full provider label
    /// (e.g. "Limited: Excessive Motion").
    Limited(String),
    /// No tracking at all.
    NotAvailable,
    /// Any label this engine does not know about.
    Other(String),
}

/// Prefix shared by every reduced-quality label.
pub const LIMITED_PREFIX: &str = "Limited";

impl TrackingState {
    /// Classify a provider label.  The label text is kept as given.
    pub fn from_label(label: &str) -> Self {
        match label {
            NORMAL_LABEL => Self::Normal,
            RELOCALIZING_LABEL => Self::Relocalizing,
            NOT_AVAILABLE_LABEL => Self::NotAvailable,
            other if other.starts_with(LIMITED_PREFIX) => Self::Limited(other.to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    /// True only for [`TrackingState::Normal`]; every other state is degraded.
    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// The provider label this state was parsed from, byte for byte.
    pub fn label(&self) -> &str {
        match self {
            Self::Normal => NORMAL_LABEL,
            Self::Relocalizing => RELOCALIZING_LABEL,
            Self::NotAvailable => NOT_AVAILABLE_LABEL,
            Self::Limited(label) | Self::Other(label) => label,
        }
    }

    /// Reason text of a `Limited` label, without the `"Limited: "` prefix.
    pub fn limited_reason(&self) -> Option<&str> {
        match self {
            Self::Limited(label) => label
                .strip_prefix(LIMITED_PREFIX)
                .map(|rest| rest.trim_start_matches(':').trim_start()),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-fatal data problems surfaced to the collaborator layer.
///
/// Processing always continues; the affected feature degrades instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IntegrityWarning {
    /// A room has no entry in its floor's association map, so floor-frame
    /// conversion is skipped while it is active.
    MissingAlignment { floor: String, room: String },
    /// An association entry names a room the floor does not contain.
    OrphanAlignment { floor: String, room: String },
    /// The floor has more than one room but the building declares no
    /// connections at all.
    NoConnections { floor: String },
    /// The building has several floors but none of this floor's rooms
    /// declares a connection, so it can never be left vertically.
    IsolatedFloor { floor: String },
    /// A pose sample or transform failed the rigid-body check and was dropped.
    InvalidPose { details: String },
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAlignment { floor, room } => {
                write!(f, "room '{room}' on floor '{floor}' has no alignment entry")
            }
            Self::OrphanAlignment { floor, room } => {
                write!(f, "floor '{floor}' aligns unknown room '{room}'")
            }
            Self::NoConnections { floor } => write!(
                f,
                "floor '{floor}' has several rooms but the building declares no connections"
            ),
            Self::IsolatedFloor { floor } => {
                write!(f, "floor '{floor}' declares no vertical connections")
            }
            Self::InvalidPose { details } => write!(f, "invalid pose rejected: {details}"),
        }
    }
}

/// Global error type spanning graph construction, transform validation,
/// provider commands and configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarsError {
    #[error("Invalid Transform: {0}")]
    InvalidTransform(String),

    #[error("Unknown Floor: {0}")]
    UnknownFloor(String),

    #[error("Unknown Room '{room}' on floor '{floor}'")]
    UnknownRoom { floor: String, room: String },

    #[error("Unknown Marker: {0}")]
    UnknownMarker(String),

    #[error("Duplicate Floor: {0}")]
    DuplicateFloor(String),

    #[error("Duplicate Room '{room}' on floor '{floor}'")]
    DuplicateRoom { floor: String, room: String },

    #[error("Tracking Provider Error: {0}")]
    Provider(String),

    #[error("Observer Error: {0}")]
    Observer(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
