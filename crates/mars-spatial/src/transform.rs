//! Rigid transforms and the coordinate alignment engine.
//!
//! Every pose in the engine is a 4×4 homogeneous [`RigidTransform`] stored
//! column-major, with +Y as the vertical axis.  Rooms are aligned into their
//! floor's global frame by one transform each; this module converts poses
//! between the two frames and derives the yaw-only recovery offset used while
//! the tracking provider is re-localizing.
//!
//! # Example
//!
//! ```rust
//! use mars_spatial::transform::{to_floor_frame, to_room_frame, RigidTransform, Vec3};
//!
//! // The room's origin sits 4 m along the floor's X axis, turned 90°.
//! let alignment = RigidTransform::from_translation_yaw(
//!     Vec3::new(4.0, 0.0, 0.0),
//!     std::f64::consts::FRAC_PI_2,
//! );
//! let pose = RigidTransform::from_translation(Vec3::new(0.0, 1.5, -1.0));
//!
//! let floor = to_floor_frame(&pose, &alignment);
//! assert!((floor.translation().x - 3.0).abs() < 1e-9);
//!
//! let back = to_room_frame(&floor, &alignment);
//! assert!(back.approx_eq(&pose, 1e-9));
//! ```

use mars_types::MarsError;
use serde::{Deserialize, Serialize};

/// Tolerance used by the orthonormality check on rotation blocks.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Self) -> f64 {
        self.sub(other).length()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Euler angles
// ────────────────────────────────────────────────────────────────────────────

/// Roll / pitch / yaw decomposition of a rotation block (radians).
///
/// Yaw is the rotation about the vertical (+Y) axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// RigidTransform
// ────────────────────────────────────────────────────────────────────────────

/// A 4×4 homogeneous rigid-body transform (rotation + translation).
///
/// Storage is column-major: `cols[c][r]` is the element at row `r`, column
/// `c`, and the translation lives in `cols[3]`.  The flat 16-element form
/// produced by [`RigidTransform::to_array`] follows the same order, which is
/// also the `serde` representation.
///
/// Read as `T_A_B`, the transform maps points expressed in frame B into
/// frame A.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RigidTransform {
    cols: [[f64; 4]; 4],
}

impl RigidTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (i, col) in cols.iter_mut().enumerate() {
            col[i] = 1.0;
        }
        Self { cols }
    }

    /// A pure translation.
    pub fn from_translation(t: Vec3) -> Self {
        let mut m = Self::identity();
        m.cols[3] = [t.x, t.y, t.z, 1.0];
        m
    }

    /// A pure rotation of `yaw` radians about the vertical axis.
    pub fn rotation_y(yaw: f64) -> Self {
        let (s, c) = yaw.sin_cos();
        Self {
            cols: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Translation `t` combined with a rotation of `yaw` about the vertical
    /// axis (`T(t) * R_y(yaw)`).
    pub fn from_translation_yaw(t: Vec3, yaw: f64) -> Self {
        Self::from_translation(t).compose(&Self::rotation_y(yaw))
    }

    /// Combine a separately stored translation matrix and rotation matrix, the
    /// way surveyed room alignments are recorded (`translation * rotation`).
    pub fn from_parts(translation: &Self, rotation: &Self) -> Result<Self, MarsError> {
        translation.validate()?;
        rotation.validate()?;
        Ok(translation.compose(rotation))
    }

    /// Build from four columns, validating that the result is rigid.
    pub fn from_columns(cols: [[f64; 4]; 4]) -> Result<Self, MarsError> {
        let m = Self { cols };
        m.validate()?;
        Ok(m)
    }

    /// Build from four rows (row-major input), validating the result.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self, MarsError> {
        let mut cols = [[0.0; 4]; 4];
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                cols[c][r] = *v;
            }
        }
        Self::from_columns(cols)
    }

    /// Build from the flat column-major 16-element form.
    pub fn from_array(values: &[f64]) -> Result<Self, MarsError> {
        if values.len() != 16 {
            return Err(MarsError::InvalidTransform(format!(
                "expected 16 elements, got {}",
                values.len()
            )));
        }
        let mut cols = [[0.0; 4]; 4];
        for (i, v) in values.iter().enumerate() {
            cols[i / 4][i % 4] = *v;
        }
        Self::from_columns(cols)
    }

    /// Flatten into the column-major 16-element form.
    pub fn to_array(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for (c, col) in self.cols.iter().enumerate() {
            out[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        out
    }

    /// Element at row `r`, column `c`.
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.cols[c][r]
    }

    /// The translation component.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.cols[3][0], self.cols[3][1], self.cols[3][2])
    }

    /// Copy of `self` with the translation replaced.
    pub fn with_translation(mut self, t: Vec3) -> Self {
        self.cols[3] = [t.x, t.y, t.z, 1.0];
        self
    }

    /// Matrix product `self * other`: apply `other` first, then `self`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(&self, other: &Self) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, out_col) in cols.iter_mut().enumerate() {
            for (r, out) in out_col.iter_mut().enumerate() {
                *out = (0..4).map(|k| self.cols[k][r] * other.cols[c][k]).sum();
            }
        }
        Self { cols }
    }

    /// Inverse of a rigid transform: `[Rᵀ | -Rᵀ t]`.
    pub fn inverse(&self) -> Self {
        let t = self.translation();
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().take(3).enumerate() {
            for (r, out) in col.iter_mut().take(3).enumerate() {
                *out = self.cols[r][c];
            }
        }
        for (r, out) in cols[3].iter_mut().take(3).enumerate() {
            *out = -(0..3).map(|k| self.cols[r][k] * [t.x, t.y, t.z][k]).sum::<f64>();
        }
        cols[3][3] = 1.0;
        Self { cols }
    }

    /// Map a point expressed in the source frame into the target frame.
    pub fn apply_point(&self, p: Vec3) -> Vec3 {
        self.rotate(p).add(self.translation())
    }

    /// Rotate a direction (ignores the translation).
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let v = [v.x, v.y, v.z];
        let row = |r: usize| (0..3).map(|k| self.cols[k][r] * v[k]).sum::<f64>();
        Vec3::new(row(0), row(1), row(2))
    }

    /// Roll / pitch / yaw of the rotation block, each via `atan2`.
    pub fn rotation_angles(&self) -> RotationAngles {
        let m = &self.cols;
        RotationAngles {
            roll: m[0][1].atan2(m[1][1]),
            pitch: (-m[2][1]).atan2((m[0][1] * m[0][1] + m[1][1] * m[1][1]).sqrt()),
            yaw: self.yaw(),
        }
    }

    /// Rotation about the vertical axis in (−π, π].
    pub fn yaw(&self) -> f64 {
        let yaw = self.cols[2][0].atan2(self.cols[2][2]);
        // atan2 may return exactly −π; fold it onto the closed end.
        if yaw <= -std::f64::consts::PI {
            std::f64::consts::PI
        } else {
            yaw
        }
    }

    /// Same translation, rotation reduced to the pure yaw component.
    pub fn yaw_only(&self) -> Self {
        Self::rotation_y(self.yaw()).with_translation(self.translation())
    }

    /// Element-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }

    /// True when the matrix is a proper rigid transform.
    pub fn is_rigid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check that every element is finite, the bottom row is `0 0 0 1` and
    /// the rotation block is orthonormal with determinant +1.
    pub fn validate(&self) -> Result<(), MarsError> {
        if self.cols.iter().flatten().any(|v| !v.is_finite()) {
            return Err(MarsError::InvalidTransform(
                "matrix contains non-finite values".to_string(),
            ));
        }
        let bottom = [self.cols[0][3], self.cols[1][3], self.cols[2][3], self.cols[3][3]];
        if bottom
            .iter()
            .zip([0.0, 0.0, 0.0, 1.0])
            .any(|(a, b)| (a - b).abs() > ORTHONORMAL_TOLERANCE)
        {
            return Err(MarsError::InvalidTransform(format!(
                "bottom row {bottom:?} is not [0, 0, 0, 1]"
            )));
        }

        let axes = [0, 1, 2].map(|c| Vec3::new(self.cols[c][0], self.cols[c][1], self.cols[c][2]));
        for i in 0..3 {
            for j in i..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                let dot = axes[i].dot(axes[j]);
                if (dot - expected).abs() > ORTHONORMAL_TOLERANCE {
                    return Err(MarsError::InvalidTransform(format!(
                        "rotation block is not orthonormal (column {i} · column {j} = {dot})"
                    )));
                }
            }
        }
        let det = axes[0].cross(axes[1]).dot(axes[2]);
        if (det - 1.0).abs() > ORTHONORMAL_TOLERANCE {
            return Err(MarsError::InvalidTransform(format!(
                "rotation block has determinant {det}, expected 1"
            )));
        }
        Ok(())
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<Vec<f64>> for RigidTransform {
    type Error = MarsError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_array(&values)
    }
}

impl From<RigidTransform> for Vec<f64> {
    fn from(t: RigidTransform) -> Self {
        t.to_array().to_vec()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Alignment engine
// ────────────────────────────────────────────────────────────────────────────

/// Re-express a room-frame pose in the floor's global frame
/// (`alignment * pose`).
pub fn to_floor_frame(pose: &RigidTransform, alignment: &RigidTransform) -> RigidTransform {
    alignment.compose(pose)
}

/// Exact inverse of [`to_floor_frame`] (`alignment⁻¹ * pose`).
pub fn to_room_frame(pose: &RigidTransform, alignment: &RigidTransform) -> RigidTransform {
    alignment.inverse().compose(pose)
}

/// Free-function form of [`RigidTransform::yaw_only`].
pub fn yaw_only(transform: &RigidTransform) -> RigidTransform {
    transform.yaw_only()
}

/// Offset that keeps floor-frame output continuous while the provider has
/// lost absolute registration.
///
/// The provider restarts its frame at the device's current pose when it
/// starts re-localizing, so subsequent raw poses are relative to that instant.
/// Left-multiplying them by a transform carrying the last known floor position
/// and heading (`O * raw`) lands them back in the floor frame.
pub fn compute_recovery_offset(last_floor_pose: &RigidTransform, last_yaw: f64) -> RigidTransform {
    RigidTransform::rotation_y(last_yaw).with_translation(last_floor_pose.translation())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn tilted(yaw: f64, pitch: f64, roll: f64, t: Vec3) -> RigidTransform {
        // R_y(yaw) * R_x(pitch) * R_z(roll), built column by column.
        let (sp, cp) = pitch.sin_cos();
        let rx = RigidTransform::from_columns([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, cp, sp, 0.0],
            [0.0, -sp, cp, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        let (sr, cr) = roll.sin_cos();
        let rz = RigidTransform::from_columns([
            [cr, sr, 0.0, 0.0],
            [-sr, cr, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        RigidTransform::from_translation(t)
            .compose(&RigidTransform::rotation_y(yaw))
            .compose(&rx)
            .compose(&rz)
    }

    // ── Vec3 ────────────────────────────────────────────────────────────────

    #[test]
    fn vec3_cross_of_axes() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
        assert!((Vec3::new(3.0, 4.0, 0.0).length() - 5.0).abs() < 1e-12);
    }

    // ── RigidTransform basics ───────────────────────────────────────────────

    #[test]
    fn identity_apply_is_noop() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(RigidTransform::identity().apply_point(p), p);
    }

    #[test]
    fn rotation_y_quarter_turn_maps_z_to_x() {
        // Right-handed, Y up: +90° about Y turns +Z into +X.
        let r = RigidTransform::rotation_y(FRAC_PI_2);
        let p = r.apply_point(Vec3::new(0.0, 0.0, 1.0));
        assert!((p.x - 1.0).abs() < 1e-12, "x={}", p.x);
        assert!(p.y.abs() < 1e-12);
        assert!(p.z.abs() < 1e-12, "z={}", p.z);
    }

    #[test]
    fn compose_translations_add() {
        let a = RigidTransform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::from_translation(Vec3::new(2.0, 0.5, 0.0));
        let t = a.compose(&b).translation();
        assert!((t.x - 3.0).abs() < 1e-12);
        assert!((t.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn compose_respects_rotation() {
        // Parent rotated 90° about Y; child 1 m along the parent's +Z.
        let parent = RigidTransform::rotation_y(FRAC_PI_2);
        let child = RigidTransform::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let t = parent.compose(&child).translation();
        assert!((t.x - 1.0).abs() < 1e-12);
        assert!(t.z.abs() < 1e-12);
    }

    #[test]
    fn inverse_composes_to_identity() {
        let t = tilted(0.7, 0.2, -0.1, Vec3::new(3.0, -1.0, 2.5));
        assert!(t.compose(&t.inverse()).approx_eq(&RigidTransform::identity(), 1e-12));
        assert!(t.inverse().compose(&t).approx_eq(&RigidTransform::identity(), 1e-12));
    }

    #[test]
    fn from_rows_transposes_into_columns() {
        let t = RigidTransform::from_rows([
            [1.0, 0.0, 0.0, 5.0],
            [0.0, 1.0, 0.0, 6.0],
            [0.0, 0.0, 1.0, 7.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        assert_eq!(t.translation(), Vec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn from_parts_is_translation_then_rotation() {
        let translation = RigidTransform::from_translation(Vec3::new(2.0, 0.0, 0.0));
        let rotation = RigidTransform::rotation_y(FRAC_PI_2);
        let t = RigidTransform::from_parts(&translation, &rotation).unwrap();
        assert!(t.approx_eq(&RigidTransform::from_translation_yaw(Vec3::new(2.0, 0.0, 0.0), FRAC_PI_2), 1e-12));
    }

    // ── Validation ──────────────────────────────────────────────────────────

    #[test]
    fn non_orthonormal_rotation_is_rejected() {
        let mut values = RigidTransform::identity().to_array();
        values[0] = 2.0; // stretch X
        let err = RigidTransform::from_array(&values).unwrap_err();
        assert!(matches!(err, MarsError::InvalidTransform(_)));
    }

    #[test]
    fn reflection_is_rejected() {
        let mut values = RigidTransform::identity().to_array();
        values[10] = -1.0; // flip Z
        assert!(RigidTransform::from_array(&values).is_err());
    }

    #[test]
    fn bad_bottom_row_and_nan_are_rejected() {
        let mut values = RigidTransform::identity().to_array();
        values[3] = 0.5;
        assert!(RigidTransform::from_array(&values).is_err());

        let mut values = RigidTransform::identity().to_array();
        values[12] = f64::NAN;
        assert!(RigidTransform::from_array(&values).is_err());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(RigidTransform::from_array(&[1.0; 15]).is_err());
    }

    // ── Serialization ───────────────────────────────────────────────────────

    #[test]
    fn flat_array_is_lossless() {
        let t = tilted(-2.1, 0.05, 0.3, Vec3::new(0.25, 1.75, -9.5));
        let back = RigidTransform::from_array(&t.to_array()).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn serde_uses_flat_sequence() {
        let t = RigidTransform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.starts_with('['));
        assert!(json.ends_with("1.0,2.0,3.0,1.0]"));
        let back: RigidTransform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn serde_rejects_non_rigid_matrix() {
        let json = "[2,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]";
        assert!(serde_json::from_str::<RigidTransform>(json).is_err());
    }

    // ── Angles ──────────────────────────────────────────────────────────────

    #[test]
    fn yaw_is_recovered_from_pure_rotation() {
        for yaw in [-3.0, -FRAC_PI_2, -0.4, 0.0, 0.4, FRAC_PI_4, 3.0] {
            let t = RigidTransform::rotation_y(yaw);
            assert!((t.yaw() - yaw).abs() < 1e-12, "yaw {yaw} -> {}", t.yaw());
        }
    }

    #[test]
    fn yaw_range_is_half_open_at_minus_pi() {
        let t = RigidTransform::rotation_y(PI);
        assert!(t.yaw() > 0.0);
        assert!(t.yaw() <= PI);
    }

    #[test]
    fn rotation_angles_of_pure_yaw() {
        let a = RigidTransform::rotation_y(0.8).rotation_angles();
        assert!(a.roll.abs() < 1e-12);
        assert!(a.pitch.abs() < 1e-12);
        assert!((a.yaw - 0.8).abs() < 1e-12);
    }

    // ── Alignment engine ────────────────────────────────────────────────────

    #[test]
    fn floor_room_round_trip() {
        let alignment = RigidTransform::from_translation_yaw(Vec3::new(12.0, 0.0, -4.0), 2.3);
        for pose in [
            RigidTransform::identity(),
            tilted(0.3, 0.1, 0.05, Vec3::new(1.0, 1.4, 2.0)),
            tilted(-2.9, -0.2, 0.0, Vec3::new(-7.5, 0.0, 30.0)),
        ] {
            let floor = to_floor_frame(&pose, &alignment);
            assert!(to_room_frame(&floor, &alignment).approx_eq(&pose, 1e-5));
        }
    }

    #[test]
    fn yaw_only_keeps_translation_and_drops_tilt() {
        let t = tilted(1.1, 0.15, -0.2, Vec3::new(2.0, 1.0, -3.0));
        let y = yaw_only(&t);
        assert_eq!(y.translation(), t.translation());
        let a = y.rotation_angles();
        assert!(a.roll.abs() < 1e-12);
        assert!(a.pitch.abs() < 1e-12);
        assert!(y.is_rigid());
    }

    #[test]
    fn yaw_only_is_idempotent() {
        for t in [
            tilted(1.1, 0.15, -0.2, Vec3::new(2.0, 1.0, -3.0)),
            tilted(-2.5, -0.3, 0.4, Vec3::zero()),
            RigidTransform::identity(),
        ] {
            let once = yaw_only(&t);
            assert!(yaw_only(&once).approx_eq(&once, 1e-12));
        }
    }

    #[test]
    fn recovery_offset_reproduces_last_floor_pose_after_frame_reset() {
        let last_floor = RigidTransform::from_translation_yaw(Vec3::new(5.0, 1.2, -2.0), 0.6);
        let offset = compute_recovery_offset(&last_floor, last_floor.yaw());

        // Provider frame reset: the first raw pose after the reset is identity.
        let resumed = offset.compose(&RigidTransform::identity());
        assert!(resumed.approx_eq(&last_floor, 1e-12));

        // A 1 m step forward in the new provider frame follows the last heading.
        let step = RigidTransform::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let moved = offset.compose(&step).translation();
        assert!((moved.distance(last_floor.translation()) - 1.0).abs() < 1e-12);
        assert!((moved.x - (5.0 + 0.6f64.sin())).abs() < 1e-12);
    }
}
