//! Room volumes and ray-parity containment.
//!
//! A room's geometry is expressed in the room's own frame.  Containment is
//! decided by casting a probe ray from the query point along +Z and counting
//! boundary crossings: the point is inside when the ray meets the boundary
//! within the probe distance an odd number of times.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]        | Axis-aligned bounding box with a slab ray test.       |
//! | [`Ray`]         | Origin + unit direction.                              |
//! | [`RoomVolume`]  | Anything that can report ray crossings.               |
//! | [`BoxVolume`]   | Room modelled as a single box.                        |
//! | [`MeshVolume`]  | Room modelled as a closed triangle mesh.              |
//!
//! # Example
//!
//! ```rust
//! use mars_spatial::transform::Vec3;
//! use mars_spatial::volume::{BoxVolume, RoomVolume};
//!
//! let kitchen = BoxVolume::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 3.0, 5.0));
//! assert!(kitchen.contains(Vec3::new(1.0, 1.0, 1.0), 100.0));
//! assert!(!kitchen.contains(Vec3::new(1.0, 1.0, -2.0), 100.0));
//! ```

use crate::transform::Vec3;

/// Hits closer than this to the ray origin, or to each other, are merged.
const HIT_EPSILON: f64 = 1e-9;

/// Probe direction used for containment queries.
pub const PROBE_DIRECTION: Vec3 = Vec3 {
    x: 0.0,
    y: 0.0,
    z: 1.0,
};

// ────────────────────────────────────────────────────────────────────────────
// Ray
// ────────────────────────────────────────────────────────────────────────────

/// A half-line starting at `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// The containment probe: from `origin` towards +Z.
    pub fn probe(origin: Vec3) -> Self {
        Self::new(origin, PROBE_DIRECTION)
    }

    /// Point at parameter `t` along the ray.
    pub fn at(&self, t: f64) -> Vec3 {
        self.origin.add(self.direction.scale(t))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest box enclosing every point in `points`; `None` when empty.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |b, p| {
            Self::new(
                Vec3::new(b.min.x.min(p.x), b.min.y.min(p.y), b.min.z.min(p.z)),
                Vec3::new(b.max.x.max(p.x), b.max.y.max(p.y), b.max.z.max(p.z)),
            )
        }))
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Slab test: the ray parameters `(t_enter, t_exit)` of the infinite line
    /// through `ray`, or `None` when the line misses the box.
    pub fn ray_interval(&self, ray: &Ray) -> Option<(f64, f64)> {
        let o = [ray.origin.x, ray.origin.y, ray.origin.z];
        let d = [ray.direction.x, ray.direction.y, ray.direction.z];
        let lo = [self.min.x, self.min.y, self.min.z];
        let hi = [self.max.x, self.max.y, self.max.z];

        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            if d[axis].abs() < HIT_EPSILON {
                // Parallel to this slab: either always inside it or never.
                if o[axis] < lo[axis] || o[axis] > hi[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (lo[axis] - o[axis]) / d[axis];
            let t2 = (hi[axis] - o[axis]) / d[axis];
            t_enter = t_enter.max(t1.min(t2));
            t_exit = t_exit.min(t1.max(t2));
        }
        (t_enter <= t_exit).then_some((t_enter, t_exit))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RoomVolume
// ────────────────────────────────────────────────────────────────────────────

/// Room geometry in the room's local frame.
///
/// Implementors only report where a ray crosses their boundary; the parity
/// rule in [`RoomVolume::contains`] is shared.
pub trait RoomVolume: Send + Sync + std::fmt::Debug {
    /// Distances along `ray` (strictly ahead of the origin, at most
    /// `max_distance`) at which it crosses the boundary, sorted ascending.
    fn crossings(&self, ray: &Ray, max_distance: f64) -> Vec<f64>;

    /// Bounding box of the volume.  The containment resolver rejects points
    /// outside it before casting the probe ray.
    fn bounds(&self) -> Aabb;

    /// Parity containment along +Z: at least one crossing within
    /// `probe_distance` and an odd crossing count.
    fn contains(&self, point: Vec3, probe_distance: f64) -> bool {
        let hits = self.crossings(&Ray::probe(point), probe_distance);
        !hits.is_empty() && hits.len() % 2 == 1
    }
}

/// Sort, drop hits at or behind the origin or past `max_distance`, and merge
/// coincident hits (a ray through a shared edge reports both triangles).
fn normalise_hits(mut hits: Vec<f64>, max_distance: f64) -> Vec<f64> {
    hits.retain(|t| *t > HIT_EPSILON && *t <= max_distance);
    hits.sort_by(f64::total_cmp);
    hits.dedup_by(|b, a| (*b - *a).abs() < HIT_EPSILON);
    hits
}

// ────────────────────────────────────────────────────────────────────────────
// BoxVolume
// ────────────────────────────────────────────────────────────────────────────

/// A room modelled as an axis-aligned box in its own frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxVolume {
    aabb: Aabb,
}

impl BoxVolume {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self { aabb: Aabb::new(a, b) }
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }
}

impl RoomVolume for BoxVolume {
    fn crossings(&self, ray: &Ray, max_distance: f64) -> Vec<f64> {
        match self.aabb.ray_interval(ray) {
            Some((t_enter, t_exit)) => normalise_hits(vec![t_enter, t_exit], max_distance),
            None => Vec::new(),
        }
    }

    fn bounds(&self) -> Aabb {
        self.aabb
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MeshVolume
// ────────────────────────────────────────────────────────────────────────────

/// A room modelled as a closed triangle mesh in its own frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshVolume {
    triangles: Vec<[Vec3; 3]>,
    bounds: Aabb,
}

impl MeshVolume {
    /// Build from a triangle list.  Returns `None` for an empty mesh.
    pub fn new(triangles: Vec<[Vec3; 3]>) -> Option<Self> {
        let bounds = Aabb::enclosing(triangles.iter().flatten().copied())?;
        Some(Self { triangles, bounds })
    }

    /// Triangulate an axis-aligned box (12 triangles).
    pub fn from_box(a: Vec3, b: Vec3) -> Self {
        let bb = Aabb::new(a, b);
        let (lo, hi) = (bb.min, bb.max);
        let v = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { hi.x } else { lo.x },
                if y { hi.y } else { lo.y },
                if z { hi.z } else { lo.z },
            )
        };
        // Each face as a quad, split along one diagonal.
        let quads = [
            [v(false, false, false), v(true, false, false), v(true, true, false), v(false, true, false)],
            [v(false, false, true), v(true, false, true), v(true, true, true), v(false, true, true)],
            [v(false, false, false), v(true, false, false), v(true, false, true), v(false, false, true)],
            [v(false, true, false), v(true, true, false), v(true, true, true), v(false, true, true)],
            [v(false, false, false), v(false, true, false), v(false, true, true), v(false, false, true)],
            [v(true, false, false), v(true, true, false), v(true, true, true), v(true, false, true)],
        ];
        let triangles = quads
            .iter()
            .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
            .collect();
        Self { triangles, bounds: bb }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Möller–Trumbore ray/triangle intersection; returns the ray parameter.
fn intersect_triangle(ray: &Ray, tri: &[Vec3; 3]) -> Option<f64> {
    let edge1 = tri[1].sub(tri[0]);
    let edge2 = tri[2].sub(tri[0]);
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < HIT_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin.sub(tri[0]);
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some(edge2.dot(q) * inv_det)
}

impl RoomVolume for MeshVolume {
    fn crossings(&self, ray: &Ray, max_distance: f64) -> Vec<f64> {
        let hits = self
            .triangles
            .iter()
            .filter_map(|tri| intersect_triangle(ray, tri))
            .collect();
        normalise_hits(hits, max_distance)
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoxVolume {
        BoxVolume::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0))
    }

    // ── Aabb ────────────────────────────────────────────────────────────────

    #[test]
    fn aabb_normalises_corners() {
        let b = Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.centre(), Vec3::zero());
    }

    #[test]
    fn aabb_overlap_and_point() {
        let a = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let c = Aabb::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(6.0, 6.0, 6.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.contains_point(Vec3::new(2.0, 0.0, 1.0)));
        assert!(!a.contains_point(Vec3::new(2.1, 0.0, 1.0)));
    }

    #[test]
    fn enclosing_of_empty_is_none() {
        assert!(Aabb::enclosing(Vec::new()).is_none());
    }

    #[test]
    fn slab_interval_along_z() {
        let b = Aabb::new(Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 1.0, 4.0));
        let (t0, t1) = b.ray_interval(&Ray::probe(Vec3::new(0.5, 0.5, 0.0))).unwrap();
        assert!((t0 - 2.0).abs() < 1e-12);
        assert!((t1 - 4.0).abs() < 1e-12);
        assert!(b.ray_interval(&Ray::probe(Vec3::new(1.5, 0.5, 0.0))).is_none());
    }

    // ── BoxVolume ───────────────────────────────────────────────────────────

    #[test]
    fn box_contains_interior_point() {
        assert!(unit_box().contains(Vec3::new(0.5, 0.5, 0.5), 100.0));
    }

    #[test]
    fn box_rejects_point_below_on_probe_axis() {
        // The probe enters and leaves: two crossings, even parity.
        let b = unit_box();
        assert_eq!(b.crossings(&Ray::probe(Vec3::new(0.5, 0.5, -1.0)), 100.0).len(), 2);
        assert!(!b.contains(Vec3::new(0.5, 0.5, -1.0), 100.0));
    }

    #[test]
    fn box_rejects_point_beside() {
        assert!(!unit_box().contains(Vec3::new(1.5, 0.5, 0.5), 100.0));
        assert!(!unit_box().contains(Vec3::new(0.5, 0.5, 1.5), 100.0));
    }

    #[test]
    fn short_probe_misses_far_wall() {
        let long = BoxVolume::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 50.0));
        assert!(long.contains(Vec3::new(0.5, 0.5, 1.0), 100.0));
        assert!(!long.contains(Vec3::new(0.5, 0.5, 1.0), 10.0));
    }

    // ── MeshVolume ──────────────────────────────────────────────────────────

    #[test]
    fn empty_mesh_is_rejected() {
        assert!(MeshVolume::new(Vec::new()).is_none());
    }

    #[test]
    fn mesh_box_has_twelve_triangles() {
        let m = MeshVolume::from_box(Vec3::zero(), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(m.triangle_count(), 12);
        assert_eq!(m.bounds().max, Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn mesh_agrees_with_box() {
        let b = BoxVolume::new(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(3.0, 2.5, 6.0));
        let m = MeshVolume::from_box(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(3.0, 2.5, 6.0));
        for p in [
            Vec3::new(0.3, 1.1, 0.7),
            Vec3::new(2.9, 0.2, 5.9),
            Vec3::new(0.3, 1.1, -5.0),
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(0.3, 3.0, 0.0),
        ] {
            assert_eq!(b.contains(p, 100.0), m.contains(p, 100.0), "disagree at {p:?}");
        }
    }

    #[test]
    fn shared_edge_hit_is_counted_once() {
        // The probe from the centre passes exactly through the top face's
        // diagonal, which both of its triangles report.
        let m = MeshVolume::from_box(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        let hits = m.crossings(&Ray::probe(Vec3::new(0.5, 0.5, 0.5)), 100.0);
        assert_eq!(hits.len(), 1);
        assert!(m.contains(Vec3::new(0.5, 0.5, 0.5), 100.0));
    }

    #[test]
    fn single_triangle_intersection() {
        let tri = [
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(1.0, -1.0, 2.0),
            Vec3::new(0.0, 1.0, 2.0),
        ];
        let t = intersect_triangle(&Ray::probe(Vec3::zero()), &tri).unwrap();
        assert!((t - 2.0).abs() < 1e-12);
        assert!(intersect_triangle(&Ray::probe(Vec3::new(5.0, 0.0, 0.0)), &tri).is_none());
    }
}
