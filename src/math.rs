//! Small geometry toolkit shared by the portal, frustum and lighting code.
//!
//! Vectors and matrices come from `glam`; this module adds the reversible
//! "other/this" transform used across sector boundaries, planes, and the
//! handful of predicates the traversal relies on.

use std::ops::{Div, Mul};

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// Tolerance used for intensity and degeneracy checks.
pub const SMALL_EPSILON: f32 = 0.000_001;

/// Geometric tolerance for side classification.
pub const EPSILON: f32 = 0.001;

/// A rigid (or mirroring) transformation between an "other" space and a
/// "this" space.
///
/// `other_to_this(v) = m_o2t * (v - v_o2t)`. The inverse matrix is cached so
/// that points can be moved both ways without recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    m_o2t: Mat3,
    m_t2o: Mat3,
    v_o2t: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        m_o2t: Mat3::IDENTITY,
        m_t2o: Mat3::IDENTITY,
        v_o2t: Vec3::ZERO,
    };

    /// Builds a transform from its other-to-this matrix and the position of
    /// the "this" origin expressed in "other" space.
    pub fn new(m_o2t: Mat3, v_o2t: Vec3) -> Self {
        Self {
            m_o2t,
            m_t2o: m_o2t.inverse(),
            v_o2t,
        }
    }

    /// Pure translation: `other_to_this(v) = v - offset`.
    pub fn translation(offset: Vec3) -> Self {
        Self::new(Mat3::IDENTITY, offset)
    }

    /// Reflection through the plane with the given normal passing through
    /// `point`.
    pub fn reflection(normal: Vec3, point: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        let m = Mat3::IDENTITY - 2.0 * outer(n, n);
        Self::new(m, point - m * point)
    }

    pub fn o2t(&self) -> Mat3 {
        self.m_o2t
    }

    pub fn t2o(&self) -> Mat3 {
        self.m_t2o
    }

    pub fn origin(&self) -> Vec3 {
        self.v_o2t
    }

    pub fn other_to_this(&self, v: Vec3) -> Vec3 {
        self.m_o2t * (v - self.v_o2t)
    }

    pub fn other_to_this_relative(&self, v: Vec3) -> Vec3 {
        self.m_o2t * v
    }

    pub fn this_to_other(&self, v: Vec3) -> Vec3 {
        self.m_t2o * v + self.v_o2t
    }

    pub fn this_to_other_relative(&self, v: Vec3) -> Vec3 {
        self.m_t2o * v
    }

    pub fn inverse(&self) -> Self {
        Self {
            m_o2t: self.m_t2o,
            m_t2o: self.m_o2t,
            v_o2t: -(self.m_o2t * self.v_o2t),
        }
    }

    /// True when the rotation part flips handedness, i.e. the triple product
    /// of its columns is negative.
    pub fn is_mirroring(&self) -> bool {
        let m = self.m_o2t;
        m.x_axis.cross(m.y_axis).dot(m.z_axis) < 0.0
    }

    /// Expresses a plane given in "other" space in "this" space.
    pub fn other_to_this_plane(&self, plane: &Plane) -> Plane {
        // x_other = m_t2o * y + v_o2t
        let normal = self.m_t2o.transpose() * plane.normal;
        let d = plane.normal.dot(self.v_o2t) + plane.d;
        Plane::new(normal, d).normalized()
    }

    /// Component-wise comparison within `tolerance`.
    pub fn approx_eq(&self, other: &Transform, tolerance: f32) -> bool {
        self.m_o2t.abs_diff_eq(other.m_o2t, tolerance)
            && self.v_o2t.abs_diff_eq(other.v_o2t, tolerance)
    }
}

/// `a * b` applies `b` first, then `a`.
impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform {
            m_o2t: self.m_o2t * rhs.m_o2t,
            m_t2o: rhs.m_t2o * self.m_t2o,
            v_o2t: rhs.v_o2t + rhs.m_t2o * self.v_o2t,
        }
    }
}

/// `a / b` applies the inverse of `b` first, then `a`.
impl Div for Transform {
    type Output = Transform;

    fn div(self, rhs: Transform) -> Transform {
        self * rhs.inverse()
    }
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Plane `normal . p + d = 0`. The front side is where the normal points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub const fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Plane through `point` with the given normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self::new(normal, -normal.dot(point)).normalized()
    }

    /// Newell's method; vertices wound counter-clockwise seen from the
    /// front. Returns `None` for degenerate input.
    pub fn from_polygon(vertices: &[Vec3]) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let mut normal = Vec3::ZERO;
        let mut center = Vec3::ZERO;
        let mut prev = vertices[vertices.len() - 1];
        for &v in vertices {
            normal.x += (prev.y - v.y) * (prev.z + v.z);
            normal.y += (prev.z - v.z) * (prev.x + v.x);
            normal.z += (prev.x - v.x) * (prev.y + v.y);
            center += v;
            prev = v;
        }
        if normal.length_squared() < SMALL_EPSILON * SMALL_EPSILON {
            return None;
        }
        let center = center / vertices.len() as f32;
        Some(Self::from_point_normal(center, normal.normalize()))
    }

    pub fn classify(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    pub fn inverted(&self) -> Self {
        Self::new(-self.normal, -self.d)
    }

    pub fn normalized(&self) -> Self {
        let len = self.normal.length();
        if len <= SMALL_EPSILON {
            return *self;
        }
        Self::new(self.normal / len, self.d / len)
    }

    /// The same plane expressed relative to `origin`.
    pub fn relative_to(&self, origin: Vec3) -> Self {
        Self::new(self.normal, self.classify(origin))
    }
}

/// Sign of the signed volume spanned by `p`, `v1` and `v2`:
/// `1` when `p . (v1 x v2)` is positive, `-1` when negative, `0` on the plane.
pub fn which_side_3d(p: Vec3, v1: Vec3, v2: Vec3) -> i32 {
    let s = p.dot(v1.cross(v2));
    if s > 0.0 {
        1
    } else if s < 0.0 {
        -1
    } else {
        0
    }
}

/// Intersects the segment `start..end` with `plane`. Returns the point and
/// the parametric distance along the segment.
pub fn intersect_segment_plane(start: Vec3, end: Vec3, plane: &Plane) -> Option<(Vec3, f32)> {
    let dir = end - start;
    let denom = plane.normal.dot(dir);
    if denom.abs() < SMALL_EPSILON {
        return None;
    }
    let r = -plane.classify(start) / denom;
    if !(0.0..=1.0).contains(&r) {
        return None;
    }
    Some((start + dir * r, r))
}

/// Point-in-convex-polygon test for a point already lying on the polygon
/// plane.
pub fn polygon_contains(vertices: &[Vec3], normal: Vec3, point: Vec3) -> bool {
    let mut prev = vertices[vertices.len() - 1];
    for &v in vertices {
        if (v - prev).cross(point - prev).dot(normal) < -EPSILON {
            return false;
        }
        prev = v;
    }
    true
}

/// Area of a planar polygon.
pub fn polygon_area(vertices: &[Vec3]) -> f32 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = Vec3::ZERO;
    let origin = vertices[0];
    for pair in vertices[1..].windows(2) {
        sum += (pair[0] - origin).cross(pair[1] - origin);
    }
    sum.length() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn inverse_round_trips_points() {
        let t = Transform::new(
            Mat3::from_quat(Quat::from_rotation_y(0.7)),
            Vec3::new(1.0, -2.0, 3.0),
        );
        let p = Vec3::new(4.0, 5.0, -6.0);
        let back = t.inverse().other_to_this(t.other_to_this(p));
        assert!(back.abs_diff_eq(p, 1e-4));
        assert!(t.this_to_other(t.other_to_this(p)).abs_diff_eq(p, 1e-4));
    }

    #[test]
    fn product_applies_right_operand_first() {
        let a = Transform::translation(Vec3::X);
        let b = Transform::new(Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2), Vec3::ZERO);
        let p = Vec3::new(1.0, 0.0, 0.0);
        let expected = a.other_to_this(b.other_to_this(p));
        assert!((a * b).other_to_this(p).abs_diff_eq(expected, 1e-5));
        assert!((a / b).other_to_this(p).abs_diff_eq(a.other_to_this(b.this_to_other(p)), 1e-5));
    }

    #[test]
    fn reflection_is_mirroring() {
        let mirror = Transform::reflection(Vec3::X, Vec3::new(2.0, 0.0, 0.0));
        assert!(mirror.is_mirroring());
        let p = mirror.other_to_this(Vec3::new(1.0, 3.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(3.0, 3.0, 0.0), 1e-5));
        assert!(!Transform::IDENTITY.is_mirroring());
    }

    #[test]
    fn plane_from_counter_clockwise_polygon_faces_viewer() {
        let quad = [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let plane = Plane::from_polygon(&quad).unwrap();
        assert!(plane.classify(Vec3::new(0.0, 0.0, 5.0)) > 0.0);
        assert!((polygon_area(&quad) - 4.0).abs() < 1e-5);
        assert!(polygon_contains(&quad, plane.normal, Vec3::ZERO));
        assert!(!polygon_contains(&quad, plane.normal, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn plane_survives_transform() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 2.0), Vec3::Z);
        let t = Transform::translation(Vec3::new(0.0, 0.0, 1.0));
        let moved = t.other_to_this_plane(&plane);
        let point = t.other_to_this(Vec3::new(3.0, 1.0, 2.0));
        assert!(moved.classify(point).abs() < 1e-5);
    }

    #[test]
    fn segment_hits_plane_inside_range_only() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Y);
        let hit = intersect_segment_plane(Vec3::Y, -Vec3::Y, &plane).unwrap();
        assert!((hit.1 - 0.5).abs() < 1e-6);
        assert!(intersect_segment_plane(Vec3::Y, Vec3::new(0.0, 0.5, 0.0), &plane).is_none());
    }
}
