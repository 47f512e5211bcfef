//! Light and shadow frustums.
//!
//! A frustum is an apex (`origin`) plus a convex polygon whose vertices are
//! stored relative to that apex. It may be infinite (everything is inside),
//! empty, and may carry a back plane that cuts away everything between the
//! apex and the plane.

use std::rc::Rc;

use glam::Vec3;

use crate::math::{polygon_area, Plane, Transform, SMALL_EPSILON};
use crate::world::PolygonId;

const CLIP_TOLERANCE: f32 = 0.000_01;

#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    origin: Vec3,
    vertices: Vec<Vec3>,
    backplane: Option<Plane>,
    wide: bool,
    mirrored: bool,
}

impl Frustum {
    /// A frustum that contains all of space.
    pub fn infinite(origin: Vec3) -> Self {
        Self {
            origin,
            vertices: Vec::new(),
            backplane: None,
            wide: true,
            mirrored: false,
        }
    }

    pub fn empty(origin: Vec3) -> Self {
        Self {
            origin,
            vertices: Vec::new(),
            backplane: None,
            wide: false,
            mirrored: false,
        }
    }

    /// Frustum spanned by a polygon given relative to `origin`.
    pub fn from_polygon(origin: Vec3, vertices: Vec<Vec3>) -> Self {
        Self {
            origin,
            vertices,
            backplane: None,
            wide: false,
            mirrored: false,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Vertices relative to the origin.
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Vertices in absolute coordinates.
    pub fn world_vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(move |v| *v + self.origin)
    }

    pub fn is_infinite(&self) -> bool {
        self.wide
    }

    pub fn is_empty(&self) -> bool {
        !self.wide && self.vertices.len() < 3
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    pub fn backplane(&self) -> Option<&Plane> {
        self.backplane.as_ref()
    }

    /// Sets a back plane given relative to the origin. Points are kept where
    /// the plane classifies them as `<= 0`.
    pub fn set_backplane(&mut self, plane: Plane) {
        self.backplane = Some(plane);
    }

    /// Uses a world-space plane as back plane, oriented so that the apex is
    /// on the discarded side.
    pub fn set_backplane_behind(&mut self, world_plane: &Plane) {
        let mut rel = world_plane.relative_to(self.origin);
        if rel.d < 0.0 {
            rel = rel.inverted();
        }
        self.backplane = Some(rel);
    }

    pub fn remove_backplane(&mut self) {
        self.backplane = None;
    }

    pub fn make_infinite(&mut self) {
        self.vertices.clear();
        self.backplane = None;
        self.wide = true;
        self.mirrored = false;
    }

    pub fn make_empty(&mut self) {
        self.vertices.clear();
        self.backplane = None;
        self.wide = false;
        self.mirrored = false;
    }

    /// Moves the frustum from "other" into "this" space of `t`.
    pub fn transform(&mut self, t: &Transform) {
        self.origin = t.other_to_this(self.origin);
        for v in &mut self.vertices {
            *v = t.other_to_this_relative(*v);
        }
        if let Some(plane) = self.backplane {
            // Relative coordinates only rotate.
            let normal = t.t2o().transpose() * plane.normal;
            self.backplane = Some(Plane::new(normal, plane.d).normalized());
        }
    }

    pub fn transformed(&self, t: &Transform) -> Self {
        let mut copy = self.clone();
        copy.transform(t);
        copy
    }

    /// Inward facing, unit length normals of the side planes. Orientation is
    /// taken from the polygon centroid so either winding works.
    fn side_normals(&self) -> Vec<Vec3> {
        let n = self.vertices.len();
        let centroid = self.vertices.iter().copied().sum::<Vec3>() / n as f32;
        let mut normals = Vec::with_capacity(n);
        let mut prev = self.vertices[n - 1];
        for &v in &self.vertices {
            let normal = prev.cross(v);
            prev = v;
            if normal.length_squared() < SMALL_EPSILON * SMALL_EPSILON {
                continue;
            }
            let normal = normal.normalize();
            normals.push(if normal.dot(centroid) < 0.0 { -normal } else { normal });
        }
        normals
    }

    /// Clips a polygon (relative to the origin) against this frustum.
    pub fn clip_polygon(&self, poly: &[Vec3]) -> Option<Vec<Vec3>> {
        if self.is_empty() || poly.len() < 3 {
            return None;
        }
        let mut clipped = poly.to_vec();
        if !self.wide {
            for normal in self.side_normals() {
                clipped = clip_to_half_space(&clipped, |p| normal.dot(p));
                if clipped.len() < 3 {
                    return None;
                }
            }
        }
        if let Some(plane) = self.backplane {
            clipped = clip_to_half_space(&clipped, |p| -plane.classify(p));
            if clipped.len() < 3 {
                return None;
            }
        }
        if polygon_area(&clipped) < SMALL_EPSILON * SMALL_EPSILON {
            return None;
        }
        Some(clipped)
    }

    /// Intersection with a polygon given relative to the origin. The result
    /// has no back plane and inherits the mirror flag.
    pub fn intersect(&self, poly: &[Vec3]) -> Option<Frustum> {
        let vertices = self.clip_polygon(poly)?;
        let mut frustum = Frustum::from_polygon(self.origin, vertices);
        frustum.mirrored = self.mirrored;
        Some(frustum)
    }

    /// Intersection with another frustum sharing the same origin.
    pub fn intersect_frustum(&self, other: &Frustum) -> Option<Frustum> {
        if other.is_empty() {
            return None;
        }
        if other.is_infinite() {
            return (!self.is_empty()).then(|| self.clone());
        }
        self.intersect(&other.vertices)
    }

    /// Tests a point given relative to the origin.
    pub fn contains(&self, point: Vec3) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(plane) = self.backplane {
            if plane.classify(point) > 0.0 {
                return false;
            }
        }
        if self.wide {
            return true;
        }
        self.side_normals()
            .into_iter()
            .all(|normal| normal.dot(point) >= -CLIP_TOLERANCE)
    }
}

/// Sutherland-Hodgman against a single half space `distance(p) >= 0`.
fn clip_to_half_space(poly: &[Vec3], distance: impl Fn(Vec3) -> f32) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(poly.len() + 2);
    let mut prev = poly[poly.len() - 1];
    let mut prev_d = distance(prev);
    for &cur in poly {
        let cur_d = distance(cur);
        let prev_in = prev_d >= -CLIP_TOLERANCE;
        let cur_in = cur_d >= -CLIP_TOLERANCE;
        if prev_in != cur_in {
            let t = prev_d / (prev_d - cur_d);
            out.push(prev + (cur - prev) * t);
        }
        if cur_in {
            out.push(cur);
        }
        prev = cur;
        prev_d = cur_d;
    }
    out
}

/// Volume of space hidden from a light by one occluding polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowFrustum {
    pub frustum: Frustum,
    /// Polygon casting the shadow.
    pub polygon: PolygonId,
}

impl ShadowFrustum {
    /// Shadow of `occluder` (world-space vertices and plane) as seen from
    /// `origin`.
    pub fn from_occluder(origin: Vec3, polygon: PolygonId, vertices: &[Vec3], plane: &Plane) -> Self {
        let mut frustum =
            Frustum::from_polygon(origin, vertices.iter().map(|v| *v - origin).collect());
        frustum.set_backplane_behind(plane);
        Self { frustum, polygon }
    }

    /// A shadow matters to a receiver when it is cast by another polygon
    /// and overlaps the receiver's own light frustum.
    pub fn is_relevant_to(&self, receiver: PolygonId, receiver_frustum: &Frustum) -> bool {
        self.polygon != receiver
            && self
                .frustum
                .intersect_frustum(receiver_frustum)
                .is_some()
    }
}

/// Persistent singly linked list of shadows.
///
/// Pushing shares the existing tail and filtering shares the shadow frustums
/// themselves, so a branch of the traversal can never observe what a
/// sibling branch appended.
#[derive(Debug, Clone, Default)]
pub struct ShadowList {
    head: Option<Rc<ShadowNode>>,
    len: usize,
}

#[derive(Debug)]
struct ShadowNode {
    shadow: Rc<ShadowFrustum>,
    next: Option<Rc<ShadowNode>>,
}

impl ShadowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a list with `shadow` in front; `self` is left untouched.
    pub fn with(&self, shadow: ShadowFrustum) -> Self {
        self.with_shared(Rc::new(shadow))
    }

    fn with_shared(&self, shadow: Rc<ShadowFrustum>) -> Self {
        Self {
            head: Some(Rc::new(ShadowNode {
                shadow,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn iter(&self) -> ShadowIter<'_> {
        ShadowIter {
            next: self.head.as_deref(),
        }
    }

    fn from_shared(shadows: Vec<Rc<ShadowFrustum>>) -> Self {
        shadows
            .into_iter()
            .rev()
            .fold(Self::new(), |list, shadow| list.with_shared(shadow))
    }

    /// Keeps only the shadows relevant to `receiver`.
    pub fn relevant_to(&self, receiver: PolygonId, receiver_frustum: &Frustum) -> Self {
        let mut kept = Vec::new();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if n.shadow.is_relevant_to(receiver, receiver_frustum) {
                kept.push(Rc::clone(&n.shadow));
            }
            node = n.next.as_deref();
        }
        Self::from_shared(kept)
    }

    /// Deep copy with every frustum moved through `t`.
    pub fn transformed(&self, t: &Transform) -> Self {
        let copies = self
            .iter()
            .map(|shadow| {
                Rc::new(ShadowFrustum {
                    frustum: shadow.frustum.transformed(t),
                    polygon: shadow.polygon,
                })
            })
            .collect();
        Self::from_shared(copies)
    }

    /// True when both lists start with the very same shadow allocation.
    pub fn shares_head_with(&self, other: &ShadowList) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a.shadow, &b.shadow),
            _ => false,
        }
    }
}

pub struct ShadowIter<'a> {
    next: Option<&'a ShadowNode>,
}

impl<'a> Iterator for ShadowIter<'a> {
    type Item = &'a ShadowFrustum;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.shadow)
    }
}
