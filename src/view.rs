//! Traversal state carried through sectors: light views for shadow and
//! lighting passes, render views for drawing, and the per-sector busy
//! counters that cut portal cycles.

use glam::Vec3;

use crate::frustum::{Frustum, ShadowList};
use crate::math::{Plane, Transform, SMALL_EPSILON};
use crate::world::{PolygonId, SectorId, World};

/// Light (or radiosity shoot) travelling through the world.
#[derive(Debug, Clone)]
pub struct FrustumView {
    pub light_frustum: Frustum,
    pub shadows: ShadowList,
    /// Colour filter accumulated through tinted portals.
    pub filter: Vec3,
    pub mirror: bool,
    pub dynamic: bool,
    /// Whether shadow casting polygons add shadow frustums.
    pub things_shadow: bool,
    /// Polygons whose plane is farther from the light are ignored.
    pub radius: f32,
    /// Warps collected on the way: maps the space the view started in to
    /// the space of the sector it is in now.
    pub warp: Transform,
}

impl FrustumView {
    /// Unrestricted view from `origin`.
    pub fn new(origin: Vec3, radius: f32) -> Self {
        Self {
            light_frustum: Frustum::infinite(origin),
            shadows: ShadowList::new(),
            filter: Vec3::ONE,
            mirror: false,
            dynamic: false,
            things_shadow: true,
            radius,
            warp: Transform::IDENTITY,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.light_frustum.origin()
    }

    /// True once every filter channel has decayed below `SMALL_EPSILON`.
    pub fn is_extinct(&self) -> bool {
        self.filter.max_element() < SMALL_EPSILON
    }

    /// Same flags and filter, different frustum and shadows.
    pub fn restricted(&self, light_frustum: Frustum, shadows: ShadowList) -> Self {
        Self {
            light_frustum,
            shadows,
            ..self.clone()
        }
    }
}

/// A polygon reached by a light view. `view.light_frustum` is the light
/// frustum clipped to the polygon and `view.shadows` only holds shadows
/// relevant to it.
#[derive(Debug, Clone)]
pub struct PolygonHit {
    pub polygon: PolygonId,
    pub sector: SectorId,
    pub view: FrustumView,
}

pub trait FrustumVisitor {
    fn visit_polygon(&mut self, world: &World, hit: &PolygonHit);
}

impl<F> FrustumVisitor for F
where
    F: FnMut(&World, &PolygonHit),
{
    fn visit_polygon(&mut self, world: &World, hit: &PolygonHit) {
        self(world, hit)
    }
}

/// How many times each sector is on the current traversal path.
#[derive(Debug, Clone)]
pub struct BusyCounters {
    counts: Vec<u32>,
    limit: u32,
}

impl BusyCounters {
    pub fn new(sectors: usize, limit: u32) -> Self {
        Self {
            counts: vec![0; sectors],
            limit,
        }
    }

    pub fn depth(&self, sector: SectorId) -> u32 {
        self.counts.get(sector.0).copied().unwrap_or(0)
    }

    /// A sector already entered `limit` times may not be entered again.
    pub fn is_exhausted(&self, sector: SectorId) -> bool {
        self.depth(sector) >= self.limit
    }

    pub fn enter(&mut self, sector: SectorId) {
        if let Some(count) = self.counts.get_mut(sector.0) {
            *count += 1;
        }
    }

    pub fn leave(&mut self, sector: SectorId) {
        if let Some(count) = self.counts.get_mut(sector.0) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Camera state for a draw traversal.
#[derive(Debug, Clone)]
pub struct RenderView {
    /// World (other) to camera (this).
    pub camera: Transform,
    pub mirrored: bool,
    /// Visible region, apex at the eye, in the current sector's space.
    pub clip: Frustum,
    /// Geometry on the negative side is not drawn.
    pub clip_plane: Option<Plane>,
}

impl RenderView {
    pub fn new(camera: Transform) -> Self {
        Self {
            camera,
            mirrored: false,
            clip: Frustum::infinite(camera.origin()),
            clip_plane: None,
        }
    }

    /// Eye position in the current sector's space.
    pub fn eye(&self) -> Vec3 {
        self.camera.origin()
    }

    /// Clip volume including the clip plane, ready to clip polygons given
    /// relative to the eye.
    pub fn clip_volume(&self) -> Frustum {
        let mut volume = self.clip.clone();
        if let Some(plane) = self.clip_plane {
            volume.set_backplane(plane.relative_to(self.eye()).inverted());
        }
        volume
    }
}

/// A polygon handed to a draw sink, vertices in camera space.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnPolygon {
    pub polygon: PolygonId,
    pub sector: SectorId,
    pub vertices: Vec<Vec3>,
    pub mirrored: bool,
    /// Number of portals crossed to reach it.
    pub depth: u32,
}

pub trait DrawSink {
    fn draw_polygon(&mut self, polygon: DrawnPolygon);
}

impl DrawSink for Vec<DrawnPolygon> {
    fn draw_polygon(&mut self, polygon: DrawnPolygon) {
        self.push(polygon);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCookie(u32);

/// Hands out per camera frame state for warped views and takes it back
/// when the traversal leaves the warped sector.
#[derive(Debug, Default)]
pub struct TransformManager {
    open: Vec<FrameCookie>,
    next: u32,
    frames_created: u32,
    deepest: usize,
}

impl TransformManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_camera_frame(&mut self) -> FrameCookie {
        let cookie = FrameCookie(self.next);
        self.next += 1;
        self.frames_created += 1;
        self.open.push(cookie);
        self.deepest = self.deepest.max(self.open.len());
        cookie
    }

    /// Drops `cookie` and every frame opened after it.
    pub fn restore_camera_frame(&mut self, cookie: FrameCookie) {
        if let Some(pos) = self.open.iter().position(|c| *c == cookie) {
            self.open.truncate(pos);
        }
    }

    pub fn open_frames(&self) -> usize {
        self.open.len()
    }

    pub fn frames_created(&self) -> u32 {
        self.frames_created
    }

    pub fn deepest(&self) -> usize {
        self.deepest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub portals_drawn: u32,
    pub polygons_drawn: u32,
    pub max_depth: u32,
}
