//! Portals: polygons that lead into another sector, optionally warping
//! and mirroring space on the way.

use glam::{Mat3, Vec3};

use crate::frustum::Frustum;
use crate::lightmap::Texture;
use crate::math::Transform;
use crate::view::{BusyCounters, DrawStats, FrameCookie, FrustumView, RenderView, TransformManager};
use crate::world::{Polygon, SectorId};

/// Colour applied to anything travelling through a portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortalFilter {
    None,
    /// Flat tint, channels in `[0, 1]`.
    Flat(Vec3),
    /// Mean colour of a texture, scaled to `[0, 1]`.
    Texture(Vec3),
}

impl PortalFilter {
    pub fn color(&self) -> Option<Vec3> {
        match self {
            PortalFilter::None => None,
            PortalFilter::Flat(c) | PortalFilter::Texture(c) => Some(*c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    destination: Option<SectorId>,
    warp_obj: Transform,
    warp_wor: Transform,
    do_warp: bool,
    do_mirror: bool,
    static_dest: bool,
    clip_destination: bool,
    filter: PortalFilter,
}

/// Where a beam continues after passing a portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamStep {
    pub sector: SectorId,
    pub start: Vec3,
    pub end: Vec3,
    /// Warp that moved the beam, if any.
    pub warp: Option<Transform>,
}

impl Portal {
    pub fn new(destination: SectorId) -> Self {
        Self {
            destination: Some(destination),
            ..Self::incomplete()
        }
    }

    /// A portal whose destination is not known yet.
    pub fn incomplete() -> Self {
        Self {
            destination: None,
            warp_obj: Transform::IDENTITY,
            warp_wor: Transform::IDENTITY,
            do_warp: false,
            do_mirror: false,
            static_dest: false,
            clip_destination: false,
            filter: PortalFilter::None,
        }
    }

    /// A mirror: leads back into `sector`, reflected through `polygon`'s
    /// plane.
    pub fn mirror(sector: SectorId, polygon: &Polygon) -> Self {
        let mut portal = Self::new(sector);
        portal.set_warp(Transform::reflection(polygon.normal(), polygon.vertices()[0]));
        portal
    }

    pub fn destination(&self) -> Option<SectorId> {
        self.destination
    }

    pub fn set_destination(&mut self, sector: SectorId) {
        self.destination = Some(sector);
    }

    /// Installs an object space warp. The world warp is reset to it until
    /// the next `object_to_world`.
    pub fn set_warp(&mut self, t: Transform) {
        self.do_warp = true;
        self.warp_obj = t;
        self.do_mirror = t.is_mirroring();
        self.warp_wor = t;
    }

    /// Warp given as a matrix plus the positions before and after it:
    /// `this_to_other(p) = m * (p - before) + after`.
    pub fn set_warp_matrix(&mut self, m: Mat3, before: Vec3, after: Vec3) {
        self.set_warp(Transform::new(m.inverse(), after - m * before));
    }

    /// Must be called whenever the polygon holding the portal moves.
    pub fn object_to_world(&mut self, t: &Transform) {
        self.warp_wor = if self.static_dest {
            self.warp_obj
        } else {
            t.inverse() * self.warp_obj * *t
        };
    }

    /// `t := t / warp`, toggling `mirror` for mirroring portals.
    pub fn warp_space(&self, t: &mut Transform, mirror: &mut bool) {
        *t = *t / self.warp_wor;
        if self.do_mirror {
            *mirror = !*mirror;
        }
    }

    pub fn is_warping(&self) -> bool {
        self.do_warp
    }

    pub fn is_mirroring(&self) -> bool {
        self.do_mirror
    }

    pub fn object_warp(&self) -> &Transform {
        &self.warp_obj
    }

    pub fn world_warp(&self) -> &Transform {
        &self.warp_wor
    }

    pub fn set_static_destination(&mut self, static_dest: bool) {
        self.static_dest = static_dest;
    }

    pub fn is_static_destination(&self) -> bool {
        self.static_dest
    }

    /// Whether views through this portal clip away everything in front of
    /// the portal plane.
    pub fn set_clip_destination(&mut self, clip: bool) {
        self.clip_destination = clip;
    }

    pub fn clips_destination(&self) -> bool {
        self.clip_destination
    }

    pub fn set_filter(&mut self, color: Vec3) {
        self.filter = PortalFilter::Flat(color);
    }

    pub fn set_texture_filter(&mut self, texture: &Texture) {
        self.filter = PortalFilter::Texture(texture.mean_color() / 255.0);
    }

    pub fn clear_filter(&mut self) {
        self.filter = PortalFilter::None;
    }

    pub fn filter(&self) -> PortalFilter {
        self.filter
    }

    /// Moves a transform and a position through the portal.
    pub fn follow_segment(&self, t: &mut Transform, position: &mut Vec3, mirror: &mut bool) -> Option<SectorId> {
        if self.do_warp {
            self.warp_space(t, mirror);
            *position = self.warp_wor.other_to_this(*position);
        }
        self.destination
    }

    /// Sends a beam that hit the portal at `hit` on towards `end`.
    pub fn hit_beam(&self, hit: Vec3, end: Vec3, busy: &BusyCounters) -> Option<BeamStep> {
        let sector = self.destination?;
        if busy.is_exhausted(sector) {
            return None;
        }
        Some(if self.do_warp {
            BeamStep {
                sector,
                start: self.warp_wor.other_to_this(hit),
                end: self.warp_wor.other_to_this(end),
                warp: Some(self.warp_wor),
            }
        } else {
            BeamStep {
                sector,
                start: hit,
                end,
                warp: None,
            }
        })
    }

    /// Light analog of `draw`. `view` is the light already clipped to the
    /// portal polygon with only the shadows relevant to it. Returns the view
    /// to continue with in the destination sector, or `None` when the light
    /// stops here.
    pub fn check_frustum(
        &self,
        view: &FrustumView,
        polygon: &Polygon,
        busy: &BusyCounters,
    ) -> Option<(SectorId, FrustumView)> {
        let sector = self.destination?;
        if busy.is_exhausted(sector) {
            return None;
        }
        let mut next = view.clone();
        next.light_frustum.set_backplane_behind(polygon.plane());
        if let Some(color) = self.filter.color() {
            next.filter *= color;
        }
        if next.is_extinct() {
            return None;
        }
        if self.do_warp {
            next.light_frustum.transform(&self.warp_wor);
            next.shadows = next.shadows.transformed(&self.warp_wor);
            next.warp = self.warp_wor * next.warp;
            if self.do_mirror {
                next.mirror = !next.mirror;
                next.light_frustum.set_mirrored(next.mirror);
            }
        }
        Some((sector, next))
    }

    /// Prepares the view of the destination sector as seen through the
    /// visible part of the portal (`visible`, world space). Returns the
    /// sector to draw, its view, and the camera frame to restore once that
    /// sector is done.
    pub fn draw(
        &self,
        visible: &[Vec3],
        polygon: &Polygon,
        view: &RenderView,
        busy: &BusyCounters,
        transforms: &mut TransformManager,
        stats: &mut DrawStats,
    ) -> Option<(SectorId, RenderView, Option<FrameCookie>)> {
        let sector = self.destination?;
        if busy.is_exhausted(sector) {
            return None;
        }
        if visible.len() < 3 {
            return None;
        }
        stats.portals_drawn += 1;
        let eye = view.eye();
        let mut clip = Frustum::from_polygon(eye, visible.iter().map(|v| *v - eye).collect());
        clip.set_mirrored(view.mirrored);
        let mut next = RenderView {
            camera: view.camera,
            mirrored: view.mirrored,
            clip,
            clip_plane: self.clip_destination.then(|| polygon.plane().inverted()),
        };
        let mut cookie = None;
        if self.do_warp {
            cookie = Some(transforms.new_camera_frame());
            let mut mirrored = next.mirrored;
            self.warp_space(&mut next.camera, &mut mirrored);
            next.mirrored = mirrored;
            next.clip.transform(&self.warp_wor);
            next.clip.set_mirrored(mirrored);
            next.clip_plane = next.clip_plane.map(|p| self.warp_wor.other_to_this_plane(&p));
        }
        Some((sector, next, cookie))
    }
}
