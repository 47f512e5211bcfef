//! Sector level traversals.
//!
//! Every traversal walks an explicit stack instead of recursing. Entering a
//! sector bumps its busy counter and pushes a matching leave marker, so a
//! portal sees exactly the counters the equivalent recursion would see.

use glam::Vec3;
use log::trace;

use crate::frustum::{ShadowFrustum, ShadowList};
use crate::math::{intersect_segment_plane, polygon_contains, Transform};
use crate::view::{
    BusyCounters, DrawSink, DrawStats, DrawnPolygon, FrameCookie, FrustumView, FrustumVisitor,
    PolygonHit, RenderView, TransformManager,
};
use crate::world::{PolygonId, SectorId, World};

enum LightStep {
    Enter(SectorId, FrustumView),
    Leave(SectorId),
}

enum DrawStep {
    Enter(SectorId, RenderView, u32),
    Leave(SectorId, Option<FrameCookie>),
}

impl World {
    fn busy_counters(&self) -> BusyCounters {
        BusyCounters::new(self.sectors().len(), self.max_portal_depth())
    }

    /// Sends `view` through `sector` and every sector reachable through
    /// portals, reporting each lit polygon to `visitor`.
    pub fn check_frustum(&self, sector: SectorId, view: FrustumView, visitor: &mut impl FrustumVisitor) {
        let mut busy = self.busy_counters();
        let mut stack = vec![LightStep::Enter(sector, view)];
        while let Some(step) = stack.pop() {
            match step {
                LightStep::Leave(sector) => busy.leave(sector),
                LightStep::Enter(sector, view) => {
                    busy.enter(sector);
                    stack.push(LightStep::Leave(sector));
                    let onward = self.check_sector_frustum(sector, &view, &busy, visitor);
                    stack.extend(
                        onward
                            .into_iter()
                            .rev()
                            .map(|(dest, view)| LightStep::Enter(dest, view)),
                    );
                }
            }
        }
    }

    fn check_sector_frustum(
        &self,
        sector: SectorId,
        view: &FrustumView,
        busy: &BusyCounters,
        visitor: &mut impl FrustumVisitor,
    ) -> Vec<(SectorId, FrustumView)> {
        let origin = view.origin();
        let in_range = |plane_distance: f32| plane_distance > 0.0 && plane_distance <= view.radius;

        let mut shadows: ShadowList = view.shadows.clone();
        if view.things_shadow {
            for poly in self.sector_polygons(sector) {
                if !poly.is_shadow_caster() || poly.portal().is_some() {
                    continue;
                }
                if !in_range(poly.plane().classify(origin)) {
                    continue;
                }
                let relative: Vec<Vec3> = poly.vertices().iter().map(|v| *v - origin).collect();
                if view.light_frustum.clip_polygon(&relative).is_some() {
                    shadows = shadows.with(ShadowFrustum::from_occluder(
                        origin,
                        poly.id(),
                        poly.vertices(),
                        poly.plane(),
                    ));
                }
            }
        }

        let mut onward = Vec::new();
        for poly in self.sector_polygons(sector) {
            if !in_range(poly.plane().classify(origin)) {
                continue;
            }
            let relative: Vec<Vec3> = poly.vertices().iter().map(|v| *v - origin).collect();
            let Some(frustum) = view.light_frustum.intersect(&relative) else {
                continue;
            };
            let relevant = shadows.relevant_to(poly.id(), &frustum);
            let hit = PolygonHit {
                polygon: poly.id(),
                sector,
                view: view.restricted(frustum, relevant),
            };
            match poly.portal() {
                Some(portal) => {
                    if let Some(next) = portal.check_frustum(&hit.view, poly, busy) {
                        onward.push(next);
                    } else {
                        trace!("light stops at portal {:?}", poly.id());
                    }
                }
                None => visitor.visit_polygon(self, &hit),
            }
        }
        onward
    }

    /// Draws everything visible from `view` into `sink`.
    pub fn draw(
        &self,
        sector: SectorId,
        view: RenderView,
        sink: &mut impl DrawSink,
        transforms: &mut TransformManager,
    ) -> DrawStats {
        let mut stats = DrawStats::default();
        let mut busy = self.busy_counters();
        let mut stack = vec![DrawStep::Enter(sector, view, 0)];
        while let Some(step) = stack.pop() {
            match step {
                DrawStep::Leave(sector, cookie) => {
                    busy.leave(sector);
                    if let Some(cookie) = cookie {
                        transforms.restore_camera_frame(cookie);
                    }
                }
                DrawStep::Enter(sector, view, depth) => {
                    busy.enter(sector);
                    stats.max_depth = stats.max_depth.max(depth);
                    let onward = self.draw_sector(sector, &view, depth, &busy, sink, transforms, &mut stats);
                    for (dest, next, cookie) in onward.into_iter().rev() {
                        stack.push(DrawStep::Leave(dest, cookie));
                        stack.push(DrawStep::Enter(dest, next, depth + 1));
                    }
                }
            }
        }
        stats
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_sector(
        &self,
        sector: SectorId,
        view: &RenderView,
        depth: u32,
        busy: &BusyCounters,
        sink: &mut impl DrawSink,
        transforms: &mut TransformManager,
        stats: &mut DrawStats,
    ) -> Vec<(SectorId, RenderView, Option<FrameCookie>)> {
        let eye = view.eye();
        let volume = view.clip_volume();
        let mut onward = Vec::new();
        for poly in self.sector_polygons(sector) {
            if !poly.faces(eye) {
                continue;
            }
            let relative: Vec<Vec3> = poly.vertices().iter().map(|v| *v - eye).collect();
            let Some(visible) = volume.clip_polygon(&relative) else {
                continue;
            };
            let visible: Vec<Vec3> = visible.into_iter().map(|v| v + eye).collect();
            if let Some(portal) = poly.portal() {
                if let Some(next) = portal.draw(&visible, poly, view, busy, transforms, stats) {
                    onward.push(next);
                }
                continue;
            }
            stats.polygons_drawn += 1;
            sink.draw_polygon(DrawnPolygon {
                polygon: poly.id(),
                sector,
                vertices: visible.iter().map(|v| view.camera.other_to_this(*v)).collect(),
                mirrored: view.mirrored,
                depth,
            });
        }
        // The leave markers are pushed by the caller, one per entry.
        onward
    }

    /// Nearest polygon of `sector` crossed by the segment, going from its
    /// front side to its back side.
    pub fn intersect_segment(&self, sector: SectorId, start: Vec3, end: Vec3) -> Option<(PolygonId, Vec3)> {
        let mut best: Option<(PolygonId, Vec3, f32)> = None;
        for poly in self.sector_polygons(sector) {
            let plane = poly.plane();
            if plane.classify(start) <= 0.0 || plane.classify(end) > 0.0 {
                continue;
            }
            let Some((point, r)) = intersect_segment_plane(start, end, plane) else {
                continue;
            };
            if !polygon_contains(poly.vertices(), plane.normal, point) {
                continue;
            }
            if best.map_or(true, |(_, _, best_r)| r < best_r) {
                best = Some((poly.id(), point, r));
            }
        }
        best.map(|(id, point, _)| (id, point))
    }

    /// First solid polygon hit by the beam, following portals. The hit point
    /// is returned in the space of `sector`. Beams that run out of portal
    /// depth hit nothing.
    pub fn hit_beam(&self, sector: SectorId, start: Vec3, end: Vec3) -> Option<(PolygonId, Vec3)> {
        let mut busy = self.busy_counters();
        let mut warps: Vec<Transform> = Vec::new();
        let (mut sector, mut start, mut end) = (sector, start, end);
        loop {
            busy.enter(sector);
            let (id, point) = self.intersect_segment(sector, start, end)?;
            let step = match self.polygon(id).and_then(|p| p.portal()) {
                Some(portal) if portal.destination().is_some() => portal.hit_beam(point, end, &busy)?,
                _ => {
                    let point = warps.iter().rev().fold(point, |p, w| w.this_to_other(p));
                    return Some((id, point));
                }
            };
            warps.extend(step.warp);
            sector = step.sector;
            start = step.start;
            end = step.end;
        }
    }

    /// Moves `t` and `new_position` through every portal crossed between
    /// `start` and `new_position`, returning the sector the segment ends in.
    pub fn follow_segment(
        &self,
        sector: SectorId,
        start: Vec3,
        t: &mut Transform,
        new_position: &mut Vec3,
        mirror: &mut bool,
    ) -> SectorId {
        let mut busy = self.busy_counters();
        let (mut sector, mut start) = (sector, start);
        loop {
            busy.enter(sector);
            let Some((id, point)) = self.intersect_segment(sector, start, *new_position) else {
                return sector;
            };
            let Some(portal) = self.polygon(id).and_then(|p| p.portal()) else {
                return sector;
            };
            let Some(dest) = portal.destination() else {
                return sector;
            };
            if busy.is_exhausted(dest) {
                return sector;
            }
            start = if portal.is_warping() {
                portal.world_warp().other_to_this(point)
            } else {
                point
            };
            if let Some(next) = portal.follow_segment(t, new_position, mirror) {
                sector = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::add_room;
    use crate::portal::Portal;
    use crate::world::PolygonDef;

    fn add_box(world: &mut World, sector: SectorId, min: Vec3, max: Vec3) -> Vec<PolygonId> {
        let template = PolygonDef {
            lightmapped: false,
            ..PolygonDef::default()
        };
        add_room(world, sector, min, max, &template).unwrap()
    }

    #[test]
    fn light_reaches_every_wall_of_a_closed_room() {
        let mut world = World::new();
        let s = world.add_sector("room");
        add_box(&mut world, s, Vec3::splat(-1.0), Vec3::splat(1.0));
        let mut seen = Vec::new();
        world.check_frustum(s, FrustumView::new(Vec3::new(0.2, 0.1, 0.0), 100.0), &mut |_: &World, hit: &PolygonHit| {
            seen.push(hit.polygon)
        });
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn segment_picks_nearest_wall() {
        let mut world = World::new();
        let s = world.add_sector("room");
        add_box(&mut world, s, Vec3::splat(-1.0), Vec3::splat(1.0));
        let (id, point) = world
            .intersect_segment(s, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(world.polygon(id).unwrap().name(), "room.east");
        assert!(point.abs_diff_eq(Vec3::X, 1e-5));
        assert!(world.intersect_segment(s, Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0)).is_none());
    }

    #[test]
    fn follow_segment_crosses_into_neighbour() {
        let mut world = World::new();
        let a = world.add_sector("a");
        let b = world.add_sector("b");
        let walls_a = add_box(&mut world, a, Vec3::splat(-1.0), Vec3::splat(1.0));
        add_box(&mut world, b, Vec3::new(1.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
        world.set_portal(walls_a[1], Portal::new(b)).unwrap();
        let mut t = Transform::IDENTITY;
        let mut pos = Vec3::new(2.0, 0.0, 0.0);
        let mut mirror = false;
        let end = world.follow_segment(a, Vec3::ZERO, &mut t, &mut pos, &mut mirror);
        assert_eq!(end, b);
        assert!(!mirror);
        assert_eq!(pos, Vec3::new(2.0, 0.0, 0.0));
    }
}
