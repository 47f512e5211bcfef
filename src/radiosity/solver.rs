use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;

use glam::{IVec3, Vec3};
use log::{debug, info, warn};

use super::heap::PatchHeap;
use super::patch::{round_color, RadPatch};
use super::tree::RadList;
use super::{PatchIndex, PatchQueue};
use crate::config::{QueueKind, RadiosityConfig};
use crate::coverage::shadow_map;
use crate::lightmap::{Lightmap, RgbLightMap};
use crate::math::which_side_3d;
use crate::progress::{NoProgress, ProgressSink};
use crate::view::{FrustumView, PolygonHit};
use crate::world::{Polygon, PolygonId, World};

/// Reach of a shooting patch.
const SHOOT_RADIUS: f32 = 10_000_000.0;
/// Contributions below half a byte step are dropped.
const MIN_CONTRIBUTION: f32 = 0.5 / 256.0;
const MIN_DISTANCE: f32 = 0.000_001;
/// Ceiling on the mean reflectance used for the ambient estimate.
const MAX_MEAN_REFLECTANCE: f32 = 0.99;

/// Why a radiosity run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    NoPolygons,
    PriorityDown(f32),
    IterationsReached(u32),
    LoopDetected,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoPolygons => write!(f, "no polygons to light"),
            StopReason::PriorityDown(priority) => write!(f, "priority down to {priority}"),
            StopReason::IterationsReached(n) => write!(f, "{n} iterations reached"),
            StopReason::LoopDetected => write!(f, "loop detected"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one solver iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum RadiosityStep {
    /// `polygon` shot `priority` worth of light at `receivers` patches.
    Shot {
        polygon: PolygonId,
        priority: f32,
        receivers: usize,
    },
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadiosityReport {
    pub patches: usize,
    pub iterations: u32,
    pub start_priority: f32,
    pub reason: StopReason,
    /// Ambient added to every patch when the run was finished.
    pub ambient: IVec3,
}

/// The light source side of one shot, as seen from a destination.
struct Shooter<'a> {
    patch: &'a RadPatch,
    delta: &'a RgbLightMap,
    colors: &'a RgbLightMap,
    lumels: Vec<Vec3>,
    normal: Vec3,
}

/// A progressive radiosity run over the lightmaps of a world.
///
/// The run borrows the world for its whole length: light moves out of the
/// static maps into the patches when it starts and back when it is
/// finished.
pub struct Radiosity<'w> {
    world: &'w mut World,
    config: RadiosityConfig,
    patches: Vec<RadPatch>,
    by_polygon: HashMap<PolygonId, PatchIndex>,
    queue: Box<dyn PatchQueue>,
    progress: Box<dyn ProgressSink>,
    iterations: u32,
    start_priority: f32,
    started: bool,
    stopped: Option<StopReason>,
}

impl<'w> Radiosity<'w> {
    /// Builds a patch for every lightmapped polygon and takes the world
    /// ambient out of the light they start with.
    pub fn new(world: &'w mut World, config: &RadiosityConfig) -> Self {
        info!("Preparing radiosity");
        let ambient = world.ambient();
        let ids: Vec<PolygonId> = world.lightmapped_polygons().map(Polygon::id).collect();
        let mut patches = Vec::with_capacity(ids.len());
        for id in ids {
            match RadPatch::new(world, id) {
                Some(mut patch) => {
                    patch.remove_ambient(ambient);
                    patches.push(patch);
                }
                None => warn!("skipping polygon {id:?} without a usable lightmap"),
            }
        }
        let mut queue: Box<dyn PatchQueue> = match config.queue {
            QueueKind::Tree => Box::new(RadList::new()),
            QueueKind::Heap => Box::new(PatchHeap::new()),
        };
        let mut by_polygon = HashMap::with_capacity(patches.len());
        for (index, patch) in patches.iter().enumerate() {
            queue.insert(index, patch.priority());
            by_polygon.insert(patch.polygon(), index);
        }
        Self {
            world,
            config: config.clone(),
            patches,
            by_polygon,
            queue,
            progress: Box::new(NoProgress),
            iterations: 0,
            start_priority: 0.0,
            started: false,
            stopped: None,
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn patches(&self) -> &[RadPatch] {
        &self.patches
    }

    pub fn patch_for(&self, polygon: PolygonId) -> Option<&RadPatch> {
        self.by_polygon.get(&polygon).map(|&i| &self.patches[i])
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn start_priority(&self) -> f32 {
        self.start_priority
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stopped.as_ref()
    }

    /// Unshot light summed over all patches.
    pub fn total_unshot(&self) -> f32 {
        self.patches.iter().map(RadPatch::priority).sum()
    }

    /// Records the starting priority. Called by the first `step` if needed.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!("Calculating radiosity ({} lightmaps)", self.patches.len());
        self.progress.restart();
        if let Some((patch, priority)) = self.queue.pop_highest() {
            self.start_priority = priority;
            self.queue.insert(patch, priority);
        }
    }

    /// Shoots the light of the best patch, or reports why the run is over.
    /// Once stopped every further call returns the same reason.
    pub fn step(&mut self) -> RadiosityStep {
        self.start();
        if let Some(reason) = &self.stopped {
            return RadiosityStep::Stopped(reason.clone());
        }
        let src = match self.fetch_next() {
            Ok(src) => src,
            Err(reason) => {
                self.stopped = Some(reason.clone());
                return RadiosityStep::Stopped(reason);
            }
        };
        self.iterations += 1;
        self.progress.pulse();

        let priority = self.patches[src].priority();
        let polygon = self.patches[src].polygon();
        let receivers = self.shoot(src);
        if let Some(lightmap) = self.world.polygon_mut(polygon).ok().and_then(Polygon::lightmap_mut) {
            self.patches[src].copy_and_clear_delta(lightmap.static_map_mut());
        }
        self.queue.insert(src, self.patches[src].priority());
        debug!(
            "iteration {}: {} shot {priority} to {receivers} patches",
            self.iterations,
            self.world.polygon(polygon).map_or("?", Polygon::name)
        );
        RadiosityStep::Shot {
            polygon,
            priority,
            receivers,
        }
    }

    /// Steps until a stop condition holds, then finishes.
    pub fn run(mut self) -> RadiosityReport {
        while let RadiosityStep::Shot { .. } = self.step() {}
        self.finish()
    }

    /// Folds the remaining unshot light and an ambient estimate of it into
    /// the static maps. Ends the run whatever state it is in.
    pub fn finish(mut self) -> RadiosityReport {
        let reason = match self.stopped.take() {
            Some(reason) => reason,
            None => self.stop(StopReason::Cancelled, None),
        };
        let ambient = self.apply_delta_and_ambient();
        RadiosityReport {
            patches: self.patches.len(),
            iterations: self.iterations,
            start_priority: self.start_priority,
            reason,
            ambient,
        }
    }

    /// Pops the next source patch, or the reason to stop.
    fn fetch_next(&mut self) -> Result<PatchIndex, StopReason> {
        if self.progress.cancelled() {
            return Err(self.stop(StopReason::Cancelled, None));
        }
        let popped = self.queue.pop_highest();
        self.advance_meter(popped.map_or(0.0, |(_, priority)| priority));

        let stop_value = self.start_priority / self.config.stop_ratio;
        let reason = match popped {
            None => Some(StopReason::NoPolygons),
            Some((_, priority)) if priority <= 0.0 || priority < stop_value => {
                Some(StopReason::PriorityDown(priority))
            }
            Some(_) if self.iterations > self.config.max_iterations => {
                Some(StopReason::IterationsReached(self.iterations))
            }
            Some((index, _)) if self.patches[index].repeats() > self.config.max_repeats => {
                Some(StopReason::LoopDetected)
            }
            Some(_) => None,
        };
        if let Some(reason) = reason {
            return Err(self.stop(reason, popped));
        }
        let Some((index, priority)) = popped else {
            return Err(self.stop(StopReason::NoPolygons, None));
        };
        let patch = &mut self.patches[index];
        if priority == patch.last_shoot_priority() {
            patch.inc_repeats();
        }
        patch.set_last_shoot_priority(priority);
        Ok(index)
    }

    /// Meter position grows with the 15th power of the converged fraction.
    fn advance_meter(&self, priority: f32) {
        if self.start_priority <= 0.0 {
            return;
        }
        let converged = ((self.start_priority - priority) / self.start_priority).max(0.0);
        let value = converged.powi(15) * 0.98;
        let ticks = (value * self.progress.total() as f32).round() as u32;
        for _ in self.progress.current()..ticks {
            self.progress.step();
        }
    }

    fn stop(&mut self, reason: StopReason, popped: Option<(PatchIndex, f32)>) -> StopReason {
        for _ in self.progress.current()..self.progress.total() {
            self.progress.step();
        }
        info!("Finished radiosity ({reason})");
        if let Some((index, priority)) = popped {
            self.queue.insert(index, priority);
        }
        reason
    }

    /// Shoots the delta of patch `src` at every patch in front of it.
    /// Returns the number of patches that were shot at.
    fn shoot(&mut self, src: PatchIndex) -> usize {
        let Self {
            world,
            config,
            patches,
            by_polygon,
            queue,
            ..
        } = self;
        let world: &World = &**world;
        let Some(src_poly) = world.polygon(patches[src].polygon()) else {
            return 0;
        };
        let Some(src_lm) = src_poly.lightmap() else {
            return 0;
        };

        let vertices = src_poly.vertices();
        let plane_origin = vertices[0];
        let (v1, v2) = (vertices[1] - plane_origin, vertices[2] - plane_origin);
        let center = lightmap_center(src_lm);
        let mut view = FrustumView::new(center, SHOOT_RADIUS);
        view.things_shadow = true;

        let mut hits: Vec<(PatchIndex, PolygonHit)> = Vec::new();
        world.check_frustum(src_poly.sector(), view, &mut |world: &World, hit: &PolygonHit| {
            let Some(&dest) = by_polygon.get(&hit.polygon) else {
                return;
            };
            let Some(dest_lm) = world.polygon(hit.polygon).and_then(Polygon::lightmap) else {
                return;
            };
            // Work in the space the light arrived in.
            let warp = &hit.view.warp;
            let mut side = which_side_3d(
                lightmap_center(dest_lm) - warp.other_to_this(plane_origin),
                warp.other_to_this_relative(v1),
                warp.other_to_this_relative(v2),
            );
            if hit.view.mirror {
                side = -side;
            }
            if side > 0 {
                hits.push((dest, hit.clone()));
            }
        });

        let colors = patches[src].texture_lumel_map(src_poly, src_lm);
        let delta = patches[src].delta().clone();
        let mut receivers = 0;
        for (dest, hit) in hits {
            if dest == src {
                continue;
            }
            let Some(dest_poly) = world.polygon(hit.polygon) else {
                continue;
            };
            let Some(dest_lm) = dest_poly.lightmap() else {
                continue;
            };
            if config.beam_check && !visible_poly_in(world, src_poly, dest_poly) {
                continue;
            }
            let warp = hit.view.warp;
            let shooter = Shooter {
                patch: &patches[src],
                delta: &delta,
                colors: &colors,
                lumels: lumel_positions(src_lm)
                    .into_iter()
                    .map(|p| warp.other_to_this(p))
                    .collect(),
                normal: warp.other_to_this_relative(src_poly.normal()).normalize_or_zero(),
            };
            let (src_id, dest_id) = (src_poly.id(), dest_poly.id());
            let visibility = shadow_map(
                &hit.view.light_frustum,
                hit.view
                    .shadows
                    .iter()
                    .filter(|s| s.polygon != src_id && s.polygon != dest_id),
                dest_poly.vertices(),
                dest_lm,
            );
            let additions = shooter.shoot_to(dest_poly, dest_lm, &patches[dest], &visibility, hit.view.filter);
            let receiver = &mut patches[dest];
            for (ruv, fraction, source, filter) in additions {
                receiver.add_delta(ruv, fraction, source, filter);
            }
            queue.remove(dest);
            receiver.compute_priority();
            queue.insert(dest, receiver.priority());
            receivers += 1;
        }
        receivers
    }

    /// Spreads the light still unshot over every patch as ambient, after
    /// folding the deltas themselves into the static maps.
    fn apply_delta_and_ambient(&mut self) -> IVec3 {
        let mut total_area = 0.0;
        let mut reflect = 0.0;
        let mut sums = Vec3::ZERO;
        for patch in &self.patches {
            total_area += patch.area();
            reflect += patch.diffuse() * patch.area();
            if patch.size() > 0 {
                sums += patch.delta_sums().as_vec3() * patch.area() / patch.size() as f32;
            }
        }
        let mut color = Vec3::ZERO;
        if total_area > 0.0 {
            let mean_reflect = (reflect / total_area).min(MAX_MEAN_REFLECTANCE);
            let total_reflect = 1.0 / (1.0 - mean_reflect);
            color = sums * total_reflect / total_area;
        }

        let Self { world, patches, .. } = self;
        for patch in patches.iter_mut() {
            if let Some(lightmap) = world.polygon_mut(patch.polygon()).ok().and_then(Polygon::lightmap_mut) {
                patch.copy_and_clear_delta(lightmap.static_map_mut());
            }
        }

        let ambient = round_color(color + world.ambient().as_vec3());
        info!("Setting ambient ({}, {}, {})", ambient.x, ambient.y, ambient.z);
        for patch in patches.iter() {
            if let Some(lightmap) = world.polygon_mut(patch.polygon()).ok().and_then(Polygon::lightmap_mut) {
                patch.apply_ambient(lightmap.static_map_mut(), ambient);
            }
        }
        ambient
    }

    /// Whether a beam from the centre of `src` reaches `dest` first.
    pub fn visible_poly(&self, src: PolygonId, dest: PolygonId) -> bool {
        let world = self.world();
        match (world.polygon(src), world.polygon(dest)) {
            (Some(src), Some(dest)) => visible_poly_in(world, src, dest),
            _ => false,
        }
    }

    /// `1.0` when the beam from `from` on `src` towards `to` on `dest`
    /// hits `dest` before anything else, `0.0` otherwise. The beam starts
    /// just off `src` and overshoots `to` so it cannot stop short.
    pub fn beam_visibility(&self, src: PolygonId, from: Vec3, dest: PolygonId, to: Vec3) -> f32 {
        let world = self.world();
        match world.polygon(src) {
            Some(src_poly) => beam_visibility_in(world, src_poly, from, dest, to),
            None => 0.0,
        }
    }
}

impl Shooter<'_> {
    /// Form factor additions `(dest lumel, fraction, source rgb, filter)`
    /// from every lit source lumel to every covered destination lumel.
    fn shoot_to(
        &self,
        dest_poly: &Polygon,
        dest_lm: &Lightmap,
        dest: &RadPatch,
        visibility: &[f32],
        trajectory: Vec3,
    ) -> Vec<(usize, f32, [u8; 3], Vec3)> {
        let factor = dest.diffuse() / PI;
        let dest_normal = dest_poly.normal();
        let dest_lumels = lumel_positions(dest_lm);
        let mut additions = Vec::new();
        for (suv, &src_lumel) in self.lumels.iter().enumerate() {
            if self.delta.is_zero(suv) || self.patch.lumel_not_covered(suv) {
                continue;
            }
            let source_area = self.patch.lumel_area() * self.patch.coverage(suv);
            let rgb = self.colors.get(suv);
            let filter = Vec3::new(rgb[0].into(), rgb[1].into(), rgb[2].into()) / 255.0 * trajectory;
            let source = self.delta.get(suv);
            for (ruv, &dest_lumel) in dest_lumels.iter().enumerate() {
                if dest.lumel_not_covered(ruv) {
                    continue;
                }
                let vis = visibility.get(ruv).copied().unwrap_or(0.0);
                if vis <= 0.0 {
                    continue;
                }
                let path = dest_lumel - src_lumel;
                let distance = path.length();
                if distance < MIN_DISTANCE {
                    continue;
                }
                let direction = path / distance;
                let cos_src = self.normal.dot(direction);
                if cos_src < 0.0 {
                    continue;
                }
                let cos_dest = -dest_normal.dot(direction);
                if cos_dest < 0.0 {
                    continue;
                }
                let total = factor * cos_src * cos_dest * source_area * vis / (distance * distance);
                if total < MIN_CONTRIBUTION {
                    continue;
                }
                additions.push((ruv, total, source, filter));
            }
        }
        additions
    }
}

fn lightmap_center(lightmap: &Lightmap) -> Vec3 {
    lightmap.lumel_to_world(lightmap.width() as f32 / 2.0, lightmap.height() as f32 / 2.0)
}

/// World positions of the lumel corners, row by row.
fn lumel_positions(lightmap: &Lightmap) -> Vec<Vec3> {
    let mut positions = Vec::with_capacity(lightmap.size());
    for y in 0..lightmap.height() {
        for x in 0..lightmap.width() {
            positions.push(lightmap.lumel_to_world(x as f32, y as f32));
        }
    }
    positions
}

fn polygon_center(polygon: &Polygon) -> Vec3 {
    polygon.lightmap().map_or_else(|| polygon.center(), lightmap_center)
}

fn visible_poly_in(world: &World, src: &Polygon, dest: &Polygon) -> bool {
    beam_visibility_in(world, src, polygon_center(src), dest.id(), polygon_center(dest)) > 0.0
}

fn beam_visibility_in(world: &World, src: &Polygon, from: Vec3, dest: PolygonId, to: Vec3) -> f32 {
    let path = to - from;
    let start = from + path * 0.001;
    let end = from + path * 1.5;
    match world.hit_beam(src.sector(), start, end) {
        Some((hit, _)) if hit == dest => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::add_room;
    use crate::progress::ProgressMeter;
    use crate::world::PolygonDef;

    fn lit_room(static_rgb: [u8; 3]) -> (World, Vec<PolygonId>) {
        let mut world = World::new();
        world.set_lightcell_size(16);
        world.set_ambient(IVec3::ZERO);
        let s = world.add_sector("room");
        let walls = add_room(&mut world, s, Vec3::splat(-2.0), Vec3::splat(2.0), &PolygonDef::default()).unwrap();
        let lm = world.polygon_mut(walls[3]).unwrap().lightmap_mut().unwrap();
        let size = lm.size();
        lm.set_static_map(RgbLightMap::filled(size, static_rgb)).unwrap();
        (world, walls)
    }

    #[test]
    fn stop_reasons_read_like_log_lines() {
        assert_eq!(StopReason::NoPolygons.to_string(), "no polygons to light");
        assert_eq!(StopReason::PriorityDown(0.5).to_string(), "priority down to 0.5");
        assert_eq!(StopReason::IterationsReached(1001).to_string(), "1001 iterations reached");
        assert_eq!(StopReason::LoopDetected.to_string(), "loop detected");
        assert_eq!(StopReason::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn empty_world_has_nothing_to_light() {
        let mut world = World::new();
        let report = Radiosity::new(&mut world, &RadiosityConfig::default()).run();
        assert_eq!(report.reason, StopReason::NoPolygons);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.patches, 0);
    }

    #[test]
    fn ceiling_light_bounces_onto_the_floor() {
        let (mut world, walls) = lit_room([200, 200, 200]);
        let mut rad = Radiosity::new(&mut world, &RadiosityConfig::default());
        match rad.step() {
            RadiosityStep::Shot { polygon, receivers, .. } => {
                assert_eq!(polygon, walls[3]);
                assert_eq!(receivers, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rad.patch_for(walls[3]).unwrap().priority(), 0.0);
        assert!(rad.patch_for(walls[2]).unwrap().priority() > 0.0);
        let report = rad.run();
        assert!(report.iterations > 1);
        let floor = world.polygon(walls[2]).unwrap().lightmap().unwrap().static_map();
        assert!(floor.total() > 0);
    }

    #[test]
    fn iteration_cap_stops_the_run() {
        let (mut world, _) = lit_room([200, 200, 200]);
        let config = RadiosityConfig {
            max_iterations: 2,
            ..RadiosityConfig::default()
        };
        let report = Radiosity::new(&mut world, &config).run();
        assert_eq!(report.reason, StopReason::IterationsReached(3));
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn cancelled_meter_stops_before_shooting() {
        let (mut world, walls) = lit_room([100, 100, 100]);
        let meter = ProgressMeter::new(100);
        meter.cancel();
        let mut rad = Radiosity::new(&mut world, &RadiosityConfig::default()).with_progress(meter.clone());
        assert_eq!(rad.step(), RadiosityStep::Stopped(StopReason::Cancelled));
        let report = rad.finish();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert!(meter.is_complete());
        // Unshot light still lands in the static map.
        let ceiling = world.polygon(walls[3]).unwrap().lightmap().unwrap().static_map();
        assert!(ceiling.red().iter().all(|&r| r >= 100));
    }

    #[test]
    fn meter_lags_behind_convergence() {
        let (mut world, _) = lit_room([200, 200, 200]);
        let meter = ProgressMeter::new(1000);
        let mut rad = Radiosity::new(&mut world, &RadiosityConfig::default()).with_progress(meter.clone());
        assert!(matches!(rad.step(), RadiosityStep::Shot { .. }));
        // The first pop is the start priority itself.
        assert_eq!(meter.current(), 0);
        for _ in 0..3 {
            assert!(matches!(rad.step(), RadiosityStep::Shot { .. }));
            assert!(meter.current() < 980, "meter at {}", meter.current());
        }
        assert!(!meter.is_complete());
        rad.run();
        assert!(meter.is_complete());
    }

    #[test]
    fn silent_runs_stop_without_a_meter() {
        let (mut world, _) = lit_room([200, 200, 200]);
        let config = RadiosityConfig {
            max_iterations: 5,
            ..RadiosityConfig::default()
        };
        let report = Radiosity::new(&mut world, &config).run();
        assert!(report.iterations >= 1);
    }

    #[test]
    fn beams_see_the_opposite_wall() {
        let (mut world, walls) = lit_room([0, 0, 0]);
        let rad = Radiosity::new(&mut world, &RadiosityConfig::default());
        assert!(rad.visible_poly(walls[0], walls[1]));
        assert!(rad.visible_poly(walls[2], walls[3]));
        let from = Vec3::new(0.0, -2.0, 0.0);
        assert_eq!(rad.beam_visibility(walls[2], from, walls[3], Vec3::new(0.0, 2.0, 0.0)), 1.0);
        assert_eq!(rad.beam_visibility(walls[2], from, walls[0], Vec3::new(0.0, 2.0, 0.0)), 0.0);
    }

    #[test]
    fn heap_queue_picks_the_same_first_source() {
        let (mut world, walls) = lit_room([90, 90, 90]);
        let config = RadiosityConfig {
            queue: QueueKind::Heap,
            beam_check: true,
            ..RadiosityConfig::default()
        };
        let mut rad = Radiosity::new(&mut world, &config);
        assert!(matches!(rad.step(), RadiosityStep::Shot { polygon, .. } if polygon == walls[3]));
    }
}
