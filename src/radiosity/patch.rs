use glam::{IVec3, Vec3};

use crate::coverage::lumel_coverage;
use crate::lightmap::{color_to_bytes, Lightmap, RgbLightMap};
use crate::world::{Polygon, PolygonId, World};

/// Radiosity bookkeeping for one lightmapped polygon.
///
/// The polygon's static map holds light that has already been distributed;
/// `delta` holds light that still has to be shot to other patches.
#[derive(Debug, Clone)]
pub struct RadPatch {
    polygon: PolygonId,
    width: usize,
    height: usize,
    area: f32,
    diffuse: f32,
    lumel_area: f32,
    delta: RgbLightMap,
    coverage: Vec<f32>,
    priority: f32,
    last_shoot_priority: f32,
    repeats: u32,
}

impl RadPatch {
    /// Moves the polygon's current static light into the delta map and
    /// zeroes the static map. Polygons without a lightmap yield `None`.
    pub fn new(world: &mut World, id: PolygonId) -> Option<Self> {
        let poly = world.polygon_mut(id).ok()?;
        let area = poly.area();
        let diffuse = poly.diffuse();
        let coverage = {
            let vertices = poly.vertices().to_vec();
            lumel_coverage(poly.lightmap()?, &vertices)
        };
        let lightmap = poly.lightmap_mut()?;
        let delta = lightmap.take_static_map();
        let mut patch = Self {
            polygon: id,
            width: lightmap.width(),
            height: lightmap.height(),
            area,
            diffuse,
            lumel_area: lightmap.lumel_area(),
            delta,
            coverage,
            priority: area,
            last_shoot_priority: 0.0,
            repeats: 0,
        };
        patch.compute_priority();
        Some(patch)
    }

    pub fn polygon(&self) -> PolygonId {
        self.polygon
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn diffuse(&self) -> f32 {
        self.diffuse
    }

    /// World space area of a single lumel.
    pub fn lumel_area(&self) -> f32 {
        self.lumel_area
    }

    pub fn delta(&self) -> &RgbLightMap {
        &self.delta
    }

    pub fn coverage(&self, uv: usize) -> f32 {
        self.coverage[uv]
    }

    pub fn lumel_not_covered(&self, uv: usize) -> bool {
        self.coverage[uv] == 0.0
    }

    pub fn delta_is_zero(&self, uv: usize) -> bool {
        self.delta.is_zero(uv)
    }

    /// Amount of unshot light.
    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn last_shoot_priority(&self) -> f32 {
        self.last_shoot_priority
    }

    pub fn set_last_shoot_priority(&mut self, priority: f32) {
        self.last_shoot_priority = priority;
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    pub fn inc_repeats(&mut self) {
        self.repeats += 1;
    }

    /// `diffuse * area * mean(delta * coverage)` over every channel value.
    pub fn compute_priority(&mut self) {
        let size = self.size();
        if size == 0 {
            self.priority = 0.0;
            return;
        }
        let sum: f32 = self
            .delta
            .bytes()
            .iter()
            .enumerate()
            .map(|(i, &value)| f32::from(value) * self.coverage[i % size])
            .sum();
        let mean = sum / (size * 3) as f32;
        self.priority = self.diffuse * self.area * mean;
    }

    /// Receives `fraction` of a source lumel's delta, tinted by `filter`.
    /// Each channel saturates.
    pub fn add_delta(&mut self, ruv: usize, fraction: f32, source: [u8; 3], filter: Vec3) {
        let filter = filter.to_array();
        let mut add = [0i32; 3];
        for c in 0..3 {
            add[c] = (fraction * f32::from(source[c]) * filter[c]).round() as i32;
        }
        self.delta.add(ruv, add);
    }

    /// Folds the delta of covered lumels into `static_map`, then clears the
    /// delta. Priority drops to zero.
    pub fn copy_and_clear_delta(&mut self, static_map: &mut RgbLightMap) {
        for uv in 0..self.size() {
            if self.lumel_not_covered(uv) {
                continue;
            }
            let rgb = self.delta.get(uv);
            static_map.add(uv, [i32::from(rgb[0]), i32::from(rgb[1]), i32::from(rgb[2])]);
        }
        self.delta.clear();
        self.priority = 0.0;
    }

    /// Per channel sum of the delta over covered lumels.
    pub fn delta_sums(&self) -> IVec3 {
        let mut sums = IVec3::ZERO;
        for uv in 0..self.size() {
            if self.lumel_not_covered(uv) {
                continue;
            }
            let rgb = self.delta.get(uv);
            sums += IVec3::new(rgb[0].into(), rgb[1].into(), rgb[2].into());
        }
        sums
    }

    /// Adds `ambient` to every covered lumel of `static_map`.
    pub fn apply_ambient(&self, static_map: &mut RgbLightMap, ambient: IVec3) {
        for uv in 0..self.size() {
            if !self.lumel_not_covered(uv) {
                static_map.add(uv, ambient.to_array());
            }
        }
    }

    /// Takes the scene ambient out of the unshot light so it is not bounced
    /// around and then added a second time. Recomputes the priority.
    pub fn remove_ambient(&mut self, ambient: IVec3) {
        let negated = (-ambient).to_array();
        for uv in 0..self.size() {
            if !self.lumel_not_covered(uv) {
                self.delta.add(uv, negated);
            }
        }
        self.compute_priority();
    }

    /// Colour of each lumel as a reflector: the mean of the texels under it,
    /// or the flat colour of an untextured polygon.
    pub fn texture_lumel_map(&self, polygon: &Polygon, lightmap: &Lightmap) -> RgbLightMap {
        match polygon.texture() {
            Some(texture) => texture.lumel_sized(self.width, self.height, lightmap.cell_size() as usize),
            None => RgbLightMap::filled(self.size(), color_to_bytes(polygon.flat_color())),
        }
    }
}

/// Rounds a colour to integer channels.
pub(crate) fn round_color(color: Vec3) -> IVec3 {
    let r = color.round();
    IVec3::new(r.x as i32, r.y as i32, r.z as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lightmap::{clamp_channel, Texture};
    use crate::world::PolygonDef;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn saturating_channel(base: u8, add: i32) -> u8 {
        clamp_channel(i32::from(base) + add)
    }

    fn patch_world(static_rgb: [u8; 3]) -> (World, PolygonId) {
        let mut world = World::new();
        world.set_lightcell_size(16);
        let s = world.add_sector("s");
        let mut def = PolygonDef::new(
            "wall",
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(2.0, 2.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            ],
        );
        def.diffuse = 0.5;
        let id = world.add_polygon(s, def).unwrap();
        let lm = world.polygon_mut(id).unwrap().lightmap_mut().unwrap();
        let size = lm.size();
        lm.set_static_map(RgbLightMap::filled(size, static_rgb)).unwrap();
        (world, id)
    }

    #[test]
    fn new_patch_moves_static_light_into_delta() {
        let (mut world, id) = patch_world([100, 50, 0]);
        let patch = RadPatch::new(&mut world, id).unwrap();
        assert_eq!(patch.size(), 4);
        assert_eq!(patch.delta().get(3), [100, 50, 0]);
        assert!(world.polygon(id).unwrap().lightmap().unwrap().static_map().is_zero(3));
        // diffuse 0.5 * area 4 * mean 50
        assert!((patch.priority() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn add_delta_clamps_every_channel() {
        let (mut world, id) = patch_world([10, 10, 10]);
        let mut patch = RadPatch::new(&mut world, id).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let fraction = rng.gen_range(-4.0..4.0);
            let source = [rng.gen(), rng.gen(), rng.gen()];
            let filter = Vec3::new(rng.gen_range(0.0..2.0), rng.gen_range(0.0..2.0), rng.gen_range(0.0..2.0));
            let uv = rng.gen_range(0..patch.size());
            let before = patch.delta().get(uv);
            patch.add_delta(uv, fraction, source, filter);
            let after = patch.delta().get(uv);
            for c in 0..3 {
                let add = (fraction * f32::from(source[c]) * filter[c]).round() as i32;
                assert_eq!(after[c], saturating_channel(before[c], add));
            }
        }
    }

    #[test]
    fn copy_and_clear_moves_delta_to_static() {
        let (mut world, id) = patch_world([200, 0, 0]);
        let mut patch = RadPatch::new(&mut world, id).unwrap();
        let mut map = RgbLightMap::filled(patch.size(), [100, 0, 7]);
        patch.copy_and_clear_delta(&mut map);
        assert_eq!(map.get(0), [255, 0, 7]);
        assert_eq!(patch.priority(), 0.0);
        assert_eq!(patch.delta_sums(), IVec3::ZERO);
    }

    #[test]
    fn ambient_round_trip() {
        let (mut world, id) = patch_world([30, 30, 5]);
        let mut patch = RadPatch::new(&mut world, id).unwrap();
        patch.remove_ambient(IVec3::splat(20));
        assert_eq!(patch.delta().get(0), [10, 10, 0]);
        assert_eq!(patch.delta_sums(), IVec3::new(40, 40, 0));
        let mut map = RgbLightMap::new(patch.size());
        patch.apply_ambient(&mut map, IVec3::new(20, -5, 300));
        assert_eq!(map.get(1), [20, 0, 255]);
    }

    #[test]
    fn reflector_colour_comes_from_texture_or_flat_colour() {
        let (mut world, id) = patch_world([0, 0, 0]);
        let patch = RadPatch::new(&mut world, id).unwrap();
        let poly = world.polygon(id).unwrap();
        let flat = patch.texture_lumel_map(poly, poly.lightmap().unwrap());
        assert_eq!(flat.get(0), [255, 255, 255]);

        let mut def = PolygonDef::new("tex", poly.vertices().to_vec());
        def.texture = Some(Texture::new(1, 2, vec![[200, 0, 0], [0, 0, 100]]).unwrap());
        let s = poly.sector();
        let tex_id = world.add_polygon(s, def).unwrap();
        let tex_patch = RadPatch::new(&mut world, tex_id).unwrap();
        let poly = world.polygon(tex_id).unwrap();
        let map = tex_patch.texture_lumel_map(poly, poly.lightmap().unwrap());
        assert_eq!(map.get(0), [100, 0, 50]);
    }
}
