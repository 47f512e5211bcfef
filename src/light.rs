//! Static point lights and direct lightmap filling.

use glam::Vec3;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::coverage::shadow_map;
use crate::view::{FrustumView, PolygonHit};
use crate::world::{PolygonId, SectorId, World};

/// How brightness falls off with distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attenuation {
    None,
    /// `1 - d / radius`
    #[default]
    Linear,
    /// `1 / d`
    Inverse,
    /// `1 / d^2`
    Realistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticLight {
    pub sector: SectorId,
    pub position: Vec3,
    pub radius: f32,
    /// Channels in `[0, 1]`.
    pub color: Vec3,
    #[serde(default)]
    pub attenuation: Attenuation,
    #[serde(default = "default_things_shadow")]
    pub things_shadow: bool,
}

fn default_things_shadow() -> bool {
    true
}

impl StaticLight {
    pub fn new(sector: SectorId, position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            sector,
            position,
            radius,
            color,
            attenuation: Attenuation::default(),
            things_shadow: default_things_shadow(),
        }
    }

    pub fn brightness_at_distance(&self, d: f32) -> f32 {
        match self.attenuation {
            Attenuation::None => 1.0,
            Attenuation::Linear => (1.0 - d / self.radius).max(0.0),
            Attenuation::Inverse => 1.0 / d,
            Attenuation::Realistic => 1.0 / (d * d),
        }
    }

    /// The light's colour travels as the view filter, so tinted portals
    /// tint it and a fully absorbed light stops.
    pub fn frustum_view(&self) -> FrustumView {
        let mut view = FrustumView::new(self.position, self.radius);
        view.filter = self.color;
        view.things_shadow = self.things_shadow;
        view
    }

    /// Per lumel additions for one lit polygon.
    fn light_polygon(&self, world: &World, hit: &PolygonHit) -> Option<Vec<[i32; 3]>> {
        let poly = world.polygon(hit.polygon)?;
        let lightmap = poly.lightmap()?;
        let visibility = shadow_map(&hit.view.light_frustum, hit.view.shadows.iter(), poly.vertices(), lightmap);
        // After a warp the light sits at the warped position.
        let center = hit.view.origin();
        let normal = poly.normal();
        let mut added = vec![[0; 3]; lightmap.size()];
        let mut uv = 0;
        for y in 0..lightmap.height() {
            for x in 0..lightmap.width() {
                let vis = visibility[uv];
                if vis > 0.0 {
                    let lumel = lightmap.lumel_to_world(x as f32, y as f32);
                    let to_light = center - lumel;
                    let d = to_light.length();
                    if d > f32::EPSILON && d <= self.radius {
                        let cosinus = normal.dot(to_light) / d;
                        if cosinus > 0.0 {
                            let amount = hit.view.filter * (255.0 * self.brightness_at_distance(d) * cosinus * vis);
                            let rounded = amount.round();
                            added[uv] = [rounded.x as i32, rounded.y as i32, rounded.z as i32];
                        }
                    }
                }
                uv += 1;
            }
        }
        Some(added)
    }

    /// Adds this light to the static lightmaps it reaches. Returns the
    /// number of polygons that received light.
    pub fn calculate_lighting(&self, world: &mut World) -> usize {
        let mut lit: Vec<(PolygonId, Vec<[i32; 3]>)> = Vec::new();
        world.check_frustum(self.sector, self.frustum_view(), &mut |world: &World, hit: &PolygonHit| {
            if let Some(added) = self.light_polygon(world, hit) {
                lit.push((hit.polygon, added));
            }
        });
        let count = lit.len();
        for (id, added) in lit {
            if let Some(map) = world
                .polygon_mut(id)
                .ok()
                .and_then(|p| p.lightmap_mut())
                .map(|lm| lm.static_map_mut())
            {
                for (uv, rgb) in added.into_iter().enumerate() {
                    map.add(uv, rgb);
                }
            }
        }
        debug!("light at {:?} reached {count} polygons", self.position);
        count
    }
}

/// Shines every static light of the world onto the lightmaps.
pub fn shine_lights(world: &mut World) -> usize {
    let lights = world.lights().to_vec();
    info!("Shining {} lights", lights.len());
    lights.iter().map(|light| light.calculate_lighting(world)).sum()
}
