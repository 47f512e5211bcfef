//! Small built-in worlds for the command line tool and the tests.

use anyhow::{bail, Context, Result};
use glam::Vec3;

use crate::config::LighterConfig;
use crate::error::WorldError;
use crate::light::StaticLight;
use crate::portal::Portal;
use crate::world::{PolygonDef, PolygonId, SectorId, World};

/// Names accepted by [`build`].
pub const DEMOS: &[&str] = &["two-rooms", "mirrors"];

/// Face names of [`box_faces`], in order.
pub const FACE_NAMES: [&str; 6] = ["west", "east", "floor", "ceiling", "south", "north"];

/// The six faces of an axis aligned box, wound so they face inward.
pub fn box_faces(min: Vec3, max: Vec3) -> [[Vec3; 4]; 6] {
    let (a, b) = (min, max);
    let p = Vec3::new;
    [
        [p(a.x, a.y, a.z), p(a.x, b.y, a.z), p(a.x, b.y, b.z), p(a.x, a.y, b.z)],
        [p(b.x, a.y, a.z), p(b.x, a.y, b.z), p(b.x, b.y, b.z), p(b.x, b.y, a.z)],
        [p(a.x, a.y, a.z), p(a.x, a.y, b.z), p(b.x, a.y, b.z), p(b.x, a.y, a.z)],
        [p(a.x, b.y, a.z), p(b.x, b.y, a.z), p(b.x, b.y, b.z), p(a.x, b.y, b.z)],
        [p(a.x, a.y, a.z), p(b.x, a.y, a.z), p(b.x, b.y, a.z), p(a.x, b.y, a.z)],
        [p(a.x, a.y, b.z), p(a.x, b.y, b.z), p(b.x, b.y, b.z), p(b.x, a.y, b.z)],
    ]
}

/// Adds a closed box room to `sector`. Every wall copies `template` and is
/// named `<sector>.<face>`. Returns the walls in [`FACE_NAMES`] order.
pub fn add_room(
    world: &mut World,
    sector: SectorId,
    min: Vec3,
    max: Vec3,
    template: &PolygonDef,
) -> Result<Vec<PolygonId>, WorldError> {
    let prefix = world
        .sector(sector)
        .ok_or(WorldError::UnknownSector(sector))?
        .name()
        .to_string();
    FACE_NAMES
        .iter()
        .zip(box_faces(min, max))
        .map(|(face, vertices)| {
            let def = PolygonDef {
                name: format!("{prefix}.{face}"),
                vertices: vertices.to_vec(),
                ..template.clone()
            };
            world.add_polygon(sector, def)
        })
        .collect()
}

/// Two rooms side by side joined by a doorway portal, one light and a
/// shadow casting plate in the first room.
pub fn two_rooms(config: &LighterConfig) -> Result<World, WorldError> {
    let mut world = World::new();
    config.apply(&mut world);
    let a = world.add_sector("A");
    let b = world.add_sector("B");
    let walls_a = add_room(&mut world, a, Vec3::new(-4.0, -2.0, -2.0), Vec3::new(0.0, 2.0, 2.0), &PolygonDef::default())?;
    let walls_b = add_room(&mut world, b, Vec3::new(0.0, -2.0, -2.0), Vec3::new(4.0, 2.0, 2.0), &PolygonDef::default())?;
    world.set_portal(walls_a[1], Portal::new(b))?;
    world.set_portal(walls_b[0], Portal::new(a))?;

    let mut plate = PolygonDef::new(
        "A.plate",
        vec![
            Vec3::new(-2.5, 0.0, -0.5),
            Vec3::new(-2.5, 0.0, 0.5),
            Vec3::new(-1.5, 0.0, 0.5),
            Vec3::new(-1.5, 0.0, -0.5),
        ],
    );
    plate.shadow_caster = true;
    world.add_polygon(a, plate)?;

    world.add_light(StaticLight::new(a, Vec3::new(-2.0, 1.0, 0.0), 12.0, Vec3::new(1.0, 0.9, 0.7)))?;
    Ok(world)
}

/// A hall whose end walls are two slightly tinted mirrors facing each other.
pub fn mirror_room(config: &LighterConfig) -> Result<World, WorldError> {
    let mut world = World::new();
    config.apply(&mut world);
    let hall = world.add_sector("hall");
    let walls = add_room(&mut world, hall, Vec3::new(-3.0, -1.5, -2.0), Vec3::new(3.0, 1.5, 2.0), &PolygonDef::default())?;
    for &wall in &walls[..2] {
        let polygon = world.polygon(wall).ok_or(WorldError::UnknownPolygon(wall))?;
        let mut mirror = Portal::mirror(hall, polygon);
        mirror.set_filter(Vec3::splat(0.8));
        world.set_portal(wall, mirror)?;
    }
    world.add_light(StaticLight::new(hall, Vec3::new(0.0, 1.0, 0.0), 10.0, Vec3::ONE))?;
    Ok(world)
}

/// Builds the demo called `name`.
pub fn build(name: &str, config: &LighterConfig) -> Result<World> {
    let world = match name {
        "two-rooms" => two_rooms(config),
        "mirrors" => mirror_room(config),
        other => bail!("unknown demo '{other}', expected one of: {}", DEMOS.join(", ")),
    };
    world.with_context(|| format!("failed to build demo '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_walls_face_inward_and_are_named() {
        let mut world = World::new();
        let s = world.add_sector("cell");
        let walls = add_room(&mut world, s, Vec3::splat(-1.0), Vec3::splat(1.0), &PolygonDef::default()).unwrap();
        assert_eq!(walls.len(), 6);
        for (id, face) in walls.iter().zip(FACE_NAMES) {
            let poly = world.polygon(*id).unwrap();
            assert!(poly.faces(Vec3::ZERO), "{face} faces outward");
            assert_eq!(poly.name(), format!("cell.{face}"));
            assert!((poly.area() - 4.0).abs() < 1e-4);
        }
        assert!(add_room(&mut world, SectorId(7), Vec3::ZERO, Vec3::ONE, &PolygonDef::default()).is_err());
    }

    #[test]
    fn demos_build() {
        let config = LighterConfig::default();
        for name in DEMOS {
            let world = build(name, &config).unwrap();
            assert!(!world.lights().is_empty());
        }
        let two = two_rooms(&config).unwrap();
        assert_eq!(two.sectors().len(), 2);
        assert_eq!(two.lightmapped_polygons().count(), 11);
        let mirrors = mirror_room(&config).unwrap();
        assert!(mirrors.polygons().iter().filter_map(|p| p.portal()).all(|p| p.is_mirroring()));
        assert!(build("attic", &config).is_err());
    }
}
