//! Arena of sectors and polygons.
//!
//! Sectors and polygons refer to each other through typed indices, so a
//! portal's destination or a patch's polygon can never dangle.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::light::StaticLight;
use crate::lightmap::{Lightmap, TextureMapping, Texture};
use crate::math::{polygon_area, Plane, Transform};
use crate::portal::Portal;

pub const DEFAULT_MAX_PORTAL_DEPTH: u32 = 5;
pub const DEFAULT_LIGHTCELL_SIZE: u32 = 16;
pub const DEFAULT_AMBIENT: IVec3 = IVec3::splat(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolygonId(pub usize);

/// Everything needed to add a polygon to a sector.
#[derive(Debug, Clone)]
pub struct PolygonDef {
    pub name: String,
    /// World space, counter-clockwise seen from the front.
    pub vertices: Vec<Vec3>,
    pub diffuse: f32,
    /// Colour in `[0, 1]` used when there is no texture.
    pub flat_color: Vec3,
    pub texture: Option<Texture>,
    pub lightmapped: bool,
    pub texels_per_unit: f32,
    /// Whether the polygon blocks light travelling past it.
    pub shadow_caster: bool,
}

impl Default for PolygonDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            vertices: Vec::new(),
            diffuse: 0.7,
            flat_color: Vec3::ONE,
            texture: None,
            lightmapped: true,
            texels_per_unit: 16.0,
            shadow_caster: false,
        }
    }
}

impl PolygonDef {
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            vertices,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Polygon {
    id: PolygonId,
    sector: SectorId,
    name: String,
    vertices: Vec<Vec3>,
    plane: Plane,
    area: f32,
    diffuse: f32,
    flat_color: Vec3,
    texture: Option<Texture>,
    shadow_caster: bool,
    lightmap: Option<Lightmap>,
    portal: Option<Portal>,
}

impl Polygon {
    pub fn id(&self) -> PolygonId {
        self.id
    }

    pub fn sector(&self) -> SectorId {
        self.sector
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Unit normal pointing out of the front face.
    pub fn normal(&self) -> Vec3 {
        self.plane.normal
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn center(&self) -> Vec3 {
        self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32
    }

    pub fn diffuse(&self) -> f32 {
        self.diffuse
    }

    pub fn flat_color(&self) -> Vec3 {
        self.flat_color
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    pub fn is_shadow_caster(&self) -> bool {
        self.shadow_caster
    }

    pub fn lightmap(&self) -> Option<&Lightmap> {
        self.lightmap.as_ref()
    }

    pub fn lightmap_mut(&mut self) -> Option<&mut Lightmap> {
        self.lightmap.as_mut()
    }

    pub fn portal(&self) -> Option<&Portal> {
        self.portal.as_ref()
    }

    pub fn portal_mut(&mut self) -> Option<&mut Portal> {
        self.portal.as_mut()
    }

    /// True when `point` lies strictly on the front side.
    pub fn faces(&self, point: Vec3) -> bool {
        self.plane.classify(point) > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    id: SectorId,
    name: String,
    polygons: Vec<PolygonId>,
}

impl Sector {
    pub fn id(&self) -> SectorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygons(&self) -> &[PolygonId] {
        &self.polygons
    }
}

#[derive(Debug, Clone)]
pub struct World {
    sectors: Vec<Sector>,
    polygons: Vec<Polygon>,
    lights: Vec<StaticLight>,
    ambient: IVec3,
    max_portal_depth: u32,
    lightcell_size: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            sectors: Vec::new(),
            polygons: Vec::new(),
            lights: Vec::new(),
            ambient: DEFAULT_AMBIENT,
            max_portal_depth: DEFAULT_MAX_PORTAL_DEPTH,
            lightcell_size: DEFAULT_LIGHTCELL_SIZE,
        }
    }

    pub fn add_sector(&mut self, name: impl Into<String>) -> SectorId {
        let id = SectorId(self.sectors.len());
        self.sectors.push(Sector {
            id,
            name: name.into(),
            polygons: Vec::new(),
        });
        id
    }

    pub fn add_polygon(&mut self, sector: SectorId, def: PolygonDef) -> Result<PolygonId, WorldError> {
        if sector.0 >= self.sectors.len() {
            return Err(WorldError::UnknownSector(sector));
        }
        if def.vertices.len() < 3 {
            return Err(WorldError::TooFewVertices {
                count: def.vertices.len(),
            });
        }
        let plane = Plane::from_polygon(&def.vertices).ok_or(WorldError::DegeneratePolygon)?;
        let lightmap = def.lightmapped.then(|| {
            let mapping = TextureMapping::planar(plane.normal, def.vertices[0], def.texels_per_unit);
            Lightmap::new(&def.vertices, &plane, mapping, self.lightcell_size)
        });
        let id = PolygonId(self.polygons.len());
        self.polygons.push(Polygon {
            id,
            sector,
            name: def.name,
            area: polygon_area(&def.vertices),
            vertices: def.vertices,
            plane,
            diffuse: def.diffuse,
            flat_color: def.flat_color,
            texture: def.texture,
            shadow_caster: def.shadow_caster,
            lightmap,
            portal: None,
        });
        self.sectors[sector.0].polygons.push(id);
        Ok(id)
    }

    /// Turns a polygon into a portal. Portals are see-through, so any
    /// lightmap the polygon had is dropped.
    pub fn set_portal(&mut self, polygon: PolygonId, portal: Portal) -> Result<(), WorldError> {
        if let Some(dest) = portal.destination() {
            if dest.0 >= self.sectors.len() {
                return Err(WorldError::UnknownSector(dest));
            }
        }
        let poly = self.polygon_mut(polygon)?;
        poly.lightmap = None;
        poly.portal = Some(portal);
        Ok(())
    }

    /// Informs the portal on `polygon` that its polygon moved.
    pub fn move_portal(&mut self, polygon: PolygonId, world_transform: &Transform) -> Result<(), WorldError> {
        self.polygon_mut(polygon)?
            .portal
            .as_mut()
            .ok_or(WorldError::NotAPortal(polygon))?
            .object_to_world(world_transform);
        Ok(())
    }

    pub fn add_light(&mut self, light: StaticLight) -> Result<(), WorldError> {
        if light.sector.0 >= self.sectors.len() {
            return Err(WorldError::UnknownSector(light.sector));
        }
        self.lights.push(light);
        Ok(())
    }

    pub fn lights(&self) -> &[StaticLight] {
        &self.lights
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id.0)
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn polygon(&self, id: PolygonId) -> Option<&Polygon> {
        self.polygons.get(id.0)
    }

    pub fn polygon_mut(&mut self, id: PolygonId) -> Result<&mut Polygon, WorldError> {
        self.polygons.get_mut(id.0).ok_or(WorldError::UnknownPolygon(id))
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn lightmapped_polygons(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons.iter().filter(|p| p.lightmap.is_some())
    }

    pub fn sector_polygons(&self, id: SectorId) -> impl Iterator<Item = &Polygon> {
        self.sectors
            .get(id.0)
            .into_iter()
            .flat_map(|s| s.polygons.iter())
            .filter_map(|p| self.polygons.get(p.0))
    }

    pub fn find_sector(&self, name: &str) -> Option<SectorId> {
        self.sectors.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn find_polygon(&self, name: &str) -> Option<PolygonId> {
        self.polygons.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Scene ambient light, added to every lightmap once lighting is done.
    pub fn ambient(&self) -> IVec3 {
        self.ambient
    }

    pub fn set_ambient(&mut self, ambient: IVec3) {
        self.ambient = ambient;
    }

    pub fn max_portal_depth(&self) -> u32 {
        self.max_portal_depth
    }

    pub fn set_max_portal_depth(&mut self, depth: u32) {
        self.max_portal_depth = depth;
    }

    pub fn lightcell_size(&self) -> u32 {
        self.lightcell_size
    }

    /// Affects polygons added afterwards.
    pub fn set_lightcell_size(&mut self, size: u32) {
        self.lightcell_size = size.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn polygons_are_validated() {
        let mut world = World::new();
        let s = world.add_sector("room");
        assert_eq!(
            world.add_polygon(s, PolygonDef::new("tri", quad()[..2].to_vec())),
            Err(WorldError::TooFewVertices { count: 2 })
        );
        let line = vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        assert_eq!(
            world.add_polygon(s, PolygonDef::new("line", line)),
            Err(WorldError::DegeneratePolygon)
        );
        assert_eq!(
            world.add_polygon(SectorId(3), PolygonDef::new("lost", quad())),
            Err(WorldError::UnknownSector(SectorId(3)))
        );
    }

    #[test]
    fn lightmapped_polygon_gets_a_lightmap() {
        let mut world = World::new();
        world.set_lightcell_size(4);
        let s = world.add_sector("room");
        let id = world.add_polygon(s, PolygonDef::new("floor", quad())).unwrap();
        let poly = world.polygon(id).unwrap();
        assert_eq!(poly.sector(), s);
        assert!((poly.area() - 1.0).abs() < 1e-6);
        assert!(poly.faces(Vec3::new(0.5, 0.5, 1.0)));
        assert_eq!(poly.lightmap().unwrap().size(), 16);
        assert_eq!(world.find_polygon("floor"), Some(id));
        assert_eq!(world.lightmapped_polygons().count(), 1);
    }

    #[test]
    fn portals_lose_their_lightmap() {
        let mut world = World::new();
        let a = world.add_sector("a");
        let b = world.add_sector("b");
        let door = world.add_polygon(a, PolygonDef::new("door", quad())).unwrap();
        world.set_portal(door, Portal::new(b)).unwrap();
        assert!(world.polygon(door).unwrap().lightmap().is_none());
        assert_eq!(world.lightmapped_polygons().count(), 0);
        assert!(world.set_portal(door, Portal::new(SectorId(9))).is_err());
        assert_eq!(
            world.move_portal(PolygonId(5), &Transform::IDENTITY),
            Err(WorldError::UnknownPolygon(PolygonId(5)))
        );
    }
}
