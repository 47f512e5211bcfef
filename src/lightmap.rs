//! Lightmap storage and the texture-space mapping of lightmapped polygons.

use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::math::{Plane, SMALL_EPSILON};

/// Three byte channels stored planar: all reds, then all greens, then all
/// blues. Every write saturates to `0..=255`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RgbLightMap {
    size: usize,
    map: Vec<u8>,
}

impl RgbLightMap {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            map: vec![0; size * 3],
        }
    }

    pub fn filled(size: usize, rgb: [u8; 3]) -> Self {
        let mut map = Self::new(size);
        for uv in 0..size {
            map.set(uv, rgb);
        }
        map
    }

    /// Number of lumels.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn channel(&self, c: usize) -> &[u8] {
        &self.map[c * self.size..(c + 1) * self.size]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [u8] {
        &mut self.map[c * self.size..(c + 1) * self.size]
    }

    pub fn red(&self) -> &[u8] {
        self.channel(0)
    }

    pub fn green(&self) -> &[u8] {
        self.channel(1)
    }

    pub fn blue(&self) -> &[u8] {
        self.channel(2)
    }

    /// All channels back to back.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn get(&self, uv: usize) -> [u8; 3] {
        [
            self.map[uv],
            self.map[uv + self.size],
            self.map[uv + 2 * self.size],
        ]
    }

    pub fn set(&mut self, uv: usize, rgb: [u8; 3]) {
        self.map[uv] = rgb[0];
        self.map[uv + self.size] = rgb[1];
        self.map[uv + 2 * self.size] = rgb[2];
    }

    /// Adds a signed amount per channel, clamping the result.
    pub fn add(&mut self, uv: usize, rgb: [i32; 3]) {
        for (c, amount) in rgb.into_iter().enumerate() {
            let slot = &mut self.map[uv + c * self.size];
            *slot = clamp_channel(i32::from(*slot) + amount);
        }
    }

    pub fn is_zero(&self, uv: usize) -> bool {
        self.get(uv) == [0, 0, 0]
    }

    pub fn clear(&mut self) {
        self.map.fill(0);
    }

    /// Sum of all channel values.
    pub fn total(&self) -> u64 {
        self.map.iter().map(|&b| u64::from(b)).sum()
    }
}

pub fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts a `[0, 1]` float colour to bytes, rounding and clamping.
pub fn color_to_bytes(color: Vec3) -> [u8; 3] {
    let scaled = (color * 255.0).round();
    [
        clamp_channel(scaled.x as i32),
        clamp_channel(scaled.y as i32),
        clamp_channel(scaled.z as i32),
    ]
}

/// Affine world to texture space mapping. Texture coordinates are in texels;
/// the third coordinate is the depth along the texture normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureMapping {
    m_world2tex: Mat3,
    v_world2tex: Vec3,
}

impl TextureMapping {
    pub fn new(m_world2tex: Mat3, v_world2tex: Vec3) -> Self {
        Self {
            m_world2tex,
            v_world2tex,
        }
    }

    /// Orthogonal projection onto the plane with `normal`, `texels_per_unit`
    /// texels per world unit, texture origin at `origin`.
    pub fn planar(normal: Vec3, origin: Vec3, texels_per_unit: f32) -> Self {
        let n = normal.normalize_or_zero();
        let helper = if n.y.abs() < 0.9 { Vec3::Y } else { Vec3::Z };
        let u_axis = helper.cross(n).normalize_or_zero();
        let v_axis = n.cross(u_axis);
        let m = Mat3::from_cols(u_axis * texels_per_unit, v_axis * texels_per_unit, n).transpose();
        Self::new(m, origin)
    }

    pub fn world_to_texture(&self, p: Vec3) -> Vec3 {
        self.m_world2tex * (p - self.v_world2tex)
    }

    pub fn texture_to_world(&self, t: Vec3) -> Vec3 {
        self.m_world2tex.inverse() * t + self.v_world2tex
    }
}

/// The lightmap of one polygon plus the geometry needed to move between
/// lumel and world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Lightmap {
    mapping: TextureMapping,
    cell_size: f32,
    min_u: f32,
    min_v: f32,
    width: usize,
    height: usize,
    lumel_origin: Vec3,
    lumel_x_axis: Vec3,
    lumel_y_axis: Vec3,
    static_map: RgbLightMap,
}

impl Lightmap {
    /// Lays a lightmap over a flat polygon. Lumel `(x, y)` sits at texel
    /// `(min_u + x * cell, min_v + y * cell)` on the polygon plane.
    pub fn new(vertices: &[Vec3], plane: &Plane, mapping: TextureMapping, cell_size: u32) -> Self {
        let cell = cell_size.max(1) as f32;
        let (mut lo, mut hi) = (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN));
        for v in vertices {
            let t = mapping.world_to_texture(*v).truncate();
            lo = lo.min(t);
            hi = hi.max(t);
        }
        let min_u = (lo.x / cell).floor() * cell;
        let min_v = (lo.y / cell).floor() * cell;
        let width = (((hi.x - min_u) / cell).ceil() as usize).max(1);
        let height = (((hi.y - min_v) / cell).ceil() as usize).max(1);

        let mut lightmap = Self {
            mapping,
            cell_size: cell,
            min_u,
            min_v,
            width,
            height,
            lumel_origin: Vec3::ZERO,
            lumel_x_axis: Vec3::ZERO,
            lumel_y_axis: Vec3::ZERO,
            static_map: RgbLightMap::new(width * height),
        };
        let origin = lightmap.lumel_on_plane(plane, 0.0, 0.0);
        lightmap.lumel_x_axis = lightmap.lumel_on_plane(plane, 1.0, 0.0) - origin;
        lightmap.lumel_y_axis = lightmap.lumel_on_plane(plane, 0.0, 1.0) - origin;
        lightmap.lumel_origin = origin;
        lightmap
    }

    /// Solves the texture depth so the lumel lands on `plane`.
    fn lumel_on_plane(&self, plane: &Plane, x: f32, y: f32) -> Vec3 {
        let m_t2w = self.mapping.m_world2tex.inverse();
        let txt_normal = m_t2w.transpose() * plane.normal;
        let txt_d = plane.classify(self.mapping.v_world2tex);
        let u = self.min_u + x * self.cell_size;
        let v = self.min_v + y * self.cell_size;
        let w = if txt_normal.z.abs() < SMALL_EPSILON {
            0.0
        } else {
            -(txt_d + txt_normal.x * u + txt_normal.y * v) / txt_normal.z
        };
        self.mapping.texture_to_world(Vec3::new(u, v, w))
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

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn mapping(&self) -> &TextureMapping {
        &self.mapping
    }

    /// World position of lumel coordinates; fractional values interpolate.
    pub fn lumel_to_world(&self, x: f32, y: f32) -> Vec3 {
        self.lumel_origin + self.lumel_x_axis * x + self.lumel_y_axis * y
    }

    /// Continuous lumel coordinates of a world point.
    pub fn world_to_lumel(&self, p: Vec3) -> Vec2 {
        let t = self.mapping.world_to_texture(p);
        Vec2::new((t.x - self.min_u) / self.cell_size, (t.y - self.min_v) / self.cell_size)
    }

    /// World space area of one lumel.
    pub fn lumel_area(&self) -> f32 {
        self.lumel_x_axis.cross(self.lumel_y_axis).length()
    }

    pub fn static_map(&self) -> &RgbLightMap {
        &self.static_map
    }

    pub fn static_map_mut(&mut self) -> &mut RgbLightMap {
        &mut self.static_map
    }

    /// Replaces the static map; the size must match.
    pub fn set_static_map(&mut self, map: RgbLightMap) -> Result<(), WorldError> {
        if map.size() != self.size() {
            return Err(WorldError::LightmapMismatch {
                expected: self.size(),
                actual: map.size(),
            });
        }
        self.static_map = map;
        Ok(())
    }

    /// Moves the static map out, leaving zeros behind.
    pub fn take_static_map(&mut self) -> RgbLightMap {
        let size = self.size();
        std::mem::replace(&mut self.static_map, RgbLightMap::new(size))
    }
}

/// A tiling RGB texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    width: usize,
    height: usize,
    texels: Vec<[u8; 3]>,
}

impl Texture {
    pub fn new(width: usize, height: usize, texels: Vec<[u8; 3]>) -> Result<Self, WorldError> {
        if width == 0 || height == 0 || texels.len() != width * height {
            return Err(WorldError::TextureMismatch {
                expected: width * height,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn solid(rgb: [u8; 3]) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![rgb],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Texel lookup with wrap-around.
    pub fn texel(&self, x: usize, y: usize) -> [u8; 3] {
        self.texels[(y % self.height) * self.width + x % self.width]
    }

    /// Mean texel colour, channels in `0..=255`.
    pub fn mean_color(&self) -> Vec3 {
        let sum = self
            .texels
            .iter()
            .fold(Vec3::ZERO, |acc, t| acc + Vec3::new(t[0] as f32, t[1] as f32, t[2] as f32));
        sum / self.texels.len() as f32
    }

    /// Averages `cell x cell` texel blocks into a `width x height` map. The
    /// texture tiles when the lightmap is larger than it.
    pub fn lumel_sized(&self, width: usize, height: usize, cell: usize) -> RgbLightMap {
        let cell = cell.max(1);
        let count = (cell * cell) as u32;
        let mut map = RgbLightMap::new(width * height);
        for ly in 0..height {
            for lx in 0..width {
                let start_x = (lx * cell) % self.width;
                let start_y = (ly * cell) % self.height;
                let mut sum = [0u32; 3];
                for dy in 0..cell {
                    for dx in 0..cell {
                        let t = self.texel(start_x + dx, start_y + dy);
                        for c in 0..3 {
                            sum[c] += u32::from(t[c]);
                        }
                    }
                }
                map.set(
                    ly * width + lx,
                    [(sum[0] / count) as u8, (sum[1] / count) as u8, (sum[2] / count) as u8],
                );
            }
        }
        map
    }
}
