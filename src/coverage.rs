//! Polygon fill in lumel space with per-lumel coverage density.
//!
//! Coverage maps say how much of every lumel lies inside a polygon. Shadow
//! maps use the same fill: the light frustum is painted in, then every
//! relevant shadow frustum is painted out.

use glam::{Vec2, Vec3};

use crate::frustum::{Frustum, ShadowFrustum};
use crate::lightmap::Lightmap;

/// Value given to uncovered lumels next to covered ones so that lumels cut
/// by an edge still receive light.
pub const FIX_VALUE: f32 = 0.000_01;

/// Calls `plot(x, y, density)` for every cell of a `width x height` grid
/// that overlaps `poly`, where `density` is the covered fraction of the
/// unit cell.
pub fn fill_polygon(poly: &[Vec2], width: usize, height: usize, mut plot: impl FnMut(usize, usize, f32)) {
    if poly.len() < 3 || width == 0 || height == 0 {
        return;
    }
    let (lo, hi) = poly
        .iter()
        .fold((Vec2::splat(f32::MAX), Vec2::splat(f32::MIN)), |(lo, hi), p| {
            (lo.min(*p), hi.max(*p))
        });
    let x0 = lo.x.floor().max(0.0) as usize;
    let y0 = lo.y.floor().max(0.0) as usize;
    let x1 = (hi.x.ceil().max(0.0) as usize).min(width);
    let y1 = (hi.y.ceil().max(0.0) as usize).min(height);
    for y in y0..y1 {
        for x in x0..x1 {
            let density = cell_coverage(poly, x as f32, y as f32);
            if density > 0.0 {
                plot(x, y, density.min(1.0));
            }
        }
    }
}

fn cell_coverage(poly: &[Vec2], x: f32, y: f32) -> f32 {
    let mut clipped = clip_2d(poly, |p| p.x - x);
    clipped = clip_2d(&clipped, |p| x + 1.0 - p.x);
    clipped = clip_2d(&clipped, |p| p.y - y);
    clipped = clip_2d(&clipped, |p| y + 1.0 - p.y);
    area_2d(&clipped)
}

fn clip_2d(poly: &[Vec2], distance: impl Fn(Vec2) -> f32) -> Vec<Vec2> {
    let mut out = Vec::with_capacity(poly.len() + 2);
    let Some(&last) = poly.last() else {
        return out;
    };
    let mut prev = last;
    let mut prev_d = distance(prev);
    for &cur in poly {
        let cur_d = distance(cur);
        if (prev_d >= 0.0) != (cur_d >= 0.0) {
            let t = prev_d / (prev_d - cur_d);
            out.push(prev + (cur - prev) * t);
        }
        if cur_d >= 0.0 {
            out.push(cur);
        }
        prev = cur;
        prev_d = cur_d;
    }
    out
}

fn area_2d(poly: &[Vec2]) -> f32 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut prev = poly[poly.len() - 1];
    let mut twice = 0.0;
    for &p in poly {
        twice += prev.perp_dot(p);
        prev = p;
    }
    (twice * 0.5).abs()
}

/// Gives uncovered lumels whose left, upper or upper-left neighbour is
/// covered a tiny coverage.
pub fn fix_coverage_map(map: &mut [f32], width: usize, height: usize) {
    let mut uv = 0;
    for y in 0..height {
        for x in 0..width {
            if map[uv] <= 0.0 {
                if x > 0 && map[uv - 1] > FIX_VALUE {
                    map[uv] = FIX_VALUE;
                } else if y > 0 && map[uv - width] > FIX_VALUE {
                    map[uv] = FIX_VALUE;
                } else if x > 0 && y > 0 && map[uv - width - 1] > FIX_VALUE {
                    map[uv] = FIX_VALUE;
                }
            }
            uv += 1;
        }
    }
}

fn project(lightmap: &Lightmap, points: impl Iterator<Item = Vec3>) -> Vec<Vec2> {
    points.map(|p| lightmap.world_to_lumel(p)).collect()
}

/// Fraction of each lumel covered by the polygon itself.
pub fn lumel_coverage(lightmap: &Lightmap, vertices: &[Vec3]) -> Vec<f32> {
    let (width, height) = (lightmap.width(), lightmap.height());
    let mut map = vec![0.0; width * height];
    let poly = project(lightmap, vertices.iter().copied());
    fill_polygon(&poly, width, height, |x, y, density| {
        map[y * width + x] = density;
    });
    fix_coverage_map(&mut map, width, height);
    map
}

/// Intersects `frustum` with the receiving polygon and projects the result
/// into the receiver's lumel space.
pub fn map_frustum(frustum: &Frustum, receiver: &[Vec3], lightmap: &Lightmap) -> Option<Vec<Vec2>> {
    let origin = frustum.origin();
    let relative: Vec<Vec3> = receiver.iter().map(|v| *v - origin).collect();
    let hit = frustum.intersect(&relative)?;
    Some(project(lightmap, hit.world_vertices()))
}

/// Per-lumel visibility of a receiving polygon from the apex of `light`:
/// the light frustum painted in, each shadow painted out, floored at zero.
pub fn shadow_map<'a>(
    light: &Frustum,
    shadows: impl IntoIterator<Item = &'a ShadowFrustum>,
    receiver: &[Vec3],
    lightmap: &Lightmap,
) -> Vec<f32> {
    let (width, height) = (lightmap.width(), lightmap.height());
    let mut map = vec![0.0; width * height];
    if let Some(poly) = map_frustum(light, receiver, lightmap) {
        fill_polygon(&poly, width, height, |x, y, density| {
            map[y * width + x] = density;
        });
    }
    fix_coverage_map(&mut map, width, height);
    for shadow in shadows {
        if let Some(poly) = map_frustum(&shadow.frustum, receiver, lightmap) {
            fill_polygon(&poly, width, height, |x, y, density| {
                let slot = &mut map[y * width + x];
                *slot = (*slot - density).max(0.0);
            });
        }
    }
    map
}
