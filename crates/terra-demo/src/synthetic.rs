//! Synthetic patch geometry: a cube-sphere near tier and a flat far tier.
//!
//! Stands in for the terrain producer. Heights are fBm simplex noise sampled on
//! the unit sphere, so both tiers share one seeded height field.

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use terra_cull::PatchBounds;
use terra_patch::gpu::{PatchVertex, WaterVertex};

/// Vertices along one patch edge.
pub(crate) const GRID: u32 = 17;

/// Normal map resolution per patch.
pub(crate) const NORMAL_MAP_SIZE: u32 = 16;

const HEIGHT_AMPLITUDE: f64 = 4_000.0;
const OCTAVES: u32 = 5;
const BASE_FREQUENCY: f64 = 3.0;
const SKIRT_DEPTH: f64 = 500.0;

/// One cube face: outward normal and the two in-face axes.
const FACES: [(DVec3, DVec3, DVec3); 6] = [
    (DVec3::X, DVec3::NEG_Z, DVec3::Y),
    (DVec3::NEG_X, DVec3::Z, DVec3::Y),
    (DVec3::Y, DVec3::X, DVec3::NEG_Z),
    (DVec3::NEG_Y, DVec3::X, DVec3::Z),
    (DVec3::Z, DVec3::X, DVec3::Y),
    (DVec3::NEG_Z, DVec3::NEG_X, DVec3::Y),
];

/// CPU-side geometry of one patch, ready for upload.
pub(crate) struct PatchGeometry {
    pub vertices: Vec<PatchVertex>,
    pub indices: Vec<u32>,
    pub surface_index_count: u32,
    pub water: Option<(Vec<WaterVertex>, Vec<u32>)>,
    pub normal_map: Vec<u8>,
    pub bounds: PatchBounds,
}

/// Address of a spherical patch on the cube.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FacePatch {
    pub face: usize,
    pub i: u32,
    pub j: u32,
}


fn climate_at(dir: DVec3) -> [f32; 2] {
    let temperature = 1.0 - dir.y.abs();
    let humidity = 0.5 + 0.5 * (dir.x * 4.0 + dir.z * 2.0).sin();
    [temperature as f32, humidity as f32]
}

/// Every patch address of a cube sphere with `per_side` patches per face edge.
pub(crate) fn face_patches(per_side: u32) -> impl Iterator<Item = FacePatch> {
    (0..FACES.len()).flat_map(move |face| {
        (0..per_side).flat_map(move |i| (0..per_side).map(move |j| FacePatch { face, i, j }))
    })
}

/// Seeded height field for one synthetic planet.
pub(crate) struct SyntheticTerrain {
    noise: Simplex,
    radius: f64,
    per_side: u32,
}

impl SyntheticTerrain {
    pub(crate) fn new(seed: u32, radius: f64, per_side: u32) -> Self {
        Self {
            noise: Simplex::new(seed),
            radius,
            per_side: per_side.max(1),
        }
    }

    /// Height above sea level for a unit direction.
    pub(crate) fn height(&self, dir: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = BASE_FREQUENCY;
        let mut amplitude = HEIGHT_AMPLITUDE;
        for _ in 0..OCTAVES {
            let p = dir * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        total
    }

    /// Build a spherical patch. Vertices are planet-relative.
    pub(crate) fn spherical_patch(&self, patch: FacePatch) -> PatchGeometry {
        let (normal, u_axis, v_axis) = FACES[patch.face];
        let span = 2.0 / f64::from(self.per_side);
        let u0 = -1.0 + f64::from(patch.i) * span;
        let v0 = -1.0 + f64::from(patch.j) * span;

        build_patch(self.radius, |s, t| {
            let cube = normal + u_axis * (u0 + s * span) + v_axis * (v0 + t * span);
            let dir = cube.normalize();
            (dir, dir * (self.radius + self.height(dir)), climate_at(dir))
        })
    }

    /// Build a far-tier patch on the flat plane, `size` meters across, with its
    /// minimum corner at (`x`, `z`).
    pub(crate) fn far_patch(&self, x: f64, z: f64, size: f64) -> PatchGeometry {
        build_patch(0.0, |s, t| {
            let px = x + s * size;
            let pz = z + t * size;
            // The flat tier samples the cap around the north pole.
            let dir = DVec3::new(px / self.radius, 1.0, pz / self.radius).normalize();
            (DVec3::Y, DVec3::new(px, self.height(dir), pz), climate_at(dir))
        })
    }
}

/// Shared grid, skirt and water construction.
///
/// `sample(s, t)` maps grid coordinates in 0..1 to the unit up direction, the
/// vertex position and the climate. Water sits at `sea_level` along the up
/// direction.
fn build_patch(
    sea_level: f64,
    sample: impl Fn(f64, f64) -> (DVec3, DVec3, [f32; 2]),
) -> PatchGeometry {
    let last = f64::from(GRID - 1);
    let mut positions = Vec::with_capacity((GRID * GRID) as usize);
    let mut ups = Vec::with_capacity(positions.capacity());
    let mut vertices = Vec::with_capacity(positions.capacity());

    for t_step in 0..GRID {
        for s_step in 0..GRID {
            let (s, t) = (f64::from(s_step) / last, f64::from(t_step) / last);
            let (up, position, climate) = sample(s, t);
            vertices.push(PatchVertex {
                position: position.as_vec3().to_array(),
                tex_coord: [s as f32, t as f32],
                climate,
            });
            positions.push(position);
            ups.push(up);
        }
    }

    let mut indices = grid_indices();
    let surface_index_count = indices.len() as u32;

    // Skirts: each edge vertex gets a copy pushed down along the surface normal.
    let edge: Vec<u32> = (0..GRID)
        .chain((1..GRID).map(|k| k * GRID + GRID - 1))
        .chain((0..GRID - 1).rev().map(|k| (GRID - 1) * GRID + k))
        .chain((1..GRID - 1).rev().map(|k| k * GRID))
        .collect();
    let mut skirt_positions = Vec::with_capacity(edge.len());
    for (n, &top) in edge.iter().enumerate() {
        let next_top = edge[(n + 1) % edge.len()];
        let bottom = vertices.len() as u32;
        let next_bottom = if n + 1 == edge.len() {
            surface_vertex_count() as u32
        } else {
            bottom + 1
        };
        let dropped = positions[top as usize] - ups[top as usize] * SKIRT_DEPTH;
        vertices.push(PatchVertex {
            position: dropped.as_vec3().to_array(),
            ..vertices[top as usize]
        });
        skirt_positions.push(dropped);
        indices.extend_from_slice(&[top, bottom, next_top, next_top, bottom, next_bottom]);
    }

    let water = water_mesh(&positions, &ups, &vertices, sea_level);
    let normal_map = normal_map(&positions, &ups);
    let bounds = PatchBounds::from_points(positions.iter().chain(&skirt_positions).copied())
        .unwrap_or_else(|| PatchBounds::new(DVec3::ZERO, DVec3::ZERO));

    PatchGeometry {
        vertices,
        indices,
        surface_index_count,
        water,
        normal_map,
        bounds,
    }
}

fn surface_vertex_count() -> usize {
    (GRID * GRID) as usize
}

fn grid_indices() -> Vec<u32> {
    let mut indices = Vec::with_capacity(((GRID - 1) * (GRID - 1) * 6) as usize);
    for t in 0..GRID - 1 {
        for s in 0..GRID - 1 {
            let a = t * GRID + s;
            let b = a + 1;
            let c = a + GRID;
            let d = c + 1;
            indices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    indices
}

/// Water covers the patch when any vertex lies below sea level.
fn water_mesh(
    positions: &[DVec3],
    ups: &[DVec3],
    vertices: &[PatchVertex],
    sea_level: f64,
) -> Option<(Vec<WaterVertex>, Vec<u32>)> {
    let heights: Vec<f64> = positions
        .iter()
        .zip(ups)
        .map(|(p, up)| p.dot(*up) - sea_level)
        .collect();
    if heights.iter().all(|&h| h >= 0.0) {
        return None;
    }

    let water = positions
        .iter()
        .zip(ups)
        .zip(&heights)
        .zip(vertices)
        .map(|(((p, up), &h), v)| WaterVertex {
            position: (*p - *up * h).as_vec3().to_array(),
            tex_coord: v.tex_coord,
            depth: (-h).max(0.0) as f32,
            temperature: v.climate[0],
        })
        .collect();
    Some((water, grid_indices()))
}

/// RGBA8 normal map from height differences across the grid.
fn normal_map(positions: &[DVec3], ups: &[DVec3]) -> Vec<u8> {
    let size = NORMAL_MAP_SIZE as usize;
    let grid = GRID as usize;
    let height = |s: usize, t: usize| {
        let k = t.min(grid - 1) * grid + s.min(grid - 1);
        positions[k].dot(ups[k])
    };
    let cell = (positions[1] - positions[0]).length().max(1.0);

    let mut data = Vec::with_capacity(size * size * 4);
    for y in 0..size {
        for x in 0..size {
            let s = x * (grid - 1) / (size - 1);
            let t = y * (grid - 1) / (size - 1);
            let dx = height(s + 1, t) - height(s.saturating_sub(1), t);
            let dz = height(s, t + 1) - height(s, t.saturating_sub(1));
            let n = DVec3::new(-dx, 2.0 * cell, -dz).normalize();
            let encode = |c: f64| ((c * 0.5 + 0.5) * 255.0).round() as u8;
            data.extend_from_slice(&[encode(n.x), encode(n.y), encode(n.z), 255]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_patch_count() {
        assert_eq!(face_patches(3).count(), 6 * 9);
    }

    #[test]
    fn test_heights_stay_within_octave_sum() {
        let terrain = SyntheticTerrain::new(3, 1_000_000.0, 1);
        for address in face_patches(2) {
            let dir = DVec3::new(address.i as f64 + 0.3, address.face as f64, 1.0).normalize();
            assert!(terrain.height(dir).abs() <= 2.0 * HEIGHT_AMPLITUDE);
        }
    }

    #[test]
    fn test_skirt_indices_follow_surface() {
        let terrain = SyntheticTerrain::new(7, 6_000_000.0, 2);
        let geometry = terrain.spherical_patch(FacePatch { face: 2, i: 0, j: 0 });
        let surface = geometry.surface_index_count as usize;
        assert_eq!(surface, ((GRID - 1) * (GRID - 1) * 6) as usize);
        assert!(geometry.indices.len() > surface);
        let max = geometry.indices.iter().max().copied().unwrap();
        assert!((max as usize) < geometry.vertices.len());
        assert!(geometry.indices[surface..].iter().any(|&i| i as usize >= surface_vertex_count()));
    }

    #[test]
    fn test_spherical_bounds_near_radius() {
        let radius = 6_000_000.0;
        let terrain = SyntheticTerrain::new(7, radius, 4);
        let geometry = terrain.spherical_patch(FacePatch { face: 0, i: 1, j: 1 });
        let center = geometry.bounds.center();
        assert!((center.length() - radius).abs() < radius * 0.05);
    }

    #[test]
    fn test_normal_map_size() {
        let terrain = SyntheticTerrain::new(7, 6_000_000.0, 4);
        let geometry = terrain.far_patch(0.0, 0.0, 10_000.0);
        assert_eq!(geometry.normal_map.len(), (NORMAL_MAP_SIZE * NORMAL_MAP_SIZE * 4) as usize);
    }

    #[test]
    fn test_water_only_below_sea_level() {
        let terrain = SyntheticTerrain::new(7, 1_000_000.0, 4);
        for geometry in face_patches(4).map(|p| terrain.spherical_patch(p)) {
            if let Some((water, indices)) = &geometry.water {
                assert_eq!(water.len(), surface_vertex_count());
                assert_eq!(indices.len(), geometry.surface_index_count as usize);
                assert!(water.iter().any(|v| v.depth > 0.0));
            }
        }
    }
}
