//! Patch mesh registry: ownership, per-tier lists and distance ordering.
//!
//! The manager owns every mesh through a [`PatchArena`] and keeps four id lists:
//! terrain and water for the spherical tier, terrain and water for the far tier.
//! A mesh with a water sub-mesh sits in both lists of its tier. Removal happens
//! only inside the draw sweeps (see the orchestrator), never through this API.

use glam::DVec3;
use terra_config::PatchRenderConfig;
use tracing::debug;

use crate::arena::{PatchArena, PatchId};
use crate::materials::PlanetMaterials;
use crate::mesh::{PatchMesh, PatchState};
use crate::recycler::ResourceRecycler;

/// Owner and draw-order keeper of a planet's terrain patches.
#[derive(Debug)]
pub struct PatchMeshManager {
    pub(crate) arena: PatchArena,
    pub(crate) spherical_terrain: Vec<PatchId>,
    pub(crate) spherical_water: Vec<PatchId>,
    pub(crate) far_terrain: Vec<PatchId>,
    pub(crate) far_water: Vec<PatchId>,
    closest_spherical_distance2: f64,
    closest_far_distance2: f64,
    pub(crate) materials: PlanetMaterials,
    pub(crate) water_time_step: f32,
    pub(crate) spherical_water_time: f32,
    pub(crate) far_water_time: f32,
}

impl PatchMeshManager {
    /// Create an empty manager for a planet.
    pub fn new(materials: PlanetMaterials, config: &PatchRenderConfig) -> Self {
        Self {
            arena: PatchArena::new(),
            spherical_terrain: Vec::new(),
            spherical_water: Vec::new(),
            far_terrain: Vec::new(),
            far_water: Vec::new(),
            closest_spherical_distance2: f64::MAX,
            closest_far_distance2: f64::MAX,
            materials,
            water_time_step: config.water_time_step,
            spherical_water_time: 0.0,
            far_water_time: 0.0,
        }
    }

    /// Take ownership of `mesh` and queue it for drawing in the given tier.
    ///
    /// The mesh also joins the tier's water list when it carries a water
    /// sub-mesh. Adding the same mesh twice is impossible since it is moved in.
    pub fn add_mesh(&mut self, mut mesh: PatchMesh, is_spherical: bool) -> PatchId {
        mesh.renderable = true;
        let has_water = mesh.has_water();
        let id = self.arena.insert(mesh);

        let (terrain, water) = if is_spherical {
            (&mut self.spherical_terrain, &mut self.spherical_water)
        } else {
            (&mut self.far_terrain, &mut self.far_water)
        };
        terrain.push(id);
        if has_water {
            water.push(id);
        }
        id
    }

    /// Recompute spherical-tier distances to `reference` and sort its terrain list nearest first.
    pub fn sort_spherical_meshes(&mut self, reference: DVec3) {
        self.closest_spherical_distance2 =
            sort_by_distance(&mut self.arena, &mut self.spherical_terrain, reference);
    }

    /// Recompute far-tier distances to `reference` and sort its terrain list nearest first.
    pub fn sort_far_meshes(&mut self, reference: DVec3) {
        self.closest_far_distance2 =
            sort_by_distance(&mut self.arena, &mut self.far_terrain, reference);
    }

    /// Squared distance to the nearest spherical patch as of the last sort,
    /// `f64::MAX` if the tier was empty.
    pub fn closest_spherical_distance2(&self) -> f64 {
        self.closest_spherical_distance2
    }

    /// Squared distance to the nearest far patch as of the last sort.
    pub fn closest_far_distance2(&self) -> f64 {
        self.closest_far_distance2
    }

    /// Flag a patch for deletion at the next sweep. Returns false for a stale id.
    pub fn mark_for_deletion(&self, id: PatchId) -> bool {
        match self.arena.get(id) {
            Some(mesh) => {
                mesh.delete_signal().mark();
                true
            }
            None => false,
        }
    }

    /// Borrow a live mesh.
    pub fn mesh(&self, id: PatchId) -> Option<&PatchMesh> {
        self.arena.get(id)
    }

    /// Lifecycle state of `id`. Stale ids report [`PatchState::Freed`].
    pub fn state(&self, id: PatchId) -> PatchState {
        self.arena.get(id).map_or(PatchState::Freed, PatchMesh::state)
    }

    /// Number of meshes the manager owns.
    pub fn mesh_count(&self) -> usize {
        self.arena.len()
    }

    /// Spherical terrain list in draw order.
    pub fn spherical_terrain(&self) -> &[PatchId] {
        &self.spherical_terrain
    }

    /// Spherical water list.
    pub fn spherical_water(&self) -> &[PatchId] {
        &self.spherical_water
    }

    /// Far terrain list in draw order.
    pub fn far_terrain(&self) -> &[PatchId] {
        &self.far_terrain
    }

    /// Far water list.
    pub fn far_water(&self) -> &[PatchId] {
        &self.far_water
    }

    /// Spherical terrain list length.
    pub fn spherical_terrain_len(&self) -> usize {
        self.spherical_terrain.len()
    }

    /// Spherical water list length.
    pub fn spherical_water_len(&self) -> usize {
        self.spherical_water.len()
    }

    /// Far terrain list length.
    pub fn far_terrain_len(&self) -> usize {
        self.far_terrain.len()
    }

    /// Far water list length.
    pub fn far_water_len(&self) -> usize {
        self.far_water.len()
    }

    /// Planet materials.
    pub fn materials(&self) -> &PlanetMaterials {
        &self.materials
    }

    /// Replace the planet materials, e.g. after a texture reload.
    pub fn set_materials(&mut self, materials: PlanetMaterials) {
        self.materials = materials;
    }

    /// Current water clocks of the spherical and far tiers.
    pub fn water_times(&self) -> (f32, f32) {
        (self.spherical_water_time, self.far_water_time)
    }

    /// Free every mesh still owned and clear all lists.
    ///
    /// Meshes listed in both a terrain and a water list are freed once.
    pub fn dispose(&mut self, mut recycler: impl ResourceRecycler) {
        let mut freed = 0usize;
        for mut mesh in self.arena.drain() {
            mesh.release_all(&mut recycler);
            freed += 1;
        }
        self.spherical_terrain.clear();
        self.spherical_water.clear();
        self.far_terrain.clear();
        self.far_water.clear();
        self.closest_spherical_distance2 = f64::MAX;
        self.closest_far_distance2 = f64::MAX;
        debug!(freed, "patch mesh manager disposed");
    }
}

/// Update each listed mesh's cached distance and sort the list ascending.
/// Returns the minimum squared distance, `f64::MAX` for an empty list.
fn sort_by_distance(arena: &mut PatchArena, list: &mut [PatchId], reference: DVec3) -> f64 {
    let mut closest = f64::MAX;
    for &id in list.iter() {
        if let Some(mesh) = arena.get_mut(id) {
            let d2 = mesh.closest_point(reference).distance_squared(reference);
            mesh.distance2 = d2;
            closest = closest.min(d2);
        }
    }

    // Stale ids sort last; the next sweep drops them.
    let arena = &*arena;
    list.sort_by(|a, b| {
        let da = arena.get(*a).map_or(f64::MAX, PatchMesh::distance2);
        let db = arena.get(*b).map_or(f64::MAX, PatchMesh::distance2);
        da.total_cmp(&db)
    });
    closest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{BufferHandle, TextureHandle};
    use crate::mesh::{PatchBuffers, WaterMesh};
    use crate::recycler::RecycleLog;
    use terra_cull::PatchBounds;

    fn manager() -> PatchMeshManager {
        PatchMeshManager::new(PlanetMaterials::untextured(1000.0), &PatchRenderConfig::default())
    }

    fn mesh_at(center: DVec3, base: u32) -> PatchMesh {
        PatchMesh::new(
            PatchBounds::from_center_half_extents(center, DVec3::ZERO),
            PatchBuffers {
                vertex: BufferHandle::new(base),
                index: BufferHandle::new(base + 1),
                index_count: 12,
                surface_index_count: 6,
            },
        )
    }

    fn water(base: u32) -> WaterMesh {
        WaterMesh {
            vertex: BufferHandle::new(base),
            index: BufferHandle::new(base + 1),
            index_count: 6,
        }
    }

    fn distances(m: &PatchMeshManager, list: &[PatchId]) -> Vec<f64> {
        list.iter().map(|&id| m.mesh(id).unwrap().distance2()).collect()
    }

    #[test]
    fn test_add_routes_to_tier_lists() {
        let mut m = manager();
        let a = m.add_mesh(mesh_at(DVec3::X, 0), true);
        m.add_mesh(mesh_at(DVec3::X, 2).with_water(water(100)), true);
        m.add_mesh(mesh_at(DVec3::X, 4).with_water(water(102)), false);

        assert_eq!(m.spherical_terrain_len(), 2);
        assert_eq!(m.spherical_water_len(), 1);
        assert_eq!(m.far_terrain_len(), 1);
        assert_eq!(m.far_water_len(), 1);
        assert_eq!(m.mesh_count(), 3);
        assert!(m.mesh(a).unwrap().is_renderable());
        assert_eq!(m.state(a), PatchState::Active);
    }

    #[test]
    fn test_sort_orders_nearest_first() {
        let mut m = manager();
        for (i, d) in [10.0, 1.0, 5.0].into_iter().enumerate() {
            m.add_mesh(mesh_at(DVec3::new(d, 0.0, 0.0), i as u32 * 2), true);
        }
        m.sort_spherical_meshes(DVec3::ZERO);

        assert_eq!(distances(&m, m.spherical_terrain()), vec![1.0, 25.0, 100.0]);
        assert_eq!(m.closest_spherical_distance2(), 1.0);
    }

    #[test]
    fn test_sort_uses_closest_point_not_center() {
        let mut m = manager();
        let big = PatchMesh::new(
            PatchBounds::from_center_half_extents(DVec3::new(20.0, 0.0, 0.0), DVec3::splat(18.0)),
            PatchBuffers {
                vertex: BufferHandle::new(0),
                index: BufferHandle::new(1),
                index_count: 6,
                surface_index_count: 6,
            },
        );
        m.add_mesh(mesh_at(DVec3::new(5.0, 0.0, 0.0), 2), true);
        let big = m.add_mesh(big, true);
        m.sort_spherical_meshes(DVec3::ZERO);

        assert_eq!(m.spherical_terrain()[0], big);
        assert_eq!(m.closest_spherical_distance2(), 4.0);
    }

    #[test]
    fn test_sort_far_is_independent() {
        let mut m = manager();
        m.add_mesh(mesh_at(DVec3::new(3.0, 0.0, 0.0), 0), true);
        m.add_mesh(mesh_at(DVec3::new(0.0, 7.0, 0.0), 2), false);
        m.add_mesh(mesh_at(DVec3::new(0.0, 2.0, 0.0), 4), false);

        m.sort_far_meshes(DVec3::ZERO);
        assert_eq!(distances(&m, m.far_terrain()), vec![4.0, 49.0]);
        assert_eq!(m.closest_far_distance2(), 4.0);
        assert_eq!(m.closest_spherical_distance2(), f64::MAX);
    }

    #[test]
    fn test_sort_empty_tier_keeps_sentinel() {
        let mut m = manager();
        m.sort_spherical_meshes(DVec3::ONE);
        m.sort_far_meshes(DVec3::ONE);
        assert_eq!(m.closest_spherical_distance2(), f64::MAX);
        assert_eq!(m.closest_far_distance2(), f64::MAX);
    }

    #[test]
    fn test_water_list_is_not_sorted() {
        let mut m = manager();
        let far = m.add_mesh(mesh_at(DVec3::new(9.0, 0.0, 0.0), 0).with_water(water(10)), true);
        let near = m.add_mesh(mesh_at(DVec3::new(1.0, 0.0, 0.0), 2).with_water(water(12)), true);
        m.sort_spherical_meshes(DVec3::ZERO);

        assert_eq!(m.spherical_terrain(), &[near, far]);
        assert_eq!(m.spherical_water(), &[far, near]);
    }

    #[test]
    fn test_mark_for_deletion() {
        let mut m = manager();
        let id = m.add_mesh(mesh_at(DVec3::X, 0), true);
        assert!(m.mark_for_deletion(id));
        assert!(m.mesh(id).unwrap().should_delete());
    }

    #[test]
    fn test_dispose_frees_each_mesh_once() {
        let mut m = manager();
        m.add_mesh(mesh_at(DVec3::X, 0).with_water(water(10)), true);
        m.add_mesh(
            mesh_at(DVec3::Y, 2).with_normal_map(TextureHandle::new(7)),
            false,
        );

        let mut log = RecycleLog::new();
        m.dispose(&mut log);

        assert_eq!(log.freed_buffers().len(), 6);
        for raw in [0, 1, 2, 3, 10, 11] {
            assert_eq!(log.times_freed(BufferHandle::new(raw)), 1);
        }
        assert_eq!(log.recycled_normal_maps(), &[TextureHandle::new(7)]);
        assert_eq!(m.mesh_count(), 0);
        assert_eq!(m.spherical_water_len(), 0);
        assert_eq!(m.far_terrain_len(), 0);
    }

    #[test]
    fn test_stale_id_reports_freed() {
        let mut m = manager();
        let id = m.add_mesh(mesh_at(DVec3::X, 0), true);
        m.dispose(RecycleLog::new());
        assert_eq!(m.state(id), PatchState::Freed);
        assert!(!m.mark_for_deletion(id));
    }
}
