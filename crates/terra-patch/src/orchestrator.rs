//! Per-frame draw traversal of the patch lists.
//!
//! Each tier runs a water pass and then a terrain pass. Both passes walk their
//! list with an index cursor and swap-remove patches whose deletion signal is
//! set, so deletion is folded into drawing. A patch in both lists can be
//! flagged between the two passes: whichever sweep sees it first releases only
//! the water sub-mesh, and the second one frees the mesh object.

use glam::{DVec3, Mat4, Vec3};
use terra_cull::{Frustum, is_over_far_horizon, is_over_horizon};
use tracing::{trace, warn};

use crate::arena::{PatchArena, PatchId};
use crate::draw::{PassKind, PassSetup, PatchDraw, PatchDrawSink};
use crate::frame::{FarFrame, PatchFrameStats, SphericalFrame};
use crate::manager::PatchMeshManager;
use crate::mesh::{PatchMesh, PatchState};
use crate::recycler::ResourceRecycler;
use crate::scatter::{AtmosphereParams, ScatterUniform};
use crate::uniforms::{PassUniform, PatchDrawUniform};

/// Which test rejected a terrain patch.
enum Visibility {
    Visible,
    BehindHorizon,
    OutsideFrustum,
}

impl PatchMeshManager {
    /// Draw the spherical tier, sweeping flagged patches along the way.
    ///
    /// Call [`sort_spherical_meshes`](Self::sort_spherical_meshes) first each
    /// frame for nearest-first terrain order.
    pub fn draw_spherical_meshes(
        &mut self,
        frame: &SphericalFrame<'_>,
        mut sink: impl PatchDrawSink,
        mut recycler: impl ResourceRecycler,
    ) -> PatchFrameStats {
        self.spherical_water_time += self.water_time_step;

        let mut stats = PatchFrameStats::default();
        let rotation = Mat4::from_quat(frame.orientation.as_quat());
        let transform =
            PatchDrawUniform::new(frame.view_projection, frame.relative_position, rotation);
        let scatter = scatter_uniform(frame.atmosphere, frame.relative_position);

        if !self.spherical_water.is_empty() {
            let setup = PassSetup {
                kind: PassKind::Water,
                textures: self.materials.water_textures(),
                uniform: PassUniform::water(
                    frame.light_direction,
                    frame.alpha,
                    self.spherical_water_time,
                    self.materials.liquid_depth_scale,
                    self.materials.liquid_freeze_temp,
                    0.0,
                ),
                scatter,
            };
            water_pass(
                &mut self.arena,
                &mut self.spherical_water,
                &setup,
                &transform,
                &mut sink,
                &mut recycler,
                &mut stats,
            );
        }

        if !self.spherical_terrain.is_empty() {
            let setup = PassSetup {
                kind: PassKind::Terrain,
                textures: self.materials.terrain_textures(),
                uniform: PassUniform::terrain(frame.light_direction, frame.alpha, 0.0),
                scatter,
            };
            let frustum = Frustum::from_view_projection(&frame.view_projection);
            let radius = self.materials.radius;
            let rel = frame.relative_position;
            let rotated = frame.orientation.inverse() * rel;
            let orientation = frame.orientation.as_quat();

            terrain_pass(
                &mut self.arena,
                &mut self.spherical_terrain,
                &setup,
                &transform,
                frame.alpha >= 1.0,
                &mut sink,
                &mut recycler,
                &mut stats,
                |mesh| {
                    if is_over_horizon(rotated, mesh.closest_point(rotated), radius) {
                        return Visibility::BehindHorizon;
                    }
                    let center = orientation * mesh.aabb_center() - rel.as_vec3();
                    if !frustum.intersects_sphere(center, mesh.bounding_radius()) {
                        return Visibility::OutsideFrustum;
                    }
                    Visibility::Visible
                },
            );
        }

        trace!(tier = "spherical", ?stats, "patch frame");
        stats
    }

    /// Draw the far tier, sweeping flagged patches along the way.
    pub fn draw_far_meshes(
        &mut self,
        frame: &FarFrame<'_>,
        mut sink: impl PatchDrawSink,
        mut recycler: impl ResourceRecycler,
    ) -> PatchFrameStats {
        self.far_water_time += self.water_time_step;

        let mut stats = PatchFrameStats::default();
        let rel = frame.relative_position;
        let transform = PatchDrawUniform::new(frame.view_projection, rel, Mat4::IDENTITY);
        let scatter_position = DVec3::new(0.0, rel.y + f64::from(frame.radius), 0.0);
        let scatter = scatter_uniform(frame.atmosphere, scatter_position);

        if !self.far_water.is_empty() {
            let setup = PassSetup {
                kind: PassKind::Water,
                textures: self.materials.water_textures(),
                uniform: PassUniform::water(
                    frame.light_direction,
                    frame.alpha,
                    self.far_water_time,
                    self.materials.liquid_depth_scale,
                    self.materials.liquid_freeze_temp,
                    frame.radius,
                ),
                scatter,
            };
            water_pass(
                &mut self.arena,
                &mut self.far_water,
                &setup,
                &transform,
                &mut sink,
                &mut recycler,
                &mut stats,
            );
        }

        if !self.far_terrain.is_empty() {
            let setup = PassSetup {
                kind: PassKind::Terrain,
                textures: self.materials.terrain_textures(),
                uniform: PassUniform::terrain(frame.light_direction, frame.alpha, frame.radius),
                scatter,
            };
            let frustum = Frustum::from_view_projection(&frame.view_projection);
            let radius = self.materials.radius;
            let rel_f32: Vec3 = rel.as_vec3();

            terrain_pass(
                &mut self.arena,
                &mut self.far_terrain,
                &setup,
                &transform,
                frame.alpha >= 1.0,
                &mut sink,
                &mut recycler,
                &mut stats,
                |mesh| {
                    let center = mesh.aabb_center() - rel_f32;
                    if !frustum.intersects_sphere(center, mesh.bounding_radius()) {
                        return Visibility::OutsideFrustum;
                    }
                    if is_over_far_horizon(rel, mesh.closest_point(rel), radius) {
                        return Visibility::BehindHorizon;
                    }
                    Visibility::Visible
                },
            );
        }

        trace!(tier = "far", ?stats, "patch frame");
        stats
    }
}

fn scatter_uniform(
    atmosphere: Option<&AtmosphereParams>,
    position: DVec3,
) -> Option<ScatterUniform> {
    atmosphere.map(|params| ScatterUniform::from_params(params, position.as_vec3()))
}

fn water_pass(
    arena: &mut PatchArena,
    list: &mut Vec<PatchId>,
    setup: &PassSetup,
    transform: &PatchDrawUniform,
    sink: &mut impl PatchDrawSink,
    recycler: &mut impl ResourceRecycler,
    stats: &mut PatchFrameStats,
) {
    sink.begin_pass(setup);

    let mut i = 0;
    while i < list.len() {
        let id = list[i];
        let Some(mesh) = arena.get(id) else {
            warn!(?id, "stale patch id in water list");
            list.swap_remove(i);
            continue;
        };

        if mesh.should_delete() {
            release_flagged(arena, id, recycler, stats);
            list.swap_remove(i);
            continue;
        }

        if let Some(water) = mesh.water() {
            sink.draw_patch(&PatchDraw {
                kind: PassKind::Water,
                vertex: water.vertex,
                index: water.index,
                index_count: water.index_count,
                normal_map: None,
                transform: *transform,
            });
            stats.water_drawn += 1;
        }
        i += 1;
    }

    sink.end_pass();
}

#[allow(clippy::too_many_arguments)]
fn terrain_pass(
    arena: &mut PatchArena,
    list: &mut Vec<PatchId>,
    setup: &PassSetup,
    transform: &PatchDrawUniform,
    draw_skirts: bool,
    sink: &mut impl PatchDrawSink,
    recycler: &mut impl ResourceRecycler,
    stats: &mut PatchFrameStats,
    visibility: impl Fn(&PatchMesh) -> Visibility,
) {
    sink.begin_pass(setup);

    let mut i = 0;
    while i < list.len() {
        let id = list[i];
        let Some(mesh) = arena.get_mut(id) else {
            warn!(?id, "stale patch id in terrain list");
            list.swap_remove(i);
            continue;
        };

        if mesh.should_delete() {
            if let Some(normal_map) = mesh.take_normal_map() {
                recycler.recycle_normal_map(normal_map);
                stats.normal_maps_recycled += 1;
            }
            release_flagged(arena, id, recycler, stats);
            list.swap_remove(i);
            continue;
        }

        let mesh: &PatchMesh = mesh;
        match visibility(mesh) {
            Visibility::BehindHorizon => stats.horizon_culled += 1,
            Visibility::OutsideFrustum => stats.frustum_culled += 1,
            Visibility::Visible => {
                if let Some(buffers) = mesh.terrain() {
                    sink.draw_patch(&PatchDraw {
                        kind: PassKind::Terrain,
                        vertex: buffers.vertex,
                        index: buffers.index,
                        index_count: buffers.draw_count(draw_skirts),
                        normal_map: mesh.normal_map(),
                        transform: *transform,
                    });
                    stats.drawn += 1;
                }
            }
        }
        i += 1;
    }

    sink.end_pass();
}

/// Release a flagged patch seen by either sweep.
///
/// While the patch still holds its water sub-mesh, only the water buffers go
/// and the mesh waits in the other list. Otherwise the mesh object is freed.
fn release_flagged(
    arena: &mut PatchArena,
    id: PatchId,
    recycler: &mut impl ResourceRecycler,
    stats: &mut PatchFrameStats,
) {
    let Some(mesh) = arena.get_mut(id) else {
        return;
    };

    if let Some(water) = mesh.take_water() {
        water.release(recycler);
        mesh.state = PatchState::Deleting;
        stats.water_released += 1;
    } else if let Some(mut mesh) = arena.remove(id) {
        mesh.release_all(recycler);
        stats.meshes_freed += 1;
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
