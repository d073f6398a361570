//! Per-frame inputs of the draw entry points and the counters they return.

use std::ops::AddAssign;

use glam::{DQuat, DVec3, Mat4, Vec3};

use crate::scatter::AtmosphereParams;

/// Camera and lighting state for drawing the spherical tier.
#[derive(Clone, Copy, Debug)]
pub struct SphericalFrame<'a> {
    /// Camera position relative to the planet center, in world orientation.
    pub relative_position: DVec3,
    /// Camera-relative view-projection (the camera sits at the origin).
    pub view_projection: Mat4,
    /// Orientation of the planet in the world.
    pub orientation: DQuat,
    /// Direction towards the light.
    pub light_direction: Vec3,
    /// Global opacity. Skirts are only drawn at full opacity.
    pub alpha: f32,
    /// Atmosphere to scatter through, if the planet has one.
    pub atmosphere: Option<&'a AtmosphereParams>,
}

/// Camera and lighting state for drawing the far tier.
#[derive(Clone, Copy, Debug)]
pub struct FarFrame<'a> {
    /// Camera position relative to the far-tier origin.
    pub relative_position: DVec3,
    /// Camera-relative view-projection.
    pub view_projection: Mat4,
    /// Direction towards the light.
    pub light_direction: Vec3,
    /// Global opacity.
    pub alpha: f32,
    /// Curvature radius applied by the shaders to the flat tier.
    pub radius: f32,
    /// Atmosphere to scatter through, if the planet has one.
    pub atmosphere: Option<&'a AtmosphereParams>,
}

/// Counters from one call of a draw entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchFrameStats {
    /// Terrain patches drawn.
    pub drawn: u32,
    /// Water sub-meshes drawn.
    pub water_drawn: u32,
    /// Terrain patches rejected by the horizon test.
    pub horizon_culled: u32,
    /// Terrain patches rejected by the frustum test.
    pub frustum_culled: u32,
    /// Mesh objects freed.
    pub meshes_freed: u32,
    /// Water sub-meshes released ahead of their mesh.
    pub water_released: u32,
    /// Normal maps handed back for reuse.
    pub normal_maps_recycled: u32,
}

impl PatchFrameStats {
    /// Patches considered by the terrain pass but not drawn.
    pub fn culled(&self) -> u32 {
        self.horizon_culled + self.frustum_culled
    }
}

impl AddAssign for PatchFrameStats {
    fn add_assign(&mut self, rhs: Self) {
        self.drawn += rhs.drawn;
        self.water_drawn += rhs.water_drawn;
        self.horizon_culled += rhs.horizon_culled;
        self.frustum_culled += rhs.frustum_culled;
        self.meshes_freed += rhs.meshes_freed;
        self.water_released += rhs.water_released;
        self.normal_maps_recycled += rhs.normal_maps_recycled;
    }
}
