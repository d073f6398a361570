//! Uniform blocks shared by the recorded draw list and the patch shaders.

use bytemuck::{Pod, Zeroable};
use glam::{DVec3, Mat4, Vec3};
use static_assertions::const_assert_eq;

/// Per-pass uniforms. Matches `PassUniforms` in the patch shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassUniform {
    /// Direction towards the light. (offset 0)
    pub light_direction: [f32; 3],
    /// Global opacity. (offset 12)
    pub alpha: f32,
    /// Water animation clock. Unused by the terrain pass. (offset 16)
    pub water_time: f32,
    /// Water depth scale. Unused by the terrain pass. (offset 20)
    pub depth_scale: f32,
    /// Freeze temperature in unit range. Unused by the terrain pass. (offset 24)
    pub freeze_temperature: f32,
    /// Curvature radius of the far tier, 0 for spherical patches. (offset 28)
    pub radius: f32,
}

const_assert_eq!(std::mem::size_of::<PassUniform>(), 32);

impl PassUniform {
    /// Uniforms for a water pass. `freeze_temperature` is given in 0–255
    /// units and normalised here.
    pub fn water(
        light_direction: Vec3,
        alpha: f32,
        water_time: f32,
        depth_scale: f32,
        freeze_temperature: f32,
        radius: f32,
    ) -> Self {
        Self {
            light_direction: light_direction.to_array(),
            alpha,
            water_time,
            depth_scale,
            freeze_temperature: freeze_temperature / 255.0,
            radius,
        }
    }

    /// Uniforms for a terrain pass.
    pub fn terrain(light_direction: Vec3, alpha: f32, radius: f32) -> Self {
        Self {
            light_direction: light_direction.to_array(),
            alpha,
            radius,
            ..Self::default()
        }
    }
}

/// Per-draw transform. Matches `DrawUniforms` in the patch shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PatchDrawUniform {
    /// `view_projection * world`.
    pub world_view_proj: [[f32; 4]; 4],
    /// Patch space to camera-relative world space.
    pub world: [[f32; 4]; 4],
}

const_assert_eq!(std::mem::size_of::<PatchDrawUniform>(), 128);

impl PatchDrawUniform {
    /// Transform for patches whose vertices are planet-relative. The camera
    /// sits at `relative_position` from the planet center, and `rotation`
    /// orients the planet in the world.
    pub fn new(view_projection: Mat4, relative_position: DVec3, rotation: Mat4) -> Self {
        let world = Mat4::from_translation(-relative_position.as_vec3()) * rotation;
        Self {
            world_view_proj: (view_projection * world).to_cols_array_2d(),
            world: world.to_cols_array_2d(),
        }
    }

    /// World matrix as a `Mat4`.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }

    /// World-view-projection matrix as a `Mat4`.
    pub fn world_view_proj_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world_view_proj)
    }
}
