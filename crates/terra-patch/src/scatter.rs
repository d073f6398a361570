//! Atmospheric scattering parameters and the per-pass scatter uniform block.
//!
//! The terrain and water shaders approximate ground-from-space Rayleigh/Mie
//! scattering with a short ray march. Everything that does not depend on the
//! camera is premultiplied once in [`AtmosphereParams`]; [`ScatterUniform`]
//! adds the camera terms each time a pass is set up.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::const_assert_eq;

/// Fixed number of ray-march samples used by the shaders.
pub const SCATTER_SAMPLES: i32 = 3;

/// Scattering description of a planet's atmosphere.
#[derive(Clone, Debug, PartialEq)]
pub struct AtmosphereParams {
    /// Inner radius: the planet surface.
    pub planet_radius: f32,
    /// Outer radius: top of the atmosphere.
    pub radius: f32,
    /// `1 / wavelength^4` for the red, green and blue channels.
    pub inv_wavelength4: Vec3,
    /// Rayleigh constant times sun brightness.
    pub kr_esun: f32,
    /// Mie constant times sun brightness.
    pub km_esun: f32,
    /// Rayleigh constant times 4π.
    pub kr_4pi: f32,
    /// Mie constant times 4π.
    pub km_4pi: f32,
    /// Altitude, as a fraction of the atmosphere thickness, at which the average density is found.
    pub scale_depth: f32,
    /// Henyey-Greenstein asymmetry of the Mie phase function.
    pub g: f32,
}

impl AtmosphereParams {
    /// Build parameters from physical constants, premultiplying the terms the
    /// shaders consume.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planet_radius: f32,
        radius: f32,
        wavelength: [f32; 3],
        kr: f32,
        km: f32,
        e_sun: f32,
        scale_depth: f32,
        g: f32,
    ) -> Self {
        let inv_wavelength4 = Vec3::from_array(wavelength.map(|w| 1.0 / w.powi(4)));
        Self {
            planet_radius,
            radius,
            inv_wavelength4,
            kr_esun: kr * e_sun,
            km_esun: km * e_sun,
            kr_4pi: kr * 4.0 * PI,
            km_4pi: km * 4.0 * PI,
            scale_depth,
            g,
        }
    }

    /// Earth-like atmosphere for a planet of the given radius.
    pub fn earth_like(planet_radius: f32) -> Self {
        Self::new(
            planet_radius,
            planet_radius * 1.025,
            [0.65, 0.57, 0.475],
            0.0025,
            0.0010,
            20.0,
            0.25,
            -0.99,
        )
    }

    /// Atmosphere thickness.
    pub fn thickness(&self) -> f32 {
        self.radius - self.planet_radius
    }
}

/// GPU scatter block. Matches `ScatterUniforms` in the patch shaders.
///
/// A zeroed block (`num_samples == 0`) tells the shaders to skip scattering.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ScatterUniform {
    /// Camera position relative to the planet center. (offset 0)
    pub camera_position: [f32; 3],
    /// Squared camera height. (offset 12)
    pub camera_height2: f32,
    /// `1 / wavelength^4` (RGB). (offset 16)
    pub inv_wavelength: [f32; 3],
    /// Planet radius. (offset 28)
    pub inner_radius: f32,
    /// Atmosphere radius. (offset 32)
    pub outer_radius: f32,
    /// Squared atmosphere radius. (offset 36)
    pub outer_radius2: f32,
    /// (offset 40)
    pub kr_esun: f32,
    /// (offset 44)
    pub km_esun: f32,
    /// (offset 48)
    pub kr_4pi: f32,
    /// (offset 52)
    pub km_4pi: f32,
    /// `1 / (outer_radius - inner_radius)`. (offset 56)
    pub scale: f32,
    /// (offset 60)
    pub scale_depth: f32,
    /// `scale / scale_depth`. (offset 64)
    pub scale_over_scale_depth: f32,
    /// Sample count as a float. (offset 68)
    pub num_samples_f: f32,
    /// Mie asymmetry. (offset 72)
    pub g: f32,
    /// (offset 76)
    pub g2: f32,
    /// Sample count. (offset 80)
    pub num_samples: i32,
    /// Padding to a 16-byte multiple. (offset 84)
    pub _padding: [i32; 3],
}

const_assert_eq!(std::mem::size_of::<ScatterUniform>(), 96);

impl ScatterUniform {
    /// Fill the block for a camera at `camera_position` (planet-relative).
    pub fn from_params(params: &AtmosphereParams, camera_position: Vec3) -> Self {
        let scale = 1.0 / params.thickness();
        Self {
            camera_position: camera_position.to_array(),
            camera_height2: camera_position.length_squared(),
            inv_wavelength: params.inv_wavelength4.to_array(),
            inner_radius: params.planet_radius,
            outer_radius: params.radius,
            outer_radius2: params.radius * params.radius,
            kr_esun: params.kr_esun,
            km_esun: params.km_esun,
            kr_4pi: params.kr_4pi,
            km_4pi: params.km_4pi,
            scale,
            scale_depth: params.scale_depth,
            scale_over_scale_depth: scale / params.scale_depth,
            num_samples_f: SCATTER_SAMPLES as f32,
            g: params.g,
            g2: params.g * params.g,
            num_samples: SCATTER_SAMPLES,
            _padding: [0; 3],
        }
    }

    /// Whether the block enables scattering in the shaders.
    pub fn is_enabled(&self) -> bool {
        self.num_samples > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earth_like_premultiplied_terms() {
        let p = AtmosphereParams::earth_like(1000.0);
        assert_eq!(p.radius, 1025.0);
        assert!((p.kr_esun - 0.05).abs() < 1e-6);
        assert!((p.km_esun - 0.02).abs() < 1e-6);
        assert!((p.kr_4pi - 0.0025 * 4.0 * PI).abs() < 1e-7);
        assert!((p.inv_wavelength4.x - 1.0 / 0.65f32.powi(4)).abs() < 1e-4);
        // Blue scatters more than red.
        assert!(p.inv_wavelength4.z > p.inv_wavelength4.x);
    }

    #[test]
    fn test_uniform_derived_fields() {
        let p = AtmosphereParams::earth_like(1000.0);
        let cam = Vec3::new(0.0, 1100.0, 0.0);
        let u = ScatterUniform::from_params(&p, cam);

        assert!((u.camera_height2 - 1100.0 * 1100.0).abs() < 1.0);
        assert_eq!(u.inner_radius, 1000.0);
        assert_eq!(u.outer_radius2, 1025.0 * 1025.0);
        assert!((u.scale - 1.0 / 25.0).abs() < 1e-6);
        assert!((u.scale_over_scale_depth - (1.0 / 25.0) / 0.25).abs() < 1e-6);
        assert_eq!(u.num_samples, 3);
        assert_eq!(u.num_samples_f, 3.0);
        assert!((u.g2 - 0.9801).abs() < 1e-6);
        assert!(u.is_enabled());
    }

    #[test]
    fn test_zeroed_block_disables_scattering() {
        assert!(!ScatterUniform::zeroed().is_enabled());
    }

    #[test]
    fn test_uniform_is_deterministic() {
        let p = AtmosphereParams::earth_like(6_000_000.0);
        let cam = Vec3::new(3.0, 6_100_000.0, -2.0);
        assert_eq!(
            ScatterUniform::from_params(&p, cam),
            ScatterUniform::from_params(&p, cam)
        );
    }
}
