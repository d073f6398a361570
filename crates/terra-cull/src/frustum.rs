//! Camera-relative view frustum with a bounding-sphere test.
//!
//! Patch positions are converted to camera-relative f32 before testing, so the
//! view-projection matrix handed in must not contain the camera translation.

use glam::{Mat4, Vec3, Vec4};

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A view frustum defined by six inward-pointing planes extracted from a
/// view-projection matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far. Each `Vec4(a, b, c, d)` holds the
    /// normalized inward normal and the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix
    /// using the Gribb-Hartmann method.
    ///
    /// Works with reverse-Z projections: the geometric far plane is taken from
    /// row 2 alone and the near plane from row 3 + row 2.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[3] + rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Test whether a sphere intersects the frustum.
    ///
    /// A sphere is rejected only when its center lies more than `radius`
    /// behind some plane, so spheres touching a plane are kept.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }

    /// The six planes as `(normal, distance)` pairs.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            1000.0, // reverse-Z: far as near param
            0.1,    // reverse-Z: near as far param
        );
        proj * view
    }

    #[test]
    fn test_sphere_ahead_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_sphere_behind_camera_rejected() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 50.0), 5.0));
    }

    #[test]
    fn test_sphere_straddling_side_plane_kept() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        // Center well outside the left plane, radius large enough to reach back in.
        let center = Vec3::new(-60.0, 0.0, -50.0);
        assert!(!frustum.intersects_sphere(center, 1.0));
        assert!(frustum.intersects_sphere(center, 40.0));
    }

    #[test]
    fn test_sphere_beyond_far_plane_rejected() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -2000.0), 10.0));
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -1005.0), 10.0));
    }

    #[test]
    fn test_planes_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in frustum.planes() {
            let len = plane.truncate().length();
            assert!((len - 1.0).abs() < 1e-4, "plane normal not normalized: {len}");
        }
    }
}
