//! Horizon occlusion for spherical and far-field terrain patches.
//!
//! A patch is hidden when its closest point lies further around the planet than
//! the horizon seen from the camera. Both tests compare the angle (measured at the
//! planet center) between the camera and the point against the horizon angle
//! `acos(r / h)`, widened by [`HORIZON_TOLERANCE`] so patches with tall geometry
//! near the horizon are kept.

use glam::DVec3;

/// Angular slack in radians added to the horizon angle before a point is
/// considered occluded.
pub const HORIZON_TOLERANCE: f64 = 0.1;

/// Returns `true` when `point` is hidden behind the planet's curvature as seen
/// from `camera`.
///
/// Both positions are relative to the planet center. The camera height is
/// clamped to `planet_radius + 1` so a camera below the surface still yields a
/// finite horizon.
pub fn is_over_horizon(camera: DVec3, point: DVec3, planet_radius: f64) -> bool {
    let (Some(camera_dir), Some(point_dir)) = (camera.try_normalize(), point.try_normalize())
    else {
        return false;
    };
    let camera_height = camera.length().max(planet_radius + 1.0);
    beyond_horizon(
        angle_between(camera_dir, point_dir),
        horizon_angle(planet_radius, camera_height),
    )
}

/// Horizon test for the far-field tier, where patches live on a flat plane
/// tangent to the planet at the origin.
///
/// The plane is treated as the tip of a sphere of `planet_radius`: the camera
/// sits at `(0, camera.y + r, 0)` above the sphere center and the point is taken
/// relative to the sphere center directly below the camera.
pub fn is_over_far_horizon(camera: DVec3, point: DVec3, planet_radius: f64) -> bool {
    let sphere_point = point - DVec3::new(camera.x, -planet_radius, camera.z);
    let sphere_camera = DVec3::new(0.0, camera.y + planet_radius, 0.0);

    let (Some(camera_dir), Some(point_dir)) =
        (sphere_camera.try_normalize(), sphere_point.try_normalize())
    else {
        return false;
    };
    let camera_height = sphere_camera.length().max(planet_radius + 1.0);
    beyond_horizon(
        angle_between(camera_dir, point_dir),
        horizon_angle(planet_radius, camera_height),
    )
}

fn horizon_angle(planet_radius: f64, camera_height: f64) -> f64 {
    (planet_radius / camera_height).clamp(-1.0, 1.0).acos()
}

fn angle_between(a: DVec3, b: DVec3) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Boundary inclusive: a point exactly on the widened horizon is occluded.
fn beyond_horizon(point_angle: f64, horizon_angle: f64) -> bool {
    point_angle >= horizon_angle + HORIZON_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f64 = 6_000_000.0;

    fn surface_point(angle_from_pole: f64) -> DVec3 {
        DVec3::new(angle_from_pole.sin(), angle_from_pole.cos(), 0.0) * RADIUS
    }

    #[test]
    fn test_point_below_camera_visible() {
        let camera = DVec3::new(0.0, RADIUS + 1000.0, 0.0);
        assert!(!is_over_horizon(camera, surface_point(0.0), RADIUS));
    }

    #[test]
    fn test_antipode_occluded() {
        let camera = DVec3::new(0.0, RADIUS + 1000.0, 0.0);
        assert!(is_over_horizon(camera, surface_point(std::f64::consts::PI), RADIUS));
    }

    #[test]
    fn test_higher_camera_sees_further() {
        // Horizon angle from 2R is 60 degrees; from 1.01R it is ~8 degrees.
        let point = surface_point(0.8);
        let low = DVec3::new(0.0, RADIUS * 1.01, 0.0);
        let high = DVec3::new(0.0, RADIUS * 2.0, 0.0);
        assert!(is_over_horizon(low, point, RADIUS));
        assert!(!is_over_horizon(high, point, RADIUS));
    }

    #[test]
    fn test_tolerance_keeps_points_just_past_horizon() {
        let camera_height = RADIUS * 2.0;
        let camera = DVec3::new(0.0, camera_height, 0.0);
        let horizon = (RADIUS / camera_height).acos();

        assert!(!is_over_horizon(camera, surface_point(horizon + 0.05), RADIUS));
        assert!(is_over_horizon(camera, surface_point(horizon + 0.15), RADIUS));
    }

    #[test]
    fn test_boundary_is_occluded() {
        let horizon = 0.75;
        assert!(beyond_horizon(horizon + HORIZON_TOLERANCE, horizon));
        assert!(!beyond_horizon(horizon + HORIZON_TOLERANCE * 0.5, horizon));
    }

    #[test]
    fn test_horizon_test_is_pure() {
        let camera = DVec3::new(100.0, RADIUS * 1.2, -40.0);
        let horizon = (RADIUS / camera.length()).acos();
        let point = surface_point(horizon + HORIZON_TOLERANCE);
        let first = is_over_horizon(camera, point, RADIUS);
        for _ in 0..8 {
            assert_eq!(is_over_horizon(camera, point, RADIUS), first);
        }
    }

    #[test]
    fn test_camera_below_surface_is_finite() {
        let camera = DVec3::new(0.0, RADIUS * 0.5, 0.0);
        assert!(!is_over_horizon(camera, surface_point(0.0), RADIUS));
        assert!(is_over_horizon(camera, surface_point(std::f64::consts::PI), RADIUS));
    }

    #[test]
    fn test_degenerate_inputs_are_visible() {
        assert!(!is_over_horizon(DVec3::ZERO, surface_point(1.0), RADIUS));
        assert!(!is_over_horizon(DVec3::Y * RADIUS, DVec3::ZERO, RADIUS));
    }

    #[test]
    fn test_far_point_under_camera_visible() {
        let camera = DVec3::new(250.0, 500.0, -100.0);
        let point = DVec3::new(250.0, 0.0, -100.0);
        assert!(!is_over_far_horizon(camera, point, RADIUS));
    }

    #[test]
    fn test_far_point_beyond_curvature_occluded() {
        // 500 m above a 6000 km sphere the horizon is ~80 km away; a point
        // 2000 km along the plane lies well past it.
        let camera = DVec3::new(0.0, 500.0, 0.0);
        let near = DVec3::new(10_000.0, 0.0, 0.0);
        let far = DVec3::new(2_000_000.0, 0.0, 0.0);
        assert!(!is_over_far_horizon(camera, near, RADIUS));
        assert!(is_over_far_horizon(camera, far, RADIUS));
    }

    #[test]
    fn test_far_horizon_ignores_camera_plane_offset() {
        let point_offset = DVec3::new(1_500_000.0, 0.0, 0.0);
        let a = DVec3::new(0.0, 200.0, 0.0);
        let b = DVec3::new(9_000.0, 200.0, -3_000.0);
        assert_eq!(
            is_over_far_horizon(a, a.with_y(0.0) + point_offset, RADIUS),
            is_over_far_horizon(b, b.with_y(0.0) + point_offset, RADIUS),
        );
    }
}
