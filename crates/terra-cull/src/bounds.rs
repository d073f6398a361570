//! Double-precision patch bounding box with a closest-point query.

use glam::{DVec3, Vec3};

/// An axis-aligned bounding box in planet-relative f64 space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchBounds {
    /// Minimum corner of the bounding box.
    pub min: DVec3,
    /// Maximum corner of the bounding box.
    pub max: DVec3,
}

impl PatchBounds {
    /// Create bounds from two corners. The corners may be given in any order.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create bounds from a center and half-extents.
    pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box containing every point in `points`. Returns `None` for an empty slice.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    /// Center of the box.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Center of the box narrowed to f32, as used for camera-relative frustum tests.
    pub fn center_f32(&self) -> Vec3 {
        self.center().as_vec3()
    }

    /// Half-extents along each axis.
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Radius of the sphere circumscribing the box.
    pub fn bounding_radius(&self) -> f64 {
        self.half_extents().length()
    }

    /// Point of the box closest to `point`. Returns `point` itself when it lies inside.
    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        point.max(self.min).min(self.max)
    }
}
