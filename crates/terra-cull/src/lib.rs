//! Visibility tests for planetary terrain patches: horizon occlusion against the
//! planet sphere (or the flattened far-field tip of it) and view-frustum intersection.
//!
//! Everything here is pure. The patch renderer calls these once per live patch
//! per frame and keeps no culling state between frames.

mod bounds;
mod frustum;
mod horizon;

pub use bounds::PatchBounds;
pub use frustum::Frustum;
pub use horizon::{HORIZON_TOLERANCE, is_over_far_horizon, is_over_horizon};
