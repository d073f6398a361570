//! Terrain patch meshes handed over by the terrain producer.
//!
//! A [`PatchMesh`] is built outside this crate (terrain generation) around GPU
//! handles that are already uploaded. Once added to the
//! [`PatchMeshManager`](crate::PatchMeshManager) the manager owns it and is the
//! only place its resources are released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{DVec3, Vec3};
use terra_cull::PatchBounds;

use crate::handle::{BufferHandle, TextureHandle};
use crate::recycler::ResourceRecycler;

/// Pending-deletion flag shared between the producer and the manager.
///
/// The producer may mark it from any thread at any time. The manager only
/// reads it during its draw sweeps.
#[derive(Clone, Debug, Default)]
pub struct DeleteSignal(Arc<AtomicBool>);

impl DeleteSignal {
    /// Create an unmarked signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request deletion of the patch. Idempotent.
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether deletion has been requested.
    pub fn is_marked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle of a patch inside the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchState {
    /// Drawn every frame until its signal is marked.
    Active,
    /// A sweep has seen the signal and released part of the patch; the mesh
    /// object waits for the sweep of its other list.
    Deleting,
    /// The mesh object has been freed and its handle is stale.
    Freed,
}

/// Terrain geometry of a patch. Skirt indices follow the surface indices in
/// the index buffer, so drawing without skirts is a shorter index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchBuffers {
    /// Vertex buffer.
    pub vertex: BufferHandle,
    /// Index buffer (u32 indices).
    pub index: BufferHandle,
    /// Index count including skirts.
    pub index_count: u32,
    /// Index count of the surface alone.
    pub surface_index_count: u32,
}

impl PatchBuffers {
    /// Number of indices to draw with or without skirts.
    pub fn draw_count(&self, skirts: bool) -> u32 {
        if skirts {
            self.index_count
        } else {
            self.surface_index_count.min(self.index_count)
        }
    }

    fn release(self, recycler: &mut impl ResourceRecycler) {
        recycler.free_buffer(self.vertex);
        recycler.free_buffer(self.index);
    }
}

/// Water sub-mesh of a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaterMesh {
    /// Vertex buffer.
    pub vertex: BufferHandle,
    /// Index buffer (u32 indices).
    pub index: BufferHandle,
    /// Index count.
    pub index_count: u32,
}

impl WaterMesh {
    pub(crate) fn release(self, recycler: &mut impl ResourceRecycler) {
        recycler.free_buffer(self.vertex);
        recycler.free_buffer(self.index);
    }
}

/// A drawable terrain patch.
#[derive(Debug)]
pub struct PatchMesh {
    bounds: PatchBounds,
    aabb_center: Vec3,
    bounding_radius: f32,
    pub(crate) distance2: f64,
    terrain: Option<PatchBuffers>,
    water: Option<WaterMesh>,
    normal_map: Option<TextureHandle>,
    signal: DeleteSignal,
    pub(crate) state: PatchState,
    pub(crate) renderable: bool,
}

impl PatchMesh {
    /// Create a patch from its planet-relative bounds and uploaded terrain geometry.
    ///
    /// The bounding sphere defaults to the sphere circumscribing `bounds`.
    pub fn new(bounds: PatchBounds, terrain: PatchBuffers) -> Self {
        Self {
            aabb_center: bounds.center_f32(),
            bounding_radius: bounds.bounding_radius() as f32,
            bounds,
            distance2: f64::MAX,
            terrain: Some(terrain),
            water: None,
            normal_map: None,
            signal: DeleteSignal::new(),
            state: PatchState::Active,
            renderable: false,
        }
    }

    /// Attach a water sub-mesh.
    pub fn with_water(mut self, water: WaterMesh) -> Self {
        self.water = Some(water);
        self
    }

    /// Attach a normal map.
    pub fn with_normal_map(mut self, normal_map: TextureHandle) -> Self {
        self.normal_map = Some(normal_map);
        self
    }

    /// Override the bounding-sphere radius used for frustum culling.
    pub fn with_bounding_radius(mut self, radius: f32) -> Self {
        self.bounding_radius = radius;
        self
    }

    /// Use an existing deletion signal, e.g. one the producer already tracks.
    pub fn with_delete_signal(mut self, signal: DeleteSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Planet-relative bounding box.
    pub fn bounds(&self) -> &PatchBounds {
        &self.bounds
    }

    /// Bounding-box center in f32.
    pub fn aabb_center(&self) -> Vec3 {
        self.aabb_center
    }

    /// Bounding-sphere radius.
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Closest point of the patch bounds to `position`.
    pub fn closest_point(&self, position: DVec3) -> DVec3 {
        self.bounds.closest_point(position)
    }

    /// Squared distance computed by the most recent sort of this patch's tier.
    pub fn distance2(&self) -> f64 {
        self.distance2
    }

    /// Terrain geometry, `None` once the mesh has been freed.
    pub fn terrain(&self) -> Option<&PatchBuffers> {
        self.terrain.as_ref()
    }

    /// Water sub-mesh, if the patch still holds one.
    pub fn water(&self) -> Option<&WaterMesh> {
        self.water.as_ref()
    }

    /// Whether the patch still holds a water sub-mesh.
    pub fn has_water(&self) -> bool {
        self.water.is_some()
    }

    /// Normal map, if not yet recycled.
    pub fn normal_map(&self) -> Option<TextureHandle> {
        self.normal_map
    }

    /// A clone of the patch's deletion signal for the producer to keep.
    pub fn delete_signal(&self) -> DeleteSignal {
        self.signal.clone()
    }

    /// Whether deletion has been requested.
    pub fn should_delete(&self) -> bool {
        self.signal.is_marked()
    }

    /// Lifecycle state.
    pub fn state(&self) -> PatchState {
        self.state
    }

    /// Set once the patch has been added to a manager.
    pub fn is_renderable(&self) -> bool {
        self.renderable
    }

    pub(crate) fn take_water(&mut self) -> Option<WaterMesh> {
        self.water.take()
    }

    pub(crate) fn take_normal_map(&mut self) -> Option<TextureHandle> {
        self.normal_map.take()
    }

    /// Return every handle the patch still holds. Each handle is taken out
    /// first, so calling this twice releases nothing the second time.
    pub(crate) fn release_all(&mut self, recycler: &mut impl ResourceRecycler) {
        if let Some(terrain) = self.terrain.take() {
            terrain.release(recycler);
        }
        if let Some(water) = self.water.take() {
            water.release(recycler);
        }
        if let Some(normal_map) = self.normal_map.take() {
            recycler.recycle_normal_map(normal_map);
        }
        self.renderable = false;
        self.state = PatchState::Freed;
    }
}
