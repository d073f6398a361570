//! Planetary terrain patch rendering: a registry of streamed patch meshes in a
//! spherical near tier and a flattened far tier, per-frame culling and draw
//! ordering, deferred GPU resource release, and a wgpu backend.
//!
//! The producer side builds [`PatchMesh`]es (uploading geometry through
//! [`gpu::GpuResourcePool`]) and hands them to a [`PatchMeshManager`]. Each
//! frame the manager records pass and draw calls into a [`PatchDrawSink`],
//! typically a [`PatchDrawList`] that [`gpu::PatchRenderer`] replays.

mod arena;
mod draw;
mod frame;
mod handle;
mod manager;
mod materials;
mod mesh;
mod orchestrator;
mod recycler;
mod scatter;
mod uniforms;

pub mod gpu;

pub use arena::{PatchArena, PatchId};
pub use draw::{DrawCommand, PassKind, PassSetup, PassTextures, PatchDraw, PatchDrawList, PatchDrawSink};
pub use frame::{FarFrame, PatchFrameStats, SphericalFrame};
pub use handle::{BufferHandle, TextureHandle};
pub use manager::PatchMeshManager;
pub use materials::PlanetMaterials;
pub use mesh::{DeleteSignal, PatchBuffers, PatchMesh, PatchState, WaterMesh};
pub use recycler::{RecycleLog, ResourceRecycler};
pub use scatter::{AtmosphereParams, SCATTER_SAMPLES, ScatterUniform};
pub use uniforms::{PassUniform, PatchDrawUniform};

pub use terra_cull::PatchBounds;
