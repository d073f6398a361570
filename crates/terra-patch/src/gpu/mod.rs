//! wgpu backend: resource pool, patch pipelines and draw list replay.

mod pipeline;
mod pool;
mod renderer;
mod vertex;

pub use pipeline::{DEPTH_FORMAT, PatchPipelines, TERRAIN_SHADER_SOURCE, WATER_SHADER_SOURCE};
pub use pool::{
    BufferKind, GpuResourcePool, MATERIAL_TEXTURE_FORMAT, NORMAL_MAP_FORMAT, PatchUploadError,
};
pub use renderer::{MAX_PASSES, PatchRenderStats, PatchRenderer};
pub use vertex::{PatchVertex, WaterVertex};
