//! Handle-indexed GPU resource pool for patch geometry and normal maps.
//!
//! Patch meshes only carry [`BufferHandle`]s and [`TextureHandle`]s. The pool
//! owns the wgpu objects behind them. Freed buffers go to free lists bucketed
//! by size class (exact size above the largest class) and recycled normal maps
//! go to a free list keyed by resolution, so streaming patches in and out does
//! not allocate on the driver every time.

use std::collections::HashMap;

use tracing::warn;

use crate::handle::{BufferHandle, TextureHandle};
use crate::mesh::{PatchBuffers, WaterMesh};
use crate::recycler::ResourceRecycler;

use super::vertex::{PatchVertex, WaterVertex};

/// Number of size classes in the pool.
const NUM_SIZE_CLASSES: usize = 6;

/// Size class thresholds in bytes: 4 KB, 8 KB, 16 KB, 32 KB, 64 KB, 128 KB.
const SIZE_CLASSES: [u64; NUM_SIZE_CLASSES] = [4096, 8192, 16384, 32768, 65536, 131072];

/// Normal maps are plain RGBA8, tangent offsets in x/z and up in y.
pub const NORMAL_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Material textures (color maps and detail textures).
pub const MATERIAL_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Errors from uploading patch data into the pool.
#[derive(Debug, thiserror::Error)]
pub enum PatchUploadError {
    /// No bytes to upload.
    #[error("{what} data is empty")]
    Empty { what: &'static str },

    /// Buffer writes must be a multiple of 4 bytes.
    #[error("{what} data length {len} is not a multiple of 4")]
    Misaligned { what: &'static str, len: usize },

    /// Surface index count larger than the index buffer.
    #[error("surface index count {surface} exceeds index count {total}")]
    SurfaceCountOutOfRange { surface: u32, total: u32 },

    /// Texture width or height is zero.
    #[error("texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// Pixel data length doesn't match the dimensions.
    #[error(
        "texture data size ({actual}) does not match expected ({expected}) for {width}x{height}"
    )]
    DataSizeMismatch {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

/// Usage of a pooled buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl BufferKind {
    fn usage(self) -> wgpu::BufferUsages {
        match self {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferKind::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        }
    }

    fn label(self) -> &'static str {
        match self {
            BufferKind::Vertex => "pooled-patch-vertex-buffer",
            BufferKind::Index => "pooled-patch-index-buffer",
        }
    }
}

struct PooledBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    size: u64,
}

struct PooledTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    normal_map: bool,
}

impl PooledTexture {
    fn bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

/// Slot storage keyed by `(index, generation)`. Taking an item bumps the slot
/// generation, so keys issued before the take stop resolving.
struct Slots<T> {
    items: Vec<Slot<T>>,
    free: Vec<u32>,
}

struct Slot<T> {
    generation: u32,
    item: Option<T>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Slots<T> {
    fn insert(&mut self, item: T) -> (u32, u32) {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.items[index as usize];
            slot.item = Some(item);
            return (index, slot.generation);
        }
        self.items.push(Slot {
            generation: 0,
            item: Some(item),
        });
        ((self.items.len() - 1) as u32, 0)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.items
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.item.as_ref())
    }

    fn take(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self
            .items
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)?;
        let item = slot.item.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(item)
    }

    fn live(&self) -> usize {
        self.items.len() - self.free.len()
    }
}

/// GPU buffers and textures behind patch handles.
///
/// Tracks total allocated and in-use GPU memory.
#[derive(Default)]
pub struct GpuResourcePool {
    buffers: Slots<PooledBuffer>,
    textures: Slots<PooledTexture>,
    /// Free vertex buffers, bucketed by size class.
    vertex_pool: [Vec<wgpu::Buffer>; NUM_SIZE_CLASSES],
    /// Free index buffers, bucketed by size class.
    index_pool: [Vec<wgpu::Buffer>; NUM_SIZE_CLASSES],
    /// Free buffers larger than the largest class, kept at their exact size.
    oversized_pool: HashMap<(BufferKind, u64), Vec<wgpu::Buffer>>,
    /// Recycled normal maps keyed by resolution.
    normal_map_pool: HashMap<(u32, u32), Vec<(wgpu::Texture, wgpu::TextureView)>>,
    total_allocated: u64,
    in_use: u64,
}

impl GpuResourcePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the smallest size class holding `min_size` bytes, `None` when
    /// it exceeds the largest class.
    pub fn size_class_for(min_size: u64) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&s| s >= min_size)
    }

    /// Upload terrain geometry. `surface_index_count` indices come first,
    /// skirt indices after them.
    pub fn upload_patch(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertices: &[PatchVertex],
        indices: &[u32],
        surface_index_count: u32,
    ) -> Result<PatchBuffers, PatchUploadError> {
        let index_count = indices.len() as u32;
        if surface_index_count > index_count {
            return Err(PatchUploadError::SurfaceCountOutOfRange {
                surface: surface_index_count,
                total: index_count,
            });
        }
        let vertex = self.upload_buffer(
            device,
            queue,
            BufferKind::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index = match self.upload_buffer(
            device,
            queue,
            BufferKind::Index,
            bytemuck::cast_slice(indices),
        ) {
            Ok(index) => index,
            Err(err) => {
                self.free_buffer(vertex);
                return Err(err);
            }
        };
        Ok(PatchBuffers {
            vertex,
            index,
            index_count,
            surface_index_count,
        })
    }

    /// Upload a water sub-mesh.
    pub fn upload_water(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertices: &[WaterVertex],
        indices: &[u32],
    ) -> Result<WaterMesh, PatchUploadError> {
        let vertex = self.upload_buffer(
            device,
            queue,
            BufferKind::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index = match self.upload_buffer(
            device,
            queue,
            BufferKind::Index,
            bytemuck::cast_slice(indices),
        ) {
            Ok(index) => index,
            Err(err) => {
                self.free_buffer(vertex);
                return Err(err);
            }
        };
        Ok(WaterMesh {
            vertex,
            index,
            index_count: indices.len() as u32,
        })
    }

    /// Copy raw bytes into a pooled buffer and return its handle.
    pub fn upload_buffer(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kind: BufferKind,
        data: &[u8],
    ) -> Result<BufferHandle, PatchUploadError> {
        let what = match kind {
            BufferKind::Vertex => "vertex",
            BufferKind::Index => "index",
        };
        if data.is_empty() {
            return Err(PatchUploadError::Empty { what });
        }
        if data.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize != 0 {
            return Err(PatchUploadError::Misaligned {
                what,
                len: data.len(),
            });
        }

        let (buffer, size) = self.acquire_buffer(device, kind, data.len() as u64);
        queue.write_buffer(&buffer, 0, data);
        let (index, generation) = self.buffers.insert(PooledBuffer { buffer, kind, size });
        Ok(BufferHandle::with_generation(index, generation))
    }

    fn acquire_buffer(
        &mut self,
        device: &wgpu::Device,
        kind: BufferKind,
        min_size: u64,
    ) -> (wgpu::Buffer, u64) {
        let (pooled, size) = match Self::size_class_for(min_size) {
            Some(class) => {
                let free = match kind {
                    BufferKind::Vertex => &mut self.vertex_pool[class],
                    BufferKind::Index => &mut self.index_pool[class],
                };
                (free.pop(), SIZE_CLASSES[class])
            }
            None => (
                self.oversized_pool
                    .get_mut(&(kind, min_size))
                    .and_then(Vec::pop),
                min_size,
            ),
        };

        self.in_use += size;
        if let Some(buffer) = pooled {
            return (buffer, size);
        }

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(kind.label()),
            size,
            usage: kind.usage(),
            mapped_at_creation: false,
        });
        self.total_allocated += size;
        (buffer, size)
    }

    /// Create or reuse a normal map of the given resolution. `data` is RGBA8.
    pub fn create_normal_map(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<TextureHandle, PatchUploadError> {
        validate_rgba(width, height, data)?;

        let reused = self
            .normal_map_pool
            .get_mut(&(width, height))
            .and_then(Vec::pop);
        let (texture, view) = match reused {
            Some(pair) => pair,
            None => {
                let texture = create_rgba_texture(
                    device,
                    "patch-normal-map",
                    width,
                    height,
                    NORMAL_MAP_FORMAT,
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.total_allocated += u64::from(width) * u64::from(height) * 4;
                (texture, view)
            }
        };
        write_rgba(queue, &texture, width, height, data);

        let pooled = PooledTexture {
            texture,
            view,
            width,
            height,
            normal_map: true,
        };
        self.in_use += pooled.bytes();
        let (index, generation) = self.textures.insert(pooled);
        Ok(TextureHandle::with_generation(index, generation))
    }

    /// Create a material texture (color map or detail texture). `data` is sRGB RGBA8.
    pub fn create_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<TextureHandle, PatchUploadError> {
        validate_rgba(width, height, data)?;

        let texture = create_rgba_texture(device, label, width, height, MATERIAL_TEXTURE_FORMAT);
        write_rgba(queue, &texture, width, height, data);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let pooled = PooledTexture {
            texture,
            view,
            width,
            height,
            normal_map: false,
        };
        self.total_allocated += pooled.bytes();
        self.in_use += pooled.bytes();
        let (index, generation) = self.textures.insert(pooled);
        Ok(TextureHandle::with_generation(index, generation))
    }

    /// Live buffer behind `handle`.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.index(), handle.generation()).map(|b| &b.buffer)
    }

    /// Live texture view behind `handle`.
    pub fn texture_view(&self, handle: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(handle.index(), handle.generation()).map(|t| &t.view)
    }

    /// Current GPU memory in use by live handles.
    pub fn gpu_memory_in_use(&self) -> u64 {
        self.in_use
    }

    /// Total GPU memory allocated (including pooled free resources).
    pub fn gpu_memory_allocated(&self) -> u64 {
        self.total_allocated
    }

    /// Number of live buffer handles.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.live()
    }

    /// Number of live texture handles.
    pub fn live_texture_count(&self) -> usize {
        self.textures.live()
    }

    /// Number of free buffers across all size classes.
    pub fn free_buffer_count(&self) -> usize {
        self.vertex_pool.iter().map(Vec::len).sum::<usize>()
            + self.index_pool.iter().map(Vec::len).sum::<usize>()
            + self.oversized_pool.values().map(Vec::len).sum::<usize>()
    }

    /// Number of normal maps waiting for reuse.
    pub fn free_normal_map_count(&self) -> usize {
        self.normal_map_pool.values().map(Vec::len).sum()
    }
}

impl ResourceRecycler for GpuResourcePool {
    fn free_buffer(&mut self, buffer: BufferHandle) {
        let Some(pooled) = self.buffers.take(buffer.index(), buffer.generation()) else {
            warn!(?buffer, "free of unknown patch buffer");
            return;
        };
        self.in_use = self.in_use.saturating_sub(pooled.size);
        match Self::size_class_for(pooled.size) {
            Some(class) => match pooled.kind {
                BufferKind::Vertex => self.vertex_pool[class].push(pooled.buffer),
                BufferKind::Index => self.index_pool[class].push(pooled.buffer),
            },
            None => self
                .oversized_pool
                .entry((pooled.kind, pooled.size))
                .or_default()
                .push(pooled.buffer),
        }
    }

    fn recycle_normal_map(&mut self, texture: TextureHandle) {
        let Some(pooled) = self.textures.take(texture.index(), texture.generation()) else {
            warn!(?texture, "recycle of unknown normal map");
            return;
        };
        let bytes = pooled.bytes();
        self.in_use = self.in_use.saturating_sub(bytes);
        if pooled.normal_map {
            self.normal_map_pool
                .entry((pooled.width, pooled.height))
                .or_default()
                .push((pooled.texture, pooled.view));
        } else {
            warn!(?texture, "material texture handed back as normal map, destroying it");
            pooled.texture.destroy();
            self.total_allocated = self.total_allocated.saturating_sub(bytes);
        }
    }
}

fn validate_rgba(width: u32, height: u32, data: &[u8]) -> Result<(), PatchUploadError> {
    if width == 0 || height == 0 {
        return Err(PatchUploadError::ZeroDimensions { width, height });
    }
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        return Err(PatchUploadError::DataSizeMismatch {
            actual: data.len(),
            expected,
            width,
            height,
        });
    }
    Ok(())
}

fn create_rgba_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

pub(crate) fn write_rgba(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    data: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    fn quad() -> (Vec<PatchVertex>, Vec<u32>) {
        let v = |x: f32, z: f32| PatchVertex {
            position: [x, 0.0, z],
            tex_coord: [x, z],
            climate: [0.5, 0.5],
        };
        (
            vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_size_class_selection() {
        assert_eq!(GpuResourcePool::size_class_for(100), Some(0));
        assert_eq!(GpuResourcePool::size_class_for(4096), Some(0));
        assert_eq!(GpuResourcePool::size_class_for(4097), Some(1));
        assert_eq!(GpuResourcePool::size_class_for(131072), Some(5));
        assert_eq!(GpuResourcePool::size_class_for(200_000), None);
    }

    #[test]
    fn test_validate_rgba() {
        assert!(validate_rgba(2, 2, &[0; 16]).is_ok());
        assert!(matches!(
            validate_rgba(0, 2, &[]),
            Err(PatchUploadError::ZeroDimensions { .. })
        ));
        assert!(matches!(
            validate_rgba(2, 2, &[0; 15]),
            Err(PatchUploadError::DataSizeMismatch { expected: 16, .. })
        ));
    }

    #[test]
    fn test_upload_and_free_reuses_buffers() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();
        let (vertices, indices) = quad();

        let first = pool.upload_patch(&device, &queue, &vertices, &indices, 6).unwrap();
        assert_eq!(first.index_count, 6);
        assert_eq!(pool.live_buffer_count(), 2);
        let allocated = pool.gpu_memory_allocated();
        assert_eq!(allocated, 2 * 4096);

        pool.free_buffer(first.vertex);
        pool.free_buffer(first.index);
        assert_eq!(pool.free_buffer_count(), 2);
        assert_eq!(pool.gpu_memory_in_use(), 0);

        let second = pool.upload_patch(&device, &queue, &vertices, &indices, 6).unwrap();
        assert_eq!(pool.gpu_memory_allocated(), allocated);
        assert_eq!(pool.free_buffer_count(), 0);
        assert!(pool.buffer(second.vertex).is_some());

        // Slots are reused, but the released handles no longer resolve.
        assert_eq!(second.vertex.index(), first.index.index());
        assert!(pool.buffer(first.vertex).is_none());
        assert!(pool.buffer(first.index).is_none());
        pool.free_buffer(first.vertex);
        assert!(pool.buffer(second.index).is_some());
        assert_eq!(pool.live_buffer_count(), 2);
    }

    #[test]
    fn test_released_slot_key_does_not_resolve_after_reuse() {
        let mut slots = Slots::default();
        let (index, generation) = slots.insert("first patch buffer");
        assert_eq!(slots.take(index, generation), Some("first patch buffer"));

        let reused = slots.insert("second patch buffer");
        assert_eq!(reused.0, index);
        assert_ne!(reused.1, generation);
        assert_eq!(slots.get(index, generation), None);
        assert_eq!(slots.take(index, generation), None);
        assert_eq!(slots.get(reused.0, reused.1), Some(&"second patch buffer"));
        assert_eq!(slots.live(), 1);
    }

    #[test]
    fn test_upload_rejects_bad_data() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();
        let (vertices, indices) = quad();

        let empty = pool.upload_patch(&device, &queue, &[], &indices, 6);
        assert!(matches!(empty, Err(PatchUploadError::Empty { what: "vertex" })));

        let odd = pool.upload_buffer(&device, &queue, BufferKind::Index, &[0u8; 6]);
        assert!(matches!(odd, Err(PatchUploadError::Misaligned { len: 6, .. })));

        let surface = pool.upload_patch(&device, &queue, &vertices, &indices, 7);
        assert!(matches!(
            surface,
            Err(PatchUploadError::SurfaceCountOutOfRange { surface: 7, total: 6 })
        ));

        let no_indices = pool.upload_patch(&device, &queue, &vertices, &[], 0);
        assert!(matches!(no_indices, Err(PatchUploadError::Empty { what: "index" })));
        // The vertex buffer of the failed upload went back to the pool.
        assert_eq!(pool.live_buffer_count(), 0);
    }

    #[test]
    fn test_normal_map_recycled_by_resolution() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pool = GpuResourcePool::new();

        let a = pool.create_normal_map(&device, &queue, 4, 4, &[128; 64]).unwrap();
        pool.recycle_normal_map(a);
        assert_eq!(pool.free_normal_map_count(), 1);
        assert!(pool.texture_view(a).is_none());

        let allocated = pool.gpu_memory_allocated();
        let other = pool.create_normal_map(&device, &queue, 8, 8, &[128; 256]).unwrap();
        assert_eq!(pool.free_normal_map_count(), 1);
        let same = pool.create_normal_map(&device, &queue, 4, 4, &[0; 64]).unwrap();
        assert_eq!(pool.free_normal_map_count(), 0);
        assert_eq!(pool.gpu_memory_allocated(), allocated + 8 * 8 * 4);
        assert!(pool.texture_view(other).is_some());
        assert!(pool.texture_view(same).is_some());
    }

    #[test]
    fn test_unknown_handles_are_ignored() {
        let mut pool = GpuResourcePool::new();
        pool.free_buffer(BufferHandle::new(42));
        pool.recycle_normal_map(TextureHandle::new(42));
        assert_eq!(pool.free_buffer_count(), 0);
        assert_eq!(pool.free_normal_map_count(), 0);
    }
}
