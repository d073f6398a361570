//! Contract for handing GPU resources back to a shared pool.
//!
//! The patch manager never destroys GPU objects itself. When a patch is swept it
//! returns each handle through a [`ResourceRecycler`], which may reuse the
//! underlying allocation for a later upload.

use crate::handle::{BufferHandle, TextureHandle};

/// Receives GPU resources released by the patch manager.
pub trait ResourceRecycler {
    /// Return a vertex or index buffer to the pool.
    fn free_buffer(&mut self, buffer: BufferHandle);

    /// Return a patch normal map to the pool for reuse by a patch of the same resolution.
    fn recycle_normal_map(&mut self, texture: TextureHandle);
}

/// A recycler that only records what it was given.
///
/// Used by headless runs that have no GPU pool behind the handles, and by
/// tests that need to count releases.
#[derive(Debug, Default, Clone)]
pub struct RecycleLog {
    buffers: Vec<BufferHandle>,
    normal_maps: Vec<TextureHandle>,
}

impl RecycleLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers freed so far, in release order.
    pub fn freed_buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    /// Normal maps recycled so far, in release order.
    pub fn recycled_normal_maps(&self) -> &[TextureHandle] {
        &self.normal_maps
    }

    /// How many times `buffer` has been freed.
    pub fn times_freed(&self, buffer: BufferHandle) -> usize {
        self.buffers.iter().filter(|&&b| b == buffer).count()
    }

    /// How many times `texture` has been recycled.
    pub fn times_recycled(&self, texture: TextureHandle) -> usize {
        self.normal_maps.iter().filter(|&&t| t == texture).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.normal_maps.clear();
    }
}

impl ResourceRecycler for RecycleLog {
    fn free_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.push(buffer);
    }

    fn recycle_normal_map(&mut self, texture: TextureHandle) {
        self.normal_maps.push(texture);
    }
}

impl<R: ResourceRecycler + ?Sized> ResourceRecycler for &mut R {
    fn free_buffer(&mut self, buffer: BufferHandle) {
        (**self).free_buffer(buffer);
    }

    fn recycle_normal_map(&mut self, texture: TextureHandle) {
        (**self).recycle_normal_map(texture);
    }
}
