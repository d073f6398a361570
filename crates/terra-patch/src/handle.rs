//! Opaque GPU resource handles.
//!
//! Patches never hold API objects directly. A handle names a slot in the
//! backend's resource pool plus the slot generation it was issued for, so a
//! handle kept past its release never resolves to whatever reuses the slot.

/// Handle to a GPU buffer (vertex or index data).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

/// Handle to a GPU texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle {
    index: u32,
    generation: u32,
}

impl BufferHandle {
    /// Handle for a slot at generation zero.
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    pub const fn with_generation(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the pool.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl TextureHandle {
    /// Handle for a slot at generation zero.
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    pub const fn with_generation(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the pool.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}
