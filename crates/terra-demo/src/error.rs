//! Errors surfaced by the demo driver.

use terra_patch::gpu::PatchUploadError;

/// Failure while setting up or running the demo.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DemoError {
    /// A synthetic patch could not be uploaded.
    #[error("patch upload failed: {0}")]
    Upload(#[from] PatchUploadError),

    /// An adapter was found but refused to hand out a device.
    #[error("failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}
