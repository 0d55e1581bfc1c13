use dyntex_common::{DescriptorError, Extent2d, PixelFormat};

use crate::command::TextureId;

/// Errors reported by a GPU backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid texture descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("pixel format {0} is not supported for the requested usage")]
    UnsupportedFormat(PixelFormat),
    #[error("out of device memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error("texture extent {extent} exceeds the device limit of {max} texels per side")]
    ExtentTooLarge { extent: Extent2d, max: u32 },
    #[error("texture allocation rejected: {0}")]
    AllocationRejected(String),
    #[error("kernel `{0}` is not in the kernel library")]
    KernelNotFound(String),
    #[error("kernel `{name}` failed to compile: {reason}")]
    KernelCompilation { name: String, reason: String },
    #[error("could not create command encoder `{0}`")]
    EncoderUnavailable(String),
    #[error("texture {0:?} does not exist on this device")]
    UnknownTexture(TextureId),
    #[error("upload size mismatch: expected {expected} bytes, got {actual}")]
    UploadSizeMismatch { expected: usize, actual: usize },
    #[error("submission rejected: {0}")]
    SubmissionFailed(String),
}
