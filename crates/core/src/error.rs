use dyntex_device::DeviceError;

/// Errors surfaced by dynamic texture units and their services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TextureError {
    /// A descriptor or input texture failed validation. Nothing was allocated.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The device could not allocate a texture.
    #[error("texture allocation failed: {0}")]
    AllocationFailed(#[source] DeviceError),
    /// The named kernel failed to compile, is unknown, or its program was
    /// dropped by a registry reset.
    #[error("compute program `{kernel}` unavailable: {reason}")]
    PipelineUnavailable { kernel: String, reason: String },
    /// Recording or submitting a command buffer failed.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("unit `{0}` has been released")]
    UnitReleased(String),
}

impl From<DeviceError> for TextureError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::InvalidDescriptor(e) => Self::InvalidInput(e.to_string()),
            DeviceError::UnsupportedFormat(_)
            | DeviceError::OutOfMemory { .. }
            | DeviceError::ExtentTooLarge { .. }
            | DeviceError::AllocationRejected(_) => Self::AllocationFailed(err),
            DeviceError::KernelNotFound(ref name) => Self::PipelineUnavailable {
                kernel: name.clone(),
                reason: err.to_string(),
            },
            DeviceError::KernelCompilation { ref name, ref reason } => Self::PipelineUnavailable {
                kernel: name.clone(),
                reason: reason.clone(),
            },
            DeviceError::EncoderUnavailable(_)
            | DeviceError::UnknownTexture(_)
            | DeviceError::UploadSizeMismatch { .. }
            | DeviceError::SubmissionFailed(_) => Self::EncodingFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntex_common::{Extent2d, PixelFormat};

    #[test]
    fn device_errors_map_to_categories() {
        assert!(matches!(
            TextureError::from(DeviceError::OutOfMemory { requested: 4 }),
            TextureError::AllocationFailed(_)
        ));
        assert!(matches!(
            TextureError::from(DeviceError::ExtentTooLarge {
                extent: Extent2d::new(9000, 1),
                max: 8192,
            }),
            TextureError::AllocationFailed(_)
        ));
        assert!(matches!(
            TextureError::from(DeviceError::UnsupportedFormat(PixelFormat::R16Float)),
            TextureError::AllocationFailed(_)
        ));
        assert_eq!(
            TextureError::from(DeviceError::KernelNotFound("x".into())),
            TextureError::PipelineUnavailable {
                kernel: "x".into(),
                reason: "kernel `x` is not in the kernel library".into(),
            }
        );
        assert!(matches!(
            TextureError::from(DeviceError::EncoderUnavailable("e".into())),
            TextureError::EncodingFailed(_)
        ));
    }
}
