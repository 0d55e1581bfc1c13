use serde::{Deserialize, Serialize};

/// Pixel formats a dynamic texture can be allocated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    R32Float,
    R16Float,
    Rgba16Float,
    Rg8Unorm,
}

impl PixelFormat {
    /// The formats the pipeline's kernels and samplers are written against.
    /// Anything else is valid but non-standard.
    pub fn is_common(self) -> bool {
        matches!(
            self,
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::R32Float | Self::R16Float
        )
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::R32Float => 4,
            Self::R16Float | Self::Rg8Unorm => 2,
            Self::Rgba16Float => 8,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Bgra8Unorm => "bgra8unorm",
            Self::R32Float => "r32float",
            Self::R16Float => "r16float",
            Self::Rgba16Float => "rgba16float",
            Self::Rg8Unorm => "rg8unorm",
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// How a texture is accessed by the GPU.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u8 {
        /// Written by compute kernels as a storage image.
        const COMPUTE_WRITE = 1 << 0;
        /// Sampled or loaded by shaders.
        const SHADER_READ = 1 << 1;
        /// Source of a blit.
        const COPY_SRC = 1 << 2;
        /// Destination of a blit or a CPU upload.
        const COPY_DST = 1 << 3;
    }
}

impl TextureUsages {
    /// Usage carried by every unit-owned output texture.
    pub const DYNAMIC_OUTPUT: Self = Self::COMPUTE_WRITE
        .union(Self::SHADER_READ)
        .union(Self::COPY_SRC)
        .union(Self::COPY_DST);
}

/// Width and height of a 2D texture in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Extent2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Declared shape and format of a GPU texture, independent of its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub extent: Extent2d,
    pub format: PixelFormat,
    pub usage: TextureUsages,
}

/// Errors from descriptor validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("texture extent {0} has a zero dimension")]
    ZeroExtent(Extent2d),
    #[error("usage {usage:?} is missing required {required:?}")]
    MissingUsage {
        usage: TextureUsages,
        required: TextureUsages,
    },
}

impl TextureDescriptor {
    /// Descriptor for a unit output texture: compute-writable and sampleable.
    pub fn dynamic(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            extent: Extent2d::new(width, height),
            format,
            usage: TextureUsages::DYNAMIC_OUTPUT,
        }
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Same format and usage at a new extent.
    pub fn with_extent(&self, extent: Extent2d) -> Self {
        Self { extent, ..*self }
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.extent.is_empty() {
            return Err(DescriptorError::ZeroExtent(self.extent));
        }
        Ok(())
    }

    /// Validate a descriptor that will receive compute output and be sampled.
    pub fn validate_output(&self) -> Result<(), DescriptorError> {
        self.validate()?;
        let required = TextureUsages::COMPUTE_WRITE | TextureUsages::SHADER_READ;
        if !self.usage.contains(required) {
            return Err(DescriptorError::MissingUsage {
                usage: self.usage,
                required,
            });
        }
        Ok(())
    }

    /// Bytes of tightly packed texel data, or `None` when that overflows.
    pub fn byte_size(&self) -> Option<usize> {
        (self.extent.width as usize)
            .checked_mul(self.extent.height as usize)?
            .checked_mul(self.format.bytes_per_texel() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_is_rejected() {
        let desc = TextureDescriptor::dynamic(0, 64, PixelFormat::Rgba8Unorm);
        assert_eq!(
            desc.validate(),
            Err(DescriptorError::ZeroExtent(Extent2d::new(0, 64)))
        );
    }

    #[test]
    fn dynamic_descriptor_is_valid_output() {
        let desc = TextureDescriptor::dynamic(100, 100, PixelFormat::Rgba8Unorm);
        assert!(desc.validate_output().is_ok());
        assert_eq!(desc.byte_size(), Some(100 * 100 * 4));
    }

    #[test]
    fn byte_size_overflow_is_none() {
        let desc = TextureDescriptor::dynamic(u32::MAX, u32::MAX, PixelFormat::Rgba8Unorm);
        assert_eq!(desc.byte_size(), None);
    }

    #[test]
    fn output_requires_write_and_read() {
        let desc = TextureDescriptor {
            extent: Extent2d::new(8, 8),
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsages::SHADER_READ,
        };
        assert!(matches!(
            desc.validate_output(),
            Err(DescriptorError::MissingUsage { .. })
        ));
    }

    #[test]
    fn common_formats() {
        assert!(PixelFormat::Rgba8Unorm.is_common());
        assert!(PixelFormat::R16Float.is_common());
        assert!(!PixelFormat::Rgba16Float.is_common());
        assert!(!PixelFormat::Rg8Unorm.is_common());
    }

    #[test]
    fn with_extent_keeps_format() {
        let desc = TextureDescriptor::dynamic(4, 4, PixelFormat::Bgra8Unorm);
        let resized = desc.with_extent(Extent2d::new(9, 3));
        assert_eq!(resized.format, PixelFormat::Bgra8Unorm);
        assert_eq!(resized.usage, desc.usage);
        assert_eq!(resized.extent, Extent2d::new(9, 3));
    }
}
