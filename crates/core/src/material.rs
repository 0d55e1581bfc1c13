use dyntex_common::{Extent2d, PixelFormat, TextureDescriptor, TextureUsages};
use dyntex_device::TextureId;

/// What a renderable surface binds to display a unit's output.
///
/// A plain value derived from the unit's current texture each time it is
/// read; holding one across a resize leaves it pointing at the previous
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle {
    pub texture: TextureId,
    /// Bumped each time the backing texture is replaced.
    pub generation: u32,
    pub extent: Extent2d,
    pub format: PixelFormat,
}

impl MaterialHandle {
    /// Borrow this output as another unit's input.
    pub fn as_input(&self) -> InputTexture {
        InputTexture {
            texture: self.texture,
            descriptor: TextureDescriptor {
                extent: self.extent,
                format: self.format,
                usage: TextureUsages::DYNAMIC_OUTPUT,
            },
        }
    }
}

/// A texture a unit reads but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTexture {
    pub texture: TextureId,
    pub descriptor: TextureDescriptor,
}

impl InputTexture {
    pub fn extent(&self) -> Extent2d {
        self.descriptor.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_as_input_keeps_shape() {
        let material = MaterialHandle {
            texture: TextureId(4),
            generation: 2,
            extent: Extent2d::new(32, 16),
            format: PixelFormat::Bgra8Unorm,
        };
        let input = material.as_input();
        assert_eq!(input.texture, TextureId(4));
        assert_eq!(input.extent(), Extent2d::new(32, 16));
        assert_eq!(input.descriptor.format, PixelFormat::Bgra8Unorm);
    }
}
