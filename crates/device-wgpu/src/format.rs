use dyntex_common::{PixelFormat, TextureUsages};

pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::R32Float => wgpu::TextureFormat::R32Float,
        PixelFormat::R16Float => wgpu::TextureFormat::R16Float,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
    }
}

/// wgpu usages for a texture. `COPY_DST` is always added so any texture
/// can receive `write_texture` uploads.
pub fn texture_usages(usage: TextureUsages) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::COPY_DST;
    if usage.contains(TextureUsages::COMPUTE_WRITE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsages::SHADER_READ) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsages::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    out
}

pub(crate) fn extent3d(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_agree() {
        for format in [
            PixelFormat::Rgba8Unorm,
            PixelFormat::Bgra8Unorm,
            PixelFormat::R32Float,
            PixelFormat::R16Float,
            PixelFormat::Rgba16Float,
            PixelFormat::Rg8Unorm,
        ] {
            assert_eq!(
                texture_format(format).block_copy_size(None),
                Some(format.bytes_per_texel()),
                "{format}"
            );
        }
    }

    #[test]
    fn dynamic_output_maps_to_storage_and_sampling() {
        let usages = texture_usages(TextureUsages::DYNAMIC_OUTPUT);
        assert!(usages.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(usages.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(usages.contains(wgpu::TextureUsages::COPY_SRC));
    }

    #[test]
    fn inputs_are_never_storage() {
        let usages = texture_usages(TextureUsages::SHADER_READ);
        assert!(!usages.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(usages.contains(wgpu::TextureUsages::COPY_DST));
    }
}
