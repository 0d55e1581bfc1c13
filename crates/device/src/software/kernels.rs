//! CPU versions of the built-in kernels. Each mirrors the WGSL kernel of the
//! same name in `dyntex-device-wgpu`, evaluated per texel.

use dyntex_common::{Extent2d, PixelFormat};

/// Read-only view of a texture's texels.
#[derive(Debug, Clone, Copy)]
pub struct TexelView<'a> {
    pub extent: Extent2d,
    pub format: PixelFormat,
    pub bytes: &'a [u8],
}

impl TexelView<'_> {
    /// Load the texel at integer coordinates as RGBA8. Out-of-range reads
    /// return transparent black.
    pub fn load(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.extent.width || y >= self.extent.height {
            return [0, 0, 0, 0];
        }
        let bpp = self.format.bytes_per_texel() as usize;
        let offset = (y as usize * self.extent.width as usize + x as usize) * bpp;
        let Some(t) = self.bytes.get(offset..offset + bpp) else {
            return [0, 0, 0, 0];
        };
        match self.format {
            PixelFormat::Rgba8Unorm => [t[0], t[1], t[2], t[3]],
            PixelFormat::Bgra8Unorm => [t[2], t[1], t[0], t[3]],
            // Non-8-bit formats are not decoded by the software rasterizer.
            _ => [0, 0, 0, 255],
        }
    }

    /// Nearest-neighbour load at normalized coordinates.
    pub fn load_uv(&self, u: f32, v: f32) -> [u8; 4] {
        let x = (u.clamp(0.0, 1.0) * self.extent.width as f32) as u32;
        let y = (v.clamp(0.0, 1.0) * self.extent.height as f32) as u32;
        self.load(
            x.min(self.extent.width.saturating_sub(1)),
            y.min(self.extent.height.saturating_sub(1)),
        )
    }
}

/// One kernel invocation: a single texel of the output grid.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub x: u32,
    pub y: u32,
    pub extent: Extent2d,
    pub time: f32,
    pub input: Option<TexelView<'a>>,
}

impl Invocation<'_> {
    /// Texel center in normalized [0, 1] coordinates.
    pub fn uv(&self) -> (f32, f32) {
        (
            (self.x as f32 + 0.5) / self.extent.width as f32,
            (self.y as f32 + 0.5) / self.extent.height as f32,
        )
    }

    fn input_texel(&self) -> [u8; 4] {
        let (u, v) = self.uv();
        self.input.map(|i| i.load_uv(u, v)).unwrap_or([0, 0, 0, 0])
    }
}

pub type KernelFn = fn(&Invocation<'_>) -> [u8; 4];

fn unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn color_circles(inv: &Invocation<'_>) -> [u8; 4] {
    let (u, v) = inv.uv();
    let d = ((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt();
    let ring = (d * 20.0 - inv.time * 3.0).sin() * 0.5 + 0.5;
    let shade = (inv.time + d * 6.0).sin() * 0.5 + 0.5;
    [unorm(ring), unorm(shade), unorm(1.0 - ring), 255]
}

pub fn wavy_transparency(inv: &Invocation<'_>) -> [u8; 4] {
    let (u, v) = inv.uv();
    let [r, g, b, a] = inv.input_texel();
    let wave = (u * 10.0 + v * 4.0 + inv.time * 2.0).sin() * 0.5 + 0.5;
    [r, g, b, unorm(a as f32 / 255.0 * wave)]
}

pub fn simulate_masking(inv: &Invocation<'_>) -> [u8; 4] {
    let (u, v) = inv.uv();
    let cx = 0.5 + 0.3 * inv.time.cos();
    let cy = 0.5 + 0.3 * inv.time.sin();
    let inside = ((u - cx).powi(2) + (v - cy).powi(2)).sqrt() < 0.35;
    let [r, g, b, a] = inv.input_texel();
    if inside { [r, g, b, a] } else { [r / 4, g / 4, b / 4, a] }
}

pub fn invert(inv: &Invocation<'_>) -> [u8; 4] {
    let [r, g, b, a] = inv.input_texel();
    [255 - r, 255 - g, 255 - b, a]
}

/// CPU implementation of a built-in kernel.
pub fn builtin(name: &str) -> Option<KernelFn> {
    let run: KernelFn = match name {
        "color_circles" => color_circles,
        "wavy_transparency" => wavy_transparency,
        "simulate_masking" => simulate_masking,
        "invert" => invert,
        _ => return None,
    };
    Some(run)
}

/// Store an RGBA8 value into a texel buffer of the given format.
pub(crate) fn store(bytes: &mut [u8], extent: Extent2d, format: PixelFormat, x: u32, y: u32, rgba: [u8; 4]) {
    let bpp = format.bytes_per_texel() as usize;
    let offset = (y as usize * extent.width as usize + x as usize) * bpp;
    let Some(t) = bytes.get_mut(offset..offset + bpp) else {
        return;
    };
    match format {
        PixelFormat::Rgba8Unorm => t.copy_from_slice(&rgba),
        PixelFormat::Bgra8Unorm => t.copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]),
        _ => {}
    }
}
