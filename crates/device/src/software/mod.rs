//! CPU rasterizer backend.
//!
//! Submissions are queued and only executed by `poll()`, the way a GPU
//! retires work after the CPU has moved on. Tests use this to observe
//! resources that are still referenced by in-flight command buffers.
//!
//! Storage writes are supported for 8-bit RGBA/BGRA outputs; other formats
//! can be allocated for sampling but are not decoded.

mod kernels;

pub use kernels::{Invocation, KernelFn, TexelView};

use std::collections::{HashMap, HashSet, VecDeque};

use dyntex_common::{Extent2d, PixelFormat, TextureDescriptor, TextureUsages};

use crate::command::{
    Command, CommandBuffer, CommandEncoder, DispatchCommand, KernelId, SubmissionIndex, TextureId,
};
use crate::device::GpuDevice;
use crate::error::DeviceError;
use crate::kernel::{BUILTIN_KERNELS, CompiledKernel, KernelSignature};

/// Largest width or height a software texture may have.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

struct SoftwareTexture {
    descriptor: TextureDescriptor,
    texels: Vec<u8>,
}

struct LibraryEntry {
    signature: KernelSignature,
    run: KernelFn,
}

struct CompiledEntry {
    name: String,
    run: KernelFn,
}

/// Software GPU used by tests and headless runs.
pub struct SoftwareDevice {
    textures: HashMap<TextureId, SoftwareTexture>,
    library: HashMap<String, LibraryEntry>,
    compiled: Vec<CompiledEntry>,
    broken_kernels: HashSet<String>,
    compile_attempts: HashMap<String, u32>,
    pending: VecDeque<(SubmissionIndex, CommandBuffer)>,
    last_submitted: Option<CommandBuffer>,
    next_texture: u64,
    next_submission: u64,
    completed: Option<SubmissionIndex>,
    memory_budget: Option<usize>,
    max_dimension: u32,
    fail_encoders: bool,
    destroyed: u64,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// A device whose kernel library holds every built-in kernel.
    pub fn new() -> Self {
        let mut device = Self {
            textures: HashMap::new(),
            library: HashMap::new(),
            compiled: Vec::new(),
            broken_kernels: HashSet::new(),
            compile_attempts: HashMap::new(),
            pending: VecDeque::new(),
            last_submitted: None,
            next_texture: 1,
            next_submission: 1,
            completed: None,
            memory_budget: None,
            max_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            fail_encoders: false,
            destroyed: 0,
        };
        for info in BUILTIN_KERNELS {
            if let Some(run) = kernels::builtin(info.name) {
                device.register_kernel(info.name, info.signature, run);
            }
        }
        device
    }

    /// Add or replace a kernel in the library.
    pub fn register_kernel(&mut self, name: &str, signature: KernelSignature, run: KernelFn) {
        self.library
            .insert(name.to_string(), LibraryEntry { signature, run });
    }

    /// Make every compilation of `name` fail.
    pub fn break_kernel(&mut self, name: &str) {
        self.broken_kernels.insert(name.to_string());
    }

    /// Cap total texture memory; allocations beyond it fail.
    pub fn set_memory_budget(&mut self, bytes: Option<usize>) {
        self.memory_budget = bytes;
    }

    pub fn set_max_texture_dimension(&mut self, max: u32) {
        self.max_dimension = max;
    }

    /// Simulate device contention: encoder creation fails while set.
    pub fn set_encoder_failure(&mut self, fail: bool) {
        self.fail_encoders = fail;
    }

    pub fn compile_attempts(&self, name: &str) -> u32 {
        self.compile_attempts.get(name).copied().unwrap_or(0)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn destroyed_textures(&self) -> u64 {
        self.destroyed
    }

    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    /// The most recently submitted command buffer, retired or not.
    pub fn last_submission(&self) -> Option<&CommandBuffer> {
        self.last_submitted.as_ref()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.textures.values().map(|t| t.texels.len()).sum()
    }

    pub fn descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.textures.get(&texture).map(|t| t.descriptor)
    }

    pub fn texels(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.texels.as_slice())
    }

    /// Execute only the oldest queued submission.
    pub fn retire_next(&mut self) -> Option<SubmissionIndex> {
        let (index, buffer) = self.pending.pop_front()?;
        self.execute(&buffer);
        self.completed = Some(index);
        Some(index)
    }

    fn execute(&mut self, buffer: &CommandBuffer) {
        let _span = tracing::trace_span!("software_execute", label = %buffer.label).entered();
        for command in &buffer.commands {
            match command {
                Command::Dispatch(dispatch) => self.run_dispatch(dispatch),
                Command::Copy { src, dst, extent } => self.run_copy(*src, *dst, *extent),
            }
        }
    }

    fn run_dispatch(&mut self, dispatch: &DispatchCommand) {
        let Some(entry) = self.compiled.get(dispatch.kernel.0 as usize) else {
            tracing::warn!(kernel = ?dispatch.kernel, "dispatch of unknown kernel skipped");
            return;
        };
        let run = entry.run;
        let Some(out_id) = dispatch.output() else {
            tracing::warn!(kernel = %entry.name, "dispatch without output binding skipped");
            return;
        };
        let input = dispatch
            .input()
            .and_then(|id| self.textures.get(&id))
            .map(|t| (t.descriptor, t.texels.clone()));
        let Some(output) = self.textures.get_mut(&out_id) else {
            tracing::warn!(texture = ?out_id, "dispatch into missing texture skipped");
            return;
        };
        let extent = output.descriptor.extent;
        let format = output.descriptor.format;
        let view = input.as_ref().map(|(desc, bytes)| TexelView {
            extent: desc.extent,
            format: desc.format,
            bytes,
        });
        let time = dispatch.time.unwrap_or(0.0);
        let local = dispatch.local_size;
        for gy in 0..dispatch.workgroups.y {
            for gx in 0..dispatch.workgroups.x {
                for ly in 0..local {
                    for lx in 0..local {
                        let x = gx * local + lx;
                        let y = gy * local + ly;
                        // Kernels guard against the padded edge of the grid.
                        if x >= extent.width || y >= extent.height {
                            continue;
                        }
                        let rgba = run(&Invocation {
                            x,
                            y,
                            extent,
                            time,
                            input: view,
                        });
                        kernels::store(&mut output.texels, extent, format, x, y, rgba);
                    }
                }
            }
        }
    }

    fn run_copy(&mut self, src: TextureId, dst: TextureId, extent: Extent2d) {
        let Some((src_desc, src_texels)) = self
            .textures
            .get(&src)
            .map(|t| (t.descriptor, t.texels.clone()))
        else {
            tracing::warn!(texture = ?src, "copy from missing texture skipped");
            return;
        };
        let Some(target) = self.textures.get_mut(&dst) else {
            tracing::warn!(texture = ?dst, "copy into missing texture skipped");
            return;
        };
        let bpp = src_desc.format.bytes_per_texel() as usize;
        if bpp != target.descriptor.format.bytes_per_texel() as usize {
            tracing::warn!(src = %src_desc.format, dst = %target.descriptor.format, "copy between incompatible formats skipped");
            return;
        }
        let width = extent
            .width
            .min(src_desc.extent.width)
            .min(target.descriptor.extent.width) as usize;
        let height = extent
            .height
            .min(src_desc.extent.height)
            .min(target.descriptor.extent.height) as usize;
        let src_stride = src_desc.extent.width as usize * bpp;
        let dst_stride = target.descriptor.extent.width as usize * bpp;
        for row in 0..height {
            let from = row * src_stride;
            let to = row * dst_stride;
            target.texels[to..to + width * bpp]
                .copy_from_slice(&src_texels[from..from + width * bpp]);
        }
    }
}

impl GpuDevice for SoftwareDevice {
    fn backend(&self) -> &'static str {
        "software"
    }

    fn supports_format(&self, format: PixelFormat, usage: TextureUsages) -> bool {
        if usage.contains(TextureUsages::COMPUTE_WRITE) {
            matches!(format, PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm)
        } else {
            true
        }
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        label: &str,
    ) -> Result<TextureId, DeviceError> {
        descriptor.validate()?;
        if !self.supports_format(descriptor.format, descriptor.usage) {
            return Err(DeviceError::UnsupportedFormat(descriptor.format));
        }
        let too_large = DeviceError::ExtentTooLarge {
            extent: descriptor.extent,
            max: self.max_dimension,
        };
        if descriptor.width() > self.max_dimension || descriptor.height() > self.max_dimension {
            return Err(too_large);
        }
        let requested = descriptor.byte_size().ok_or(too_large)?;
        if let Some(budget) = self.memory_budget {
            if self.allocated_bytes().saturating_add(requested) > budget {
                return Err(DeviceError::OutOfMemory { requested });
            }
        }
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            SoftwareTexture {
                descriptor: *descriptor,
                texels: vec![0; requested],
            },
        );
        tracing::trace!(texture = ?id, label, extent = %descriptor.extent, "software texture created");
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, texels: &[u8]) -> Result<(), DeviceError> {
        let target = self
            .textures
            .get_mut(&texture)
            .ok_or(DeviceError::UnknownTexture(texture))?;
        if texels.len() != target.texels.len() {
            return Err(DeviceError::UploadSizeMismatch {
                expected: target.texels.len(),
                actual: texels.len(),
            });
        }
        target.texels.copy_from_slice(texels);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.destroyed += 1;
        }
    }

    fn compile_kernel(&mut self, name: &str) -> Result<CompiledKernel, DeviceError> {
        *self.compile_attempts.entry(name.to_string()).or_default() += 1;
        let entry = self
            .library
            .get(name)
            .ok_or_else(|| DeviceError::KernelNotFound(name.to_string()))?;
        if self.broken_kernels.contains(name) {
            return Err(DeviceError::KernelCompilation {
                name: name.to_string(),
                reason: "simulated compiler failure".into(),
            });
        }
        let signature = entry.signature;
        let id = KernelId(self.compiled.len() as u32);
        self.compiled.push(CompiledEntry {
            name: name.to_string(),
            run: entry.run,
        });
        Ok(CompiledKernel { id, signature })
    }

    fn create_encoder(&mut self, label: &str) -> Result<CommandEncoder, DeviceError> {
        if self.fail_encoders {
            return Err(DeviceError::EncoderUnavailable(label.to_string()));
        }
        Ok(CommandEncoder::new(label))
    }

    fn submit(&mut self, commands: CommandBuffer) -> Result<SubmissionIndex, DeviceError> {
        let index = SubmissionIndex(self.next_submission);
        self.next_submission += 1;
        self.last_submitted = Some(commands.clone());
        self.pending.push_back((index, commands));
        Ok(index)
    }

    fn poll(&mut self) -> Option<SubmissionIndex> {
        while self.retire_next().is_some() {}
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{TextureBinding, WorkgroupCount};

    fn rgba(width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor::dynamic(width, height, PixelFormat::Rgba8Unorm)
    }

    #[test]
    fn allocation_respects_budget() {
        let mut device = SoftwareDevice::new();
        device.set_memory_budget(Some(64 * 64 * 4));
        assert!(device.create_texture(&rgba(64, 64), "a").is_ok());
        assert_eq!(
            device.create_texture(&rgba(1, 1), "b"),
            Err(DeviceError::OutOfMemory { requested: 4 })
        );
    }

    #[test]
    fn oversized_extent_is_refused() {
        let mut device = SoftwareDevice::new();
        let huge = rgba(u32::MAX, u32::MAX);
        assert_eq!(
            device.create_texture(&huge, "huge"),
            Err(DeviceError::ExtentTooLarge {
                extent: huge.extent,
                max: DEFAULT_MAX_TEXTURE_DIMENSION,
            })
        );
        device.set_max_texture_dimension(16);
        assert!(matches!(
            device.create_texture(&rgba(17, 1), "wide"),
            Err(DeviceError::ExtentTooLarge { max: 16, .. })
        ));
        assert!(device.create_texture(&rgba(16, 16), "fits").is_ok());
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn storage_needs_8bit_rgba() {
        let mut device = SoftwareDevice::new();
        let desc = TextureDescriptor::dynamic(4, 4, PixelFormat::R32Float);
        assert_eq!(
            device.create_texture(&desc, "r32"),
            Err(DeviceError::UnsupportedFormat(PixelFormat::R32Float))
        );
        let sampled = TextureDescriptor {
            usage: TextureUsages::SHADER_READ,
            ..desc
        };
        assert!(device.create_texture(&sampled, "r32-read").is_ok());
    }

    #[test]
    fn submissions_retire_on_poll() {
        let mut device = SoftwareDevice::new();
        let kernel = device.compile_kernel("color_circles").unwrap();
        let out = device.create_texture(&rgba(20, 20), "out").unwrap();
        let mut enc = device.create_encoder("frame").unwrap();
        enc.dispatch(DispatchCommand {
            kernel: kernel.id,
            bindings: vec![TextureBinding::Output { slot: 0, texture: out }],
            time: Some(0.5),
            workgroups: WorkgroupCount { x: 2, y: 2 },
            local_size: 16,
        });
        let index = device.submit(enc.finish()).unwrap();

        assert_eq!(device.pending_submissions(), 1);
        assert_eq!(device.last_submission().map(|b| b.label.as_str()), Some("frame"));
        assert!(device.texels(out).unwrap().iter().all(|b| *b == 0));

        assert_eq!(device.poll(), Some(index));
        assert_eq!(device.pending_submissions(), 0);
        // Every texel, including the last one, has opaque alpha.
        let texels = device.texels(out).unwrap();
        assert!(texels.chunks(4).all(|t| t[3] == 255));
    }

    #[test]
    fn undersized_grid_leaves_edge_untouched() {
        let mut device = SoftwareDevice::new();
        let kernel = device.compile_kernel("color_circles").unwrap();
        let out = device.create_texture(&rgba(20, 20), "out").unwrap();
        let mut enc = device.create_encoder("frame").unwrap();
        enc.dispatch(DispatchCommand {
            kernel: kernel.id,
            bindings: vec![TextureBinding::Output { slot: 0, texture: out }],
            time: Some(0.0),
            workgroups: WorkgroupCount { x: 1, y: 1 },
            local_size: 16,
        });
        device.submit(enc.finish()).unwrap();
        device.poll();
        let texels = device.texels(out).unwrap();
        let last = (20 * 20 - 1) * 4;
        assert_eq!(texels[last + 3], 0);
        assert_eq!(texels[3], 255);
    }

    #[test]
    fn copy_moves_overlapping_region() {
        let mut device = SoftwareDevice::new();
        let src = device.create_texture(&rgba(2, 2), "src").unwrap();
        let dst = device.create_texture(&rgba(3, 3), "dst").unwrap();
        device.write_texture(src, &[7u8; 16]).unwrap();
        let mut enc = device.create_encoder("blit").unwrap();
        enc.copy(src, dst, Extent2d::new(3, 3));
        device.submit(enc.finish()).unwrap();
        device.poll();
        let texels = device.texels(dst).unwrap();
        assert_eq!(&texels[0..8], &[7u8; 8]);
        assert_eq!(&texels[8..12], &[0u8; 4]);
    }

    #[test]
    fn broken_and_missing_kernels() {
        let mut device = SoftwareDevice::new();
        device.break_kernel("invert");
        assert!(matches!(
            device.compile_kernel("invert"),
            Err(DeviceError::KernelCompilation { .. })
        ));
        assert_eq!(
            device.compile_kernel("nope"),
            Err(DeviceError::KernelNotFound("nope".into()))
        );
        assert_eq!(device.compile_attempts("invert"), 1);
    }

    #[test]
    fn encoder_failure_is_reported() {
        let mut device = SoftwareDevice::new();
        device.set_encoder_failure(true);
        assert!(matches!(
            device.create_encoder("x"),
            Err(DeviceError::EncoderUnavailable(_))
        ));
    }

    #[test]
    fn destroy_counts_once() {
        let mut device = SoftwareDevice::new();
        let id = device.create_texture(&rgba(1, 1), "t").unwrap();
        device.destroy_texture(id);
        device.destroy_texture(id);
        assert_eq!(device.destroyed_textures(), 1);
        assert_eq!(device.live_textures(), 0);
    }
}
