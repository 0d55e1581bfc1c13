use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use dyntex_common::{PixelFormat, TextureDescriptor, TextureUsages};
use dyntex_device::{
    BUILTIN_KERNELS, Command, CommandBuffer, CompiledKernel, DeviceError, DispatchCommand,
    GpuDevice, KernelId, KernelSignature, SubmissionIndex, TextureId,
};
use wgpu::util::DeviceExt;

use crate::error::WgpuInitError;
use crate::format::{extent3d, texture_format, texture_usages};
use crate::shaders;

/// Elapsed-time uniform, padded to the 16-byte uniform alignment.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct TimeUniform {
    seconds: f32,
    _pad: [f32; 3],
}

struct KernelSource {
    wgsl: Cow<'static, str>,
    signature: KernelSignature,
}

struct KernelPipeline {
    name: String,
    pipeline: wgpu::ComputePipeline,
    signature: KernelSignature,
}

struct DeviceTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    descriptor: TextureDescriptor,
}

/// `GpuDevice` on a wgpu adapter.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    format_features: HashMap<PixelFormat, wgpu::TextureFormatFeatures>,
    textures: HashMap<TextureId, DeviceTexture>,
    library: HashMap<String, KernelSource>,
    pipelines: Vec<KernelPipeline>,
    next_texture: u64,
    last_submitted: u64,
    /// Newest submission the GPU reported done; written from wgpu callbacks.
    retired: Arc<AtomicU64>,
}

const FORMATS: [PixelFormat; 6] = [
    PixelFormat::Rgba8Unorm,
    PixelFormat::Bgra8Unorm,
    PixelFormat::R32Float,
    PixelFormat::R16Float,
    PixelFormat::Rgba16Float,
    PixelFormat::Rg8Unorm,
];

impl WgpuDevice {
    /// Wrap a device and queue already requested from `adapter`.
    pub fn new(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let format_features = FORMATS
            .iter()
            .map(|f| (*f, adapter.get_texture_format_features(texture_format(*f))))
            .collect();
        let library = BUILTIN_KERNELS
            .iter()
            .filter_map(|info| {
                let wgsl = shaders::kernel_source(info.name)?;
                Some((
                    info.name.to_string(),
                    KernelSource {
                        wgsl: Cow::Borrowed(wgsl),
                        signature: info.signature,
                    },
                ))
            })
            .collect();
        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "wgpu device ready"
        );
        Self {
            device,
            queue,
            adapter_info,
            format_features,
            textures: HashMap::new(),
            library,
            pipelines: Vec::new(),
            next_texture: 1,
            last_submitted: 0,
            retired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Request an adapter and device with no surface attached.
    pub fn headless() -> Result<Self, WgpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(WgpuInitError::NoAdapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("dyntex-headless"),
                ..Default::default()
            },
            None,
        ))?;
        Ok(Self::new(&adapter, device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// View of a live texture, for sampling outside the pipeline.
    pub fn texture_view(&self, texture: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|t| &t.view)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Add a WGSL kernel to the library. Its entry point must be
    /// `cs_main` with bindings laid out as `signature.layout` describes.
    pub fn register_kernel(
        &mut self,
        name: impl Into<String>,
        wgsl: impl Into<String>,
        signature: KernelSignature,
    ) {
        self.library.insert(
            name.into(),
            KernelSource {
                wgsl: Cow::Owned(wgsl.into()),
                signature,
            },
        );
    }

    /// Block until every submitted command buffer has retired.
    pub fn wait_idle(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    fn pop_error(&self) -> Option<wgpu::Error> {
        pollster::block_on(self.device.pop_error_scope())
    }

    fn encode_dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dispatch: &DispatchCommand,
    ) -> Result<(), DeviceError> {
        let kernel = self
            .pipelines
            .get(dispatch.kernel.0 as usize)
            .ok_or_else(|| DeviceError::SubmissionFailed(format!("unknown kernel {:?}", dispatch.kernel)))?;

        let time = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kernel_time"),
            contents: bytemuck::bytes_of(&TimeUniform {
                seconds: dispatch.time.unwrap_or(0.0),
                _pad: [0.0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = Vec::with_capacity(dispatch.bindings.len() + 1);
        for binding in &dispatch.bindings {
            let texture = self
                .textures
                .get(&binding.texture())
                .ok_or(DeviceError::UnknownTexture(binding.texture()))?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding.slot(),
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        if kernel.signature.time_driven {
            entries.push(wgpu::BindGroupEntry {
                binding: kernel.signature.layout.time_binding(),
                resource: time.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name.as_str()),
            layout: &kernel.pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.name.as_str()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(dispatch.workgroups.x, dispatch.workgroups.y, 1);
        Ok(())
    }

    fn encode(&self, commands: &CommandBuffer) -> Result<wgpu::CommandBuffer, DeviceError> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(commands.label.as_str()),
        });
        for command in &commands.commands {
            match command {
                Command::Dispatch(dispatch) => self.encode_dispatch(&mut encoder, dispatch)?,
                Command::Copy { src, dst, extent } => {
                    let src = self.textures.get(src).ok_or(DeviceError::UnknownTexture(*src))?;
                    let dst = self.textures.get(dst).ok_or(DeviceError::UnknownTexture(*dst))?;
                    encoder.copy_texture_to_texture(
                        src.texture.as_image_copy(),
                        dst.texture.as_image_copy(),
                        extent3d(extent.width, extent.height),
                    );
                }
            }
        }
        Ok(encoder.finish())
    }
}

impl GpuDevice for WgpuDevice {
    fn backend(&self) -> &'static str {
        "wgpu"
    }

    fn supports_format(&self, format: PixelFormat, usage: TextureUsages) -> bool {
        let Some(features) = self.format_features.get(&format) else {
            return false;
        };
        features.allowed_usages.contains(texture_usages(usage))
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

        let max = self.device.limits().max_texture_dimension_2d;
        if descriptor.width() > max || descriptor.height() > max {
            return Err(DeviceError::ExtentTooLarge {
                extent: descriptor.extent,
                max,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent3d(descriptor.width(), descriptor.height()),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(descriptor.format),
            usage: texture_usages(descriptor.usage),
            view_formats: &[],
        });
        let invalid = self.pop_error();
        let out_of_memory = self.pop_error();
        if let Some(err) = invalid {
            tracing::warn!(%label, error = %err, "texture descriptor rejected");
            texture.destroy();
            return Err(DeviceError::AllocationRejected(err.to_string()));
        }
        if let Some(err) = out_of_memory {
            tracing::warn!(%label, error = %err, "texture allocation failed");
            texture.destroy();
            return Err(DeviceError::OutOfMemory {
                requested: descriptor.byte_size().unwrap_or(usize::MAX),
            });
        }

        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::trace!(?id, %label, extent = %descriptor.extent, format = %descriptor.format, "texture created");
        self.textures.insert(
            id,
            DeviceTexture {
                texture,
                view,
                descriptor: *descriptor,
            },
        );
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, texels: &[u8]) -> Result<(), DeviceError> {
        let target = self
            .textures
            .get(&texture)
            .ok_or(DeviceError::UnknownTexture(texture))?;
        let expected = target.descriptor.byte_size().unwrap_or(usize::MAX);
        if texels.len() != expected {
            return Err(DeviceError::UploadSizeMismatch {
                expected,
                actual: texels.len(),
            });
        }
        let desc = target.descriptor;
        self.queue.write_texture(
            target.texture.as_image_copy(),
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width() * desc.format.bytes_per_texel()),
                rows_per_image: Some(desc.height()),
            },
            extent3d(desc.width(), desc.height()),
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
            tracing::trace!(?texture, "texture destroyed");
        }
    }

    fn compile_kernel(&mut self, name: &str) -> Result<CompiledKernel, DeviceError> {
        if let Some(index) = self.pipelines.iter().position(|p| p.name == name) {
            return Ok(CompiledKernel {
                id: KernelId(index as u32),
                signature: self.pipelines[index].signature,
            });
        }
        let source = self
            .library
            .get(name)
            .ok_or_else(|| DeviceError::KernelNotFound(name.to_string()))?;
        let signature = source.signature;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.clone()),
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: None,
            module: &module,
            entry_point: Some(shaders::KERNEL_ENTRY),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = self.pop_error() {
            return Err(DeviceError::KernelCompilation {
                name: name.to_string(),
                reason: err.to_string(),
            });
        }

        let id = KernelId(self.pipelines.len() as u32);
        tracing::debug!(kernel = %name, ?id, "compute pipeline compiled");
        self.pipelines.push(KernelPipeline {
            name: name.to_string(),
            pipeline,
            signature,
        });
        Ok(CompiledKernel { id, signature })
    }

    fn submit(&mut self, commands: CommandBuffer) -> Result<SubmissionIndex, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoded = self.encode(&commands);
        let scope = self.pop_error();
        let buffer = encoded?;
        if let Some(err) = scope {
            return Err(DeviceError::SubmissionFailed(err.to_string()));
        }

        self.queue.submit(std::iter::once(buffer));
        self.last_submitted += 1;
        let index = self.last_submitted;
        let retired = Arc::clone(&self.retired);
        self.queue.on_submitted_work_done(move || {
            retired.fetch_max(index, Ordering::AcqRel);
        });
        Ok(SubmissionIndex(index))
    }

    fn poll(&mut self) -> Option<SubmissionIndex> {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        match self.retired.load(Ordering::Acquire) {
            0 => None,
            index => Some(SubmissionIndex(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntex_device::{TextureBinding, WorkgroupCount};

    #[test]
    fn time_uniform_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<TimeUniform>(), 16);
    }

    /// Runs only where an adapter is available.
    #[test]
    fn color_circles_dispatch_retires() {
        let Ok(mut gpu) = WgpuDevice::headless() else {
            return;
        };
        let desc = TextureDescriptor::dynamic(100, 100, PixelFormat::Rgba8Unorm);
        let output = gpu.create_texture(&desc, "circles").unwrap();
        let kernel = gpu.compile_kernel("color_circles").unwrap();
        let mut encoder = gpu.create_encoder("circles").unwrap();
        encoder.dispatch(DispatchCommand {
            kernel: kernel.id,
            bindings: vec![TextureBinding::Output {
                slot: 0,
                texture: output,
            }],
            time: Some(0.5),
            workgroups: WorkgroupCount { x: 7, y: 7 },
            local_size: 16,
        });
        let index = gpu.submit(encoder.finish()).unwrap();
        gpu.wait_idle();
        assert!(gpu.poll() >= Some(index));

        assert!(matches!(
            gpu.compile_kernel("missing"),
            Err(DeviceError::KernelNotFound(_))
        ));
        gpu.destroy_texture(output);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn oversized_texture_is_an_error() {
        let Ok(mut gpu) = WgpuDevice::headless() else {
            return;
        };
        let max = gpu.device().limits().max_texture_dimension_2d;
        let desc = TextureDescriptor::dynamic(max + 1, 4, PixelFormat::Rgba8Unorm);
        assert_eq!(
            gpu.create_texture(&desc, "huge"),
            Err(DeviceError::ExtentTooLarge {
                extent: desc.extent,
                max,
            })
        );
        assert_eq!(gpu.live_textures(), 0);
    }
}
