use std::collections::{HashMap, HashSet};

use bytemuck::{Pod, Zeroable};
use dyntex_common::QuadId;
use dyntex_core::MaterialHandle;
use dyntex_device::TextureId;
use dyntex_scene::{QuadMaterial, QuadStore, SurfaceBinder};
use wgpu::util::DeviceExt;

use crate::camera::QuadCamera;
use crate::device::WgpuDevice;
use crate::shaders;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct InstanceData {
    model_0: [f32; 4],
    model_1: [f32; 4],
    model_2: [f32; 4],
    model_3: [f32; 4],
    tint: [f32; 4],
}

#[rustfmt::skip]
const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
    Vertex { position: [ 0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [ 0.5,  0.5, 0.0], uv: [1.0, 0.0] },
    Vertex { position: [-0.5,  0.5, 0.0], uv: [0.0, 0.0] },
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];
const WHITE: [f32; 4] = [1.0; 4];

/// Draws a `QuadStore`, binding each dynamic quad to its unit's material.
///
/// As a `SurfaceBinder` it only records which material each quad shows;
/// `prepare` turns those records into bind groups, keyed by texture id.
/// Texture ids are never reused, so a resized unit always misses the cache
/// and the stale entry is evicted.
pub struct QuadRenderer {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    max_quads: u32,
    depth_texture: wgpu::TextureView,
    surface_format: wgpu::TextureFormat,
    bound: HashMap<QuadId, MaterialHandle>,
    bind_groups: HashMap<TextureId, wgpu::BindGroup>,
}

impl QuadRenderer {
    pub fn new(gpu: &WgpuDevice, surface_format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let device = gpu.device();

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_camera"),
            contents: bytemuck::bytes_of(&CameraUniform {
                view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_camera_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_camera"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_material_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = device.create_texture_with_data(
            gpu.queue(),
            &wgpu::TextureDescriptor {
                label: Some("quad_white"),
                size: crate::format::extent3d(1, 1),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255; 4],
        );
        let white_view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let white_bind_group = Self::material_bind_group(device, &material_layout, &sampler, &white_view);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad_pipeline_layout"),
            bind_group_layouts: &[&camera_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::QUAD_SHADER.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x2,
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<InstanceData>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![
                            2 => Float32x4,
                            3 => Float32x4,
                            4 => Float32x4,
                            5 => Float32x4,
                            6 => Float32x4,
                        ],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            // Quads spin, so both faces are visible.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        let max_quads = 256u32;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_instances"),
            size: max_quads as u64 * std::mem::size_of::<InstanceData>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            material_layout,
            sampler,
            white_bind_group,
            vertex_buffer,
            index_buffer,
            instance_buffer,
            max_quads,
            depth_texture: Self::create_depth_texture(device, width, height),
            surface_format,
            bound: HashMap::new(),
            bind_groups: HashMap::new(),
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn resize(&mut self, gpu: &WgpuDevice, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(gpu.device(), width, height);
    }

    /// Number of cached material bind groups.
    pub fn cached_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    /// Create bind groups for newly bound textures and drop those no quad
    /// references any more. Call after every sync, before `render`.
    pub fn prepare(&mut self, gpu: &WgpuDevice, quads: &QuadStore) {
        let mut wanted = HashSet::new();
        for (id, quad) in quads.iter() {
            match quad.material {
                QuadMaterial::Color(_) => {}
                QuadMaterial::Image(input) => {
                    wanted.insert(input.texture);
                }
                QuadMaterial::Dynamic(_) => {
                    if let Some(handle) = self.bound.get(&id) {
                        wanted.insert(handle.texture);
                    }
                }
            }
        }

        self.bind_groups.retain(|texture, _| wanted.contains(texture));
        for texture in wanted {
            if self.bind_groups.contains_key(&texture) {
                continue;
            }
            let Some(view) = gpu.texture_view(texture) else {
                tracing::warn!(?texture, "bound texture is not live on the device");
                continue;
            };
            let group = Self::material_bind_group(gpu.device(), &self.material_layout, &self.sampler, view);
            self.bind_groups.insert(texture, group);
        }
    }

    /// Draw every quad whose material is ready into `target`.
    pub fn render(&self, gpu: &WgpuDevice, target: &wgpu::TextureView, quads: &QuadStore, camera: &QuadCamera) {
        let queue = gpu.queue();
        queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform {
                view_proj: camera.view_projection().to_cols_array_2d(),
            }),
        );

        let mut instances = Vec::new();
        let mut groups = Vec::new();
        for (id, quad) in quads.iter() {
            if instances.len() >= self.max_quads as usize {
                break;
            }
            let (group, tint) = match quad.material {
                QuadMaterial::Color(rgba) => (Some(&self.white_bind_group), rgba),
                QuadMaterial::Image(input) => (self.bind_groups.get(&input.texture), WHITE),
                QuadMaterial::Dynamic(_) => (
                    self.bound
                        .get(&id)
                        .and_then(|handle| self.bind_groups.get(&handle.texture)),
                    WHITE,
                ),
            };
            let (Some(group), Some(model)) = (group, quads.world_matrix(id)) else {
                continue;
            };
            let cols = model.to_cols_array_2d();
            instances.push(InstanceData {
                model_0: cols[0],
                model_1: cols[1],
                model_2: cols[2],
                model_3: cols[3],
                tint,
            });
            groups.push(group);
        }
        if !instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }

        let mut encoder = gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("quad_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.1,
                            g: 0.1,
                            b: 0.15,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            for (i, group) in groups.iter().enumerate() {
                let i = i as u32;
                pass.set_bind_group(1, *group, &[]);
                pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, i..i + 1);
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn material_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_material"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("quad_depth"),
            size: crate::format::extent3d(width.max(1), height.max(1)),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

impl SurfaceBinder for QuadRenderer {
    fn bind(&mut self, quad: QuadId, material: MaterialHandle) {
        if let Some(previous) = self.bound.insert(quad, material) {
            if previous.texture != material.texture {
                tracing::trace!(?quad, generation = material.generation, "quad material swapped");
            }
        }
    }

    fn unbind(&mut self, quad: QuadId) {
        self.bound.remove(&quad);
    }
}
