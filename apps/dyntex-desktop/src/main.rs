use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use dyntex_core::{TextureContext, ValidationPolicy};
use dyntex_device::GpuDevice;
use dyntex_device_wgpu::{QuadCamera, QuadRenderer, WgpuDevice};
use dyntex_scene::{Scene, SceneConfig};
use dyntex_scheduler::{FrameScheduler, SchedulerConfig};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "dyntex-desktop", about = "Dynamic texture viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene file; the built-in demo scene when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Reject uncommon pixel formats instead of warning
    #[arg(long)]
    strict: bool,
}

/// Everything that exists once a window and device are up.
struct Viewer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: TextureContext<WgpuDevice>,
    scheduler: FrameScheduler,
    scene: Option<Scene>,
    renderer: QuadRenderer,
    camera: QuadCamera,
    last_frame: Instant,
    paused: bool,
}

impl Viewer {
    fn new(event_loop: &ActiveEventLoop, scene_config: &SceneConfig, policy: ValidationPolicy) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("Dynamic Textures")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("find adapter")?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("dyntex_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface has no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let gpu = WgpuDevice::new(&adapter, device, queue);
        let renderer = QuadRenderer::new(&gpu, surface_format, config.width, config.height);
        let mut ctx = TextureContext::new(gpu).with_policy(policy);
        let mut scheduler = FrameScheduler::new(SchedulerConfig::default());
        let now = Instant::now();
        let scene = Scene::build(scene_config, &mut ctx, &mut scheduler, now).context("assemble scene")?;

        let mut camera = QuadCamera::default();
        camera.set_viewport(config.width, config.height);
        tracing::info!(
            backend = ctx.device().backend(),
            adapter = %ctx.device().adapter_info().name,
            quads = scene.quads.len(),
            "viewer ready"
        );

        Ok(Self {
            window,
            surface,
            config,
            ctx,
            scheduler,
            scene: Some(scene),
            renderer,
            camera,
            last_frame: now,
            paused: false,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(self.ctx.device().device(), &self.config);
        self.camera.set_viewport(self.config.width, self.config.height);
        self.renderer
            .resize(self.ctx.device(), self.config.width, self.config.height);
    }

    fn frame(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame).min(std::time::Duration::from_millis(100));
        self.last_frame = now;

        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let stats = self.scheduler.tick(&mut self.ctx, dt, now);
        if stats.failed > 0 {
            tracing::debug!(failed = stats.failed, "units failed this tick");
        }
        if !self.paused {
            scene.quads.animate(dt.as_secs_f32());
        }
        scene.sync(&self.ctx, &self.scheduler, &mut self.renderer);
        self.renderer.prepare(self.ctx.device(), &scene.quads);

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.ctx.device().device(), &self.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.renderer
            .render(self.ctx.device(), &view, &scene.quads, &self.camera);
        output.present();
    }

    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.take() {
            scene.teardown(&mut self.ctx, &mut self.scheduler);
        }
        self.ctx.device_mut().wait_idle();
        let released = self.ctx.collect_retired();
        tracing::info!(
            released,
            live = self.ctx.device().live_textures(),
            ticks = self.scheduler.ticks(),
            "viewer shut down"
        );
    }
}

struct App {
    scene_config: SceneConfig,
    policy: ValidationPolicy,
    viewer: Option<Viewer>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match Viewer::new(event_loop, &self.scene_config, self.policy) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(e) => {
                tracing::error!("could not start viewer: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                viewer.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => viewer.resize(new_size),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key {
                KeyCode::Escape => {
                    viewer.shutdown();
                    event_loop.exit();
                }
                KeyCode::Space => {
                    viewer.paused = !viewer.paused;
                    tracing::info!(paused = viewer.paused, "spin toggled");
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                viewer.frame();
                viewer.window.request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let scene_config = match &cli.scene {
        Some(path) => SceneConfig::load(path).with_context(|| format!("loading scene {}", path.display()))?,
        None => SceneConfig::demo(),
    };
    let policy = if cli.strict {
        ValidationPolicy::Strict
    } else {
        ValidationPolicy::Permissive
    };

    tracing::info!("dyntex-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        scene_config,
        policy,
        viewer: None,
    };
    event_loop.run_app(&mut app)?;

    Ok(())
}
