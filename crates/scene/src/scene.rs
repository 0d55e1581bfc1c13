use std::time::{Duration, Instant};

use dyntex_common::{Extent2d, PixelFormat, TextureDescriptor, TextureUsages, Transform, UnitId};
use dyntex_core::{DynamicTextureUnit, InputTexture, TextureContext, TextureError, UnitConfig};
use dyntex_device::GpuDevice;
use dyntex_scheduler::{FeedConfig, FrameScheduler, InputFeed, TickSource, oscillating_extent};
use glam::{Quat, Vec3};

use crate::binder::{SurfaceBinder, SyncReport, sync_materials};
use crate::config::{DEFAULT_DYNAMIC_SIZE, InputSource, MaterialConfig, SceneConfig};
use crate::error::SceneError;
use crate::quad::{Quad, QuadMaterial, QuadStore, Spin, circle_layout};

/// Deterministic RGBA8 test image: color gradients under a checkerboard.
pub fn base_image_texels(extent: Extent2d) -> Vec<u8> {
    let mut texels = Vec::with_capacity(extent.texel_count() * 4);
    for y in 0..extent.height {
        for x in 0..extent.width {
            let r = (x * 255 / extent.width.max(1)) as u8;
            let g = (y * 255 / extent.height.max(1)) as u8;
            let checker = ((x / 32) + (y / 32)) % 2 == 0;
            let b = if checker { 224 } else { 64 };
            texels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    texels
}

/// A quad whose unit could not be constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct OmittedQuad {
    pub label: String,
    pub error: TextureError,
}

/// An assembled scene: quads, their units in a scheduler, and the inputs
/// the units read.
pub struct Scene {
    pub quads: QuadStore,
    pub base: InputTexture,
    pub feed_source: Option<UnitId>,
    pub omitted: Vec<OmittedQuad>,
}

impl Scene {
    /// Upload the base image, construct every unit, and lay the quads out.
    /// A quad whose unit fails to construct is logged and left out.
    pub fn build<D: GpuDevice>(
        config: &SceneConfig,
        ctx: &mut TextureContext<D>,
        scheduler: &mut FrameScheduler,
        now: Instant,
    ) -> Result<Self, SceneError> {
        let _span = tracing::info_span!("scene_build", quads = config.quads.len()).entered();
        config.validate()?;

        let base_extent = Extent2d::new(config.base_image.width, config.base_image.height);
        let base_desc = TextureDescriptor {
            extent: base_extent,
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsages::SHADER_READ | TextureUsages::COPY_SRC,
        };
        let base = ctx.upload_input(&base_desc, &base_image_texels(base_extent), "base-image")?;

        let mut feed = None;
        let uses_feed = config.quads.iter().any(|q| {
            matches!(
                q.material,
                MaterialConfig::Dynamic {
                    input: InputSource::Feed,
                    ..
                }
            )
        });
        if let (true, Some(section)) = (uses_feed, &config.feed) {
            let start = oscillating_extent(base_extent, 0.0);
            let unit_config = UnitConfig::new("feed", section.kernel.clone(), start.width, start.height)
                .with_input(base);
            match DynamicTextureUnit::construct(ctx, unit_config, now) {
                Ok(unit) => {
                    let period = Duration::from_millis(section.period_ms);
                    let id = scheduler.spawn(unit, TickSource::FixedPeriod(period));
                    feed = Some(InputFeed::new(
                        id,
                        FeedConfig {
                            period,
                            base: base_extent,
                        },
                    ));
                }
                Err(err) => {
                    tracing::warn!(kernel = %section.kernel, error = %err, "feed unavailable, feed quads read the base image");
                }
            }
        }
        let feed_source = feed.as_ref().map(|f| f.source());

        let layout = config.layout;
        let positions = circle_layout(config.quads.len(), layout.radius);
        let spin = Spin::new(Vec3::from_array(layout.spin_axis), layout.spin_speed);
        let mut quads = QuadStore::new();
        quads.root.rotation = Quat::from_axis_angle(Vec3::X, layout.tilt);
        quads.root_spin = Some(Spin::new(Vec3::Z, layout.root_spin_speed));
        let mut omitted = Vec::new();

        for (quad_config, position) in config.quads.iter().zip(positions) {
            let material = match &quad_config.material {
                MaterialConfig::Color { rgba } => QuadMaterial::Color(*rgba),
                MaterialConfig::Image => QuadMaterial::Image(base),
                MaterialConfig::Dynamic {
                    kernel,
                    width,
                    height,
                    format,
                    input,
                    tick_period_ms,
                } => {
                    let input_texture = match input {
                        InputSource::None => None,
                        InputSource::Base | InputSource::Feed => Some(base),
                    };
                    let fallback = input_texture
                        .map(|i| i.extent())
                        .unwrap_or(Extent2d::new(DEFAULT_DYNAMIC_SIZE, DEFAULT_DYNAMIC_SIZE));
                    let mut unit_config = UnitConfig::new(
                        quad_config.label.clone(),
                        kernel.clone(),
                        width.unwrap_or(fallback.width),
                        height.unwrap_or(fallback.height),
                    )
                    .with_format(*format);
                    unit_config.input = input_texture;

                    let unit = match DynamicTextureUnit::construct(ctx, unit_config, now) {
                        Ok(unit) => unit,
                        Err(error) => {
                            tracing::warn!(quad = %quad_config.label, %error, "quad omitted");
                            omitted.push(OmittedQuad {
                                label: quad_config.label.clone(),
                                error,
                            });
                            continue;
                        }
                    };
                    let source = match tick_period_ms {
                        Some(ms) => TickSource::FixedPeriod(Duration::from_millis(*ms)),
                        None => TickSource::RenderLoop,
                    };
                    let id = scheduler.spawn(unit, source);
                    if let (InputSource::Feed, Some(feed)) = (input, feed.as_mut()) {
                        feed.add_consumer(id);
                    }
                    QuadMaterial::Dynamic(id)
                }
            };
            let position = quad_config.position.map(Vec3::from_array).unwrap_or(position);
            quads.insert(Quad {
                label: quad_config.label.clone(),
                transform: Transform::at(position, layout.quad_scale),
                material,
                spin: Some(spin),
            });
        }

        if let Some(feed) = feed {
            scheduler.add_feed(feed)?;
        }
        tracing::info!(
            quads = quads.len(),
            omitted = omitted.len(),
            units = scheduler.len(),
            "scene assembled"
        );
        Ok(Self {
            quads,
            base,
            feed_source,
            omitted,
        })
    }

    /// Push every dynamic quad's current material to `binder`.
    pub fn sync<D: GpuDevice, B: SurfaceBinder + ?Sized>(
        &self,
        ctx: &TextureContext<D>,
        scheduler: &FrameScheduler,
        binder: &mut B,
    ) -> SyncReport {
        sync_materials(&self.quads, |unit| scheduler.material(ctx, unit), binder)
    }

    /// Despawn every unit and free the base image.
    pub fn teardown<D: GpuDevice>(self, ctx: &mut TextureContext<D>, scheduler: &mut FrameScheduler) {
        let ids: Vec<UnitId> = scheduler.ids().collect();
        for id in ids {
            scheduler.despawn(ctx, id);
        }
        // The base image outlives the last submission that reads it.
        ctx.destroy_input(self.base);
        ctx.collect_retired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::BindingTable;
    use crate::config::{BaseImageConfig, FeedSection, LayoutConfig, QuadConfig};
    use dyntex_device::SoftwareDevice;

    fn small_demo() -> SceneConfig {
        SceneConfig {
            base_image: BaseImageConfig {
                width: 64,
                height: 64,
            },
            ..SceneConfig::demo()
        }
    }

    #[test]
    fn base_image_is_deterministic() {
        let extent = Extent2d::new(40, 20);
        let a = base_image_texels(extent);
        assert_eq!(a.len(), 40 * 20 * 4);
        assert_eq!(a, base_image_texels(extent));
        assert!(a.chunks(4).all(|t| t[3] == 255));
    }

    #[test]
    fn demo_scene_assembles() {
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let mut scheduler = FrameScheduler::default();
        let scene = Scene::build(&small_demo(), &mut ctx, &mut scheduler, Instant::now()).unwrap();

        assert_eq!(scene.quads.len(), 6);
        assert!(scene.omitted.is_empty());
        // Four dynamic quads plus the feed source.
        assert_eq!(scheduler.len(), 5);
        assert_eq!(scheduler.feeds().len(), 1);
        assert_eq!(scheduler.feeds()[0].consumers().len(), 2);
        assert!(scene.feed_source.is_some());
    }

    #[test]
    fn bad_kernel_omits_only_that_quad() {
        let mut config = small_demo();
        config.quads.push(QuadConfig {
            label: "Broken".into(),
            position: Some([0.0, 0.0, 1.0]),
            material: MaterialConfig::Dynamic {
                kernel: "no_such_kernel".into(),
                width: Some(16),
                height: Some(16),
                format: PixelFormat::Rgba8Unorm,
                input: InputSource::None,
                tick_period_ms: None,
            },
        });
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let mut scheduler = FrameScheduler::default();
        let scene = Scene::build(&config, &mut ctx, &mut scheduler, Instant::now()).unwrap();
        assert_eq!(scene.quads.len(), 6);
        assert_eq!(scene.omitted.len(), 1);
        assert_eq!(scene.omitted[0].label, "Broken");
        assert!(matches!(
            scene.omitted[0].error,
            TextureError::PipelineUnavailable { .. }
        ));
    }

    #[test]
    fn ticking_and_sync_follow_the_feed() {
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let mut scheduler = FrameScheduler::default();
        let start = Instant::now();
        let scene = Scene::build(&small_demo(), &mut ctx, &mut scheduler, start).unwrap();
        let mut table = BindingTable::new();

        let report = scene.sync(&ctx, &scheduler, &mut table);
        assert_eq!(report.bound, 4);

        let mut now = start;
        for _ in 0..13 {
            now += Duration::from_millis(16);
            let stats = scheduler.tick(&mut ctx, Duration::from_millis(16), now);
            assert_eq!(stats.failed, 0);
            scene.sync(&ctx, &scheduler, &mut table);
        }
        // One feed step happened at 208ms; both feed consumers were rebound.
        assert!(table.rebinds() >= 2);

        scene.teardown(&mut ctx, &mut scheduler);
        ctx.collect_retired();
        assert_eq!(ctx.device().live_textures(), 0);
    }

    #[test]
    fn feed_quads_fall_back_to_base_without_feed_kernel() {
        let config = SceneConfig {
            feed: Some(FeedSection {
                kernel: "missing".into(),
                period_ms: 200,
            }),
            layout: LayoutConfig::default(),
            ..small_demo()
        };
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let mut scheduler = FrameScheduler::default();
        let scene = Scene::build(&config, &mut ctx, &mut scheduler, Instant::now()).unwrap();
        assert!(scene.feed_source.is_none());
        assert!(scheduler.feeds().is_empty());
        assert_eq!(scheduler.len(), 4);
    }
}
