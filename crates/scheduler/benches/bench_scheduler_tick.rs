use std::hint::black_box;
use std::time::{Duration, Instant};

use dyntex_common::{Extent2d, PixelFormat, TextureDescriptor, TextureUsages};
use dyntex_core::{DynamicTextureUnit, TextureContext, UnitConfig};
use dyntex_device::SoftwareDevice;
use dyntex_scheduler::{FeedConfig, FrameScheduler, InputFeed, TickSource, oscillating_extent};

const FRAME: Duration = Duration::from_millis(16);

fn scene(unit_count: usize, size: u32) -> (TextureContext<SoftwareDevice>, FrameScheduler) {
    let mut ctx = TextureContext::new(SoftwareDevice::new());
    let mut scheduler = FrameScheduler::default();
    let now = Instant::now();
    for i in 0..unit_count {
        let config = UnitConfig::new(format!("circles-{i}"), "color_circles", size, size);
        match DynamicTextureUnit::construct(&mut ctx, config, now) {
            Ok(unit) => {
                scheduler.spawn(unit, TickSource::RenderLoop);
            }
            Err(err) => eprintln!("skipping unit {i}: {err}"),
        }
    }
    (ctx, scheduler)
}

fn bench_render_loop(unit_count: usize, size: u32, iterations: usize) {
    let (mut ctx, mut scheduler) = scene(unit_count, size);
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(scheduler.tick(&mut ctx, FRAME, Instant::now()));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  render loop ({unit_count} units, {size}x{size}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_feed(consumers: usize, iterations: usize) {
    let mut ctx = TextureContext::new(SoftwareDevice::new());
    let mut scheduler = FrameScheduler::default();
    let now = Instant::now();
    let base_desc = TextureDescriptor {
        extent: Extent2d::new(256, 256),
        format: PixelFormat::Rgba8Unorm,
        usage: TextureUsages::SHADER_READ,
    };
    let Ok(base) = ctx.upload_input(&base_desc, &vec![200; 256 * 256 * 4], "base") else {
        eprintln!("base upload failed");
        return;
    };
    let source = UnitConfig::new("feed", "simulate_masking", 64, 64).with_input(base);
    let Ok(source) = DynamicTextureUnit::construct(&mut ctx, source, now) else {
        eprintln!("feed source failed");
        return;
    };
    let period = Duration::from_millis(200);
    let source_id = scheduler.spawn(source, TickSource::FixedPeriod(period));
    let mut feed = InputFeed::new(
        source_id,
        FeedConfig {
            period,
            base: base_desc.extent,
        },
    );
    for i in 0..consumers {
        let config = UnitConfig::new(format!("copy-{i}"), "blit", 64, 64).with_input(base);
        if let Ok(unit) = DynamicTextureUnit::construct(&mut ctx, config, now) {
            feed = feed.with_consumer(scheduler.spawn(unit, TickSource::RenderLoop));
        }
    }
    if let Err(err) = scheduler.add_feed(feed) {
        eprintln!("feed rejected: {err}");
        return;
    }

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(scheduler.tick(&mut ctx, period, Instant::now()));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  feed step ({consumers} consumers, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_oscillation(iterations: usize) {
    let base = Extent2d::new(1920, 1080);
    let start = Instant::now();
    for i in 0..iterations {
        let _ = black_box(oscillating_extent(black_box(base), i as f32 * 0.2));
    }
    let elapsed = start.elapsed();
    println!("  oscillating extent ({iterations} iters): total {elapsed:?}");
}

fn main() {
    println!("=== Scheduler Tick Benchmarks ===\n");

    println!("Render loop (software backend):");
    bench_render_loop(1, 128, 200);
    bench_render_loop(8, 128, 50);
    bench_render_loop(32, 64, 50);

    println!("\nInput feed:");
    bench_feed(2, 50);
    bench_feed(8, 20);

    println!("\nFeed extent:");
    bench_oscillation(100_000);

    println!("\n=== Done ===");
}
