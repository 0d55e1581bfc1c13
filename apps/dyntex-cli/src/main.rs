use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dyntex_common::Extent2d;
use dyntex_core::{TextureContext, ValidationPolicy, dispatch_grid};
use dyntex_device::{BUILTIN_KERNELS, GpuDevice, SoftwareDevice};
use dyntex_scene::{BindingTable, Scene, SceneConfig};
use dyntex_scheduler::{FrameScheduler, SchedulerConfig, TickStats};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dyntex-cli", about = "Headless tool for the dynamic texture pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// List the built-in kernels
    Kernels,
    /// Print the work-group grid for an output extent
    Grid { width: u32, height: u32 },
    /// Run a scene on the software backend and report tick statistics
    Simulate {
        /// Scene file; the built-in demo scene when omitted
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Number of frames to tick
        #[arg(short, long, default_value = "60")]
        frames: u32,
        /// Simulated frame time in milliseconds
        #[arg(long, default_value = "16")]
        frame_ms: u64,
        /// Reject uncommon pixel formats instead of warning
        #[arg(long)]
        strict: bool,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a scene file without running it
    Validate { path: PathBuf },
    /// Write the built-in demo scene as YAML
    Demo {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Serialize)]
struct SimulationReport {
    frames: u32,
    units: usize,
    omitted: Vec<String>,
    updated: usize,
    failed: usize,
    skipped: usize,
    feed_steps: usize,
    resources_released: usize,
    rebinds: u64,
    avg_tick: Duration,
    max_tick: Duration,
    updates_per_tick: f64,
    last: TickStats,
    live_textures_after_teardown: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("dyntex-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", dyntex_common::crate_info());
            println!("device: {}", dyntex_device::crate_info());
            println!("core: {}", dyntex_core::crate_info());
            println!("scheduler: {}", dyntex_scheduler::crate_info());
            println!("scene: {}", dyntex_scene::crate_info());
        }
        Commands::Kernels => {
            for info in BUILTIN_KERNELS {
                let sig = info.signature;
                println!(
                    "{:<20} {:<13} time={:<5} output={}  {}",
                    info.name,
                    format!("{:?}", sig.layout),
                    sig.time_driven,
                    sig.output_format,
                    info.summary
                );
            }
            println!("{:<20} {:<13} {:<10} {}", dyntex_core::BLIT, "Copy", "", "data-movement copy of the input");
        }
        Commands::Grid { width, height } => {
            let grid = dispatch_grid(Extent2d::new(width, height));
            println!(
                "{width}x{height} -> {}x{} work-groups of {}x{}",
                grid.x,
                grid.y,
                dyntex_core::WORKGROUP_SIZE,
                dyntex_core::WORKGROUP_SIZE
            );
        }
        Commands::Simulate {
            scene,
            frames,
            frame_ms,
            strict,
            json,
        } => {
            let config = match scene {
                Some(path) => SceneConfig::load(&path)
                    .with_context(|| format!("loading scene {}", path.display()))?,
                None => SceneConfig::demo(),
            };
            let policy = if strict {
                ValidationPolicy::Strict
            } else {
                ValidationPolicy::Permissive
            };
            let report = simulate(&config, frames, Duration::from_millis(frame_ms), policy)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} frames, {} units ({} omitted): updated={} failed={} skipped={} feed_steps={} released={} rebinds={}",
                    report.frames,
                    report.units,
                    report.omitted.len(),
                    report.updated,
                    report.failed,
                    report.skipped,
                    report.feed_steps,
                    report.resources_released,
                    report.rebinds
                );
                println!(
                    "tick time: avg={:?} max={:?}; updates/tick: {:.2}; live textures after teardown: {}",
                    report.avg_tick,
                    report.max_tick,
                    report.updates_per_tick,
                    report.live_textures_after_teardown
                );
            }
        }
        Commands::Validate { path } => {
            let config = SceneConfig::load(&path)
                .with_context(|| format!("validating {}", path.display()))?;
            let mut ctx = TextureContext::new(SoftwareDevice::new());
            let mut scheduler = FrameScheduler::default();
            let scene = Scene::build(&config, &mut ctx, &mut scheduler, Instant::now())?;
            println!(
                "{}: {} quads, {} units",
                path.display(),
                scene.quads.len(),
                scheduler.len()
            );
            for omitted in &scene.omitted {
                println!("  omitted `{}`: {}", omitted.label, omitted.error);
            }
            let clean = scene.omitted.is_empty();
            scene.teardown(&mut ctx, &mut scheduler);
            anyhow::ensure!(clean, "some quads could not be constructed");
        }
        Commands::Demo { out } => {
            let yaml = SceneConfig::demo().to_yaml()?;
            match out {
                Some(path) => std::fs::write(&path, yaml)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{yaml}"),
            }
        }
    }

    Ok(())
}

fn simulate(
    config: &SceneConfig,
    frames: u32,
    frame_time: Duration,
    policy: ValidationPolicy,
) -> anyhow::Result<SimulationReport> {
    let mut ctx = TextureContext::new(SoftwareDevice::new()).with_policy(policy);
    let mut scheduler = FrameScheduler::new(SchedulerConfig::default());
    let mut now = Instant::now();
    let mut scene = Scene::build(config, &mut ctx, &mut scheduler, now).context("assembling scene")?;
    let mut table = BindingTable::new();
    scene.sync(&ctx, &scheduler, &mut table);

    let mut report = SimulationReport {
        frames,
        units: scheduler.len(),
        omitted: scene.omitted.iter().map(|o| o.label.clone()).collect(),
        ..Default::default()
    };
    for _ in 0..frames {
        now += frame_time;
        let stats = scheduler.tick(&mut ctx, frame_time, now);
        scene.quads.animate(frame_time.as_secs_f32());
        scene.sync(&ctx, &scheduler, &mut table);
        report.updated += stats.updated;
        report.failed += stats.failed;
        report.skipped += stats.skipped;
        report.feed_steps += stats.feed_steps;
        report.resources_released += stats.resources_released;
        report.last = stats;
    }
    report.rebinds = table.rebinds();
    let history = scheduler.history();
    report.avg_tick = history.average_tick();
    report.max_tick = history.slowest_tick();
    report.updates_per_tick = history.updates_per_tick();

    scene.teardown(&mut ctx, &mut scheduler);
    ctx.collect_retired();
    report.live_textures_after_teardown = ctx.device().live_textures();
    tracing::debug!(backend = ctx.device().backend(), "simulation finished");
    Ok(report)
}
