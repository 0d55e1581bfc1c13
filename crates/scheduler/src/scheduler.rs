use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use dyntex_common::{Extent2d, UnitId};
use dyntex_core::{DynamicTextureUnit, MaterialHandle, TextureContext, TextureError};
use dyntex_device::GpuDevice;
use serde::Serialize;

use crate::feed::InputFeed;
use crate::timer::{PeriodicTimer, TickHistory};

/// What decides when a unit updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    /// Every scheduler tick.
    RenderLoop,
    /// Once per elapsed period.
    FixedPeriod(Duration),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Ticks kept in the tick history.
    pub frame_history: usize,
    /// Stop updating a unit after this many consecutive failures.
    /// `None` keeps retrying every tick.
    pub quarantine_after: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_history: 120,
            quarantine_after: None,
        }
    }
}

/// Failure bookkeeping for one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitHealth {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_error: Option<TextureError>,
}

/// What the last tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickStats {
    pub updated: usize,
    pub failed: usize,
    /// Units not updated because a feed already refreshed them this tick or
    /// because they are quarantined.
    pub skipped: usize,
    pub feed_steps: usize,
    pub resources_released: usize,
    pub tick_time: Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unit {0} is not registered with the scheduler")]
    UnknownUnit(UnitId),
}

fn quarantined(limit: Option<u32>, health: &UnitHealth) -> bool {
    limit.is_some_and(|limit| health.consecutive_failures >= limit)
}

struct Slot {
    unit: DynamicTextureUnit,
    source: TickSource,
    timer: Option<PeriodicTimer>,
    health: UnitHealth,
}

impl Slot {
    fn record(&mut self, id: UnitId, result: Result<(), TextureError>, stats: &mut TickStats) {
        match result {
            Ok(()) => {
                self.health.consecutive_failures = 0;
                stats.updated += 1;
            }
            Err(err) => {
                tracing::warn!(unit = %id, label = self.unit.label(), error = %err, "unit update failed");
                self.health.consecutive_failures += 1;
                self.health.total_failures += 1;
                self.health.last_error = Some(err);
                stats.failed += 1;
            }
        }
    }
}

/// Ticks a set of units. One unit's failure never stops the others.
pub struct FrameScheduler {
    config: SchedulerConfig,
    slots: BTreeMap<UnitId, Slot>,
    feeds: Vec<InputFeed>,
    stats: TickStats,
    history: TickHistory,
    ticks: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            history: TickHistory::new(config.frame_history),
            config,
            slots: BTreeMap::new(),
            feeds: Vec::new(),
            stats: TickStats::default(),
            ticks: 0,
        }
    }

    pub fn spawn(&mut self, unit: DynamicTextureUnit, source: TickSource) -> UnitId {
        let id = UnitId::new();
        let timer = match source {
            TickSource::RenderLoop => None,
            TickSource::FixedPeriod(period) => Some(PeriodicTimer::new(period)),
        };
        tracing::debug!(unit = %id, label = unit.label(), ?source, "unit scheduled");
        self.slots.insert(
            id,
            Slot {
                unit,
                source,
                timer,
                health: UnitHealth::default(),
            },
        );
        id
    }

    /// Remove a unit and release its texture. Feeds it took part in drop it.
    pub fn despawn<D: GpuDevice>(&mut self, ctx: &mut TextureContext<D>, id: UnitId) -> bool {
        let Some(mut slot) = self.slots.remove(&id) else {
            return false;
        };
        slot.unit.release(ctx);
        self.feeds.retain(|feed| feed.source != id);
        for feed in &mut self.feeds {
            feed.consumers.retain(|c| *c != id);
        }
        tracing::debug!(unit = %id, "unit despawned");
        true
    }

    pub fn add_feed(&mut self, feed: InputFeed) -> Result<(), SchedulerError> {
        for id in std::iter::once(&feed.source).chain(&feed.consumers) {
            if !self.slots.contains_key(id) {
                return Err(SchedulerError::UnknownUnit(*id));
            }
        }
        self.feeds.push(feed);
        Ok(())
    }

    pub fn feeds(&self) -> &[InputFeed] {
        &self.feeds
    }

    pub fn unit(&self, id: UnitId) -> Option<&DynamicTextureUnit> {
        self.slots.get(&id).map(|s| &s.unit)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut DynamicTextureUnit> {
        self.slots.get_mut(&id).map(|s| &mut s.unit)
    }

    pub fn source(&self, id: UnitId) -> Option<TickSource> {
        self.slots.get(&id).map(|s| s.source)
    }

    pub fn material<D: GpuDevice>(
        &self,
        ctx: &TextureContext<D>,
        id: UnitId,
    ) -> Option<MaterialHandle> {
        self.unit(id)?.material(ctx.arena())
    }

    pub fn health(&self, id: UnitId) -> Option<&UnitHealth> {
        self.slots.get(&id).map(|s| &s.health)
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance every tick source by `elapsed` and update what is due.
    ///
    /// Feeds run first; units a feed refreshed are not updated again by
    /// their own source in the same tick. The tick ends by collecting
    /// textures whose submissions have retired.
    pub fn tick<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        elapsed: Duration,
        now: Instant,
    ) -> TickStats {
        let _span = tracing::info_span!("scheduler_tick", tick = self.ticks).entered();
        let start = Instant::now();
        let mut stats = TickStats::default();
        let mut refreshed = HashSet::new();

        let mut feeds = std::mem::take(&mut self.feeds);
        for feed in &mut feeds {
            if let Some(extent) = feed.advance(elapsed) {
                stats.feed_steps += 1;
                self.run_feed(ctx, feed, extent, now, &mut refreshed, &mut stats);
            }
        }
        self.feeds = feeds;

        let quarantine_after = self.config.quarantine_after;
        for (id, slot) in &mut self.slots {
            let due = match &mut slot.timer {
                Some(timer) => timer.advance(elapsed),
                None => true,
            };
            if !due {
                continue;
            }
            if refreshed.contains(id) || quarantined(quarantine_after, &slot.health) {
                stats.skipped += 1;
                continue;
            }
            let result = slot.unit.update(ctx, now);
            slot.record(*id, result, &mut stats);
        }

        stats.resources_released = ctx.collect_retired();
        stats.tick_time = start.elapsed();
        self.history.push(stats);
        self.ticks += 1;
        self.stats = stats;
        tracing::trace!(
            updated = stats.updated,
            failed = stats.failed,
            skipped = stats.skipped,
            released = stats.resources_released,
            "tick complete"
        );
        stats
    }

    fn run_feed<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        feed: &InputFeed,
        extent: Extent2d,
        now: Instant,
        refreshed: &mut HashSet<UnitId>,
        stats: &mut TickStats,
    ) {
        let quarantine_after = self.config.quarantine_after;
        let Some(source) = self.slots.get_mut(&feed.source) else {
            return;
        };
        if quarantined(quarantine_after, &source.health) {
            return;
        }
        tracing::debug!(source = %feed.source, %extent, "input feed resized");
        let result = source.unit.resize_to(ctx, extent, now);
        let ok = result.is_ok();
        source.record(feed.source, result, stats);
        refreshed.insert(feed.source);
        if !ok {
            return;
        }
        let Some(input) = source.unit.material(ctx.arena()).map(|m| m.as_input()) else {
            return;
        };

        for consumer_id in &feed.consumers {
            let Some(consumer) = self.slots.get_mut(consumer_id) else {
                continue;
            };
            if quarantined(quarantine_after, &consumer.health) {
                continue;
            }
            let result = consumer.unit.set_input(ctx, input, now);
            consumer.record(*consumer_id, result, stats);
            refreshed.insert(*consumer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedConfig;
    use dyntex_common::{PixelFormat, TextureDescriptor, TextureUsages};
    use dyntex_core::{InputTexture, UnitConfig};
    use dyntex_device::SoftwareDevice;

    fn ctx() -> TextureContext<SoftwareDevice> {
        TextureContext::new(SoftwareDevice::new())
    }

    fn unit(
        ctx: &mut TextureContext<SoftwareDevice>,
        kernel: &str,
        input: Option<InputTexture>,
    ) -> DynamicTextureUnit {
        let mut config = UnitConfig::new(kernel, kernel, 32, 32);
        config.input = input;
        DynamicTextureUnit::construct(ctx, config, Instant::now()).unwrap()
    }

    fn base(ctx: &mut TextureContext<SoftwareDevice>) -> InputTexture {
        let desc = TextureDescriptor {
            extent: Extent2d::new(64, 64),
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsages::SHADER_READ,
        };
        ctx.upload_input(&desc, &vec![128; 64 * 64 * 4], "base").unwrap()
    }

    const FRAME: Duration = Duration::from_millis(16);

    #[test]
    fn render_loop_units_update_every_tick() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let a = unit(&mut ctx, "color_circles", None);
        let id = scheduler.spawn(a, TickSource::RenderLoop);

        for _ in 0..3 {
            let stats = scheduler.tick(&mut ctx, FRAME, Instant::now());
            assert_eq!(stats.updated, 1);
        }
        assert_eq!(scheduler.unit(id).unwrap().update_count(), 3);
        assert_eq!(scheduler.ticks(), 3);
        assert_eq!(scheduler.history().len(), 3);
        assert_eq!(scheduler.history().updates_per_tick(), 1.0);
    }

    #[test]
    fn fixed_period_units_wait_for_their_period() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let u = unit(&mut ctx, "color_circles", None);
        let id = scheduler.spawn(u, TickSource::FixedPeriod(Duration::from_millis(200)));

        for _ in 0..12 {
            scheduler.tick(&mut ctx, FRAME, Instant::now());
        }
        // 12 * 16ms = 192ms
        assert_eq!(scheduler.unit(id).unwrap().update_count(), 0);
        scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(scheduler.unit(id).unwrap().update_count(), 1);
    }

    #[test]
    fn failing_unit_does_not_block_others() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let good = unit(&mut ctx, "color_circles", None);
        let input = base(&mut ctx);
        let doomed = unit(&mut ctx, "invert", Some(input));
        let good_id = scheduler.spawn(good, TickSource::RenderLoop);
        let bad_id = scheduler.spawn(doomed, TickSource::RenderLoop);

        // Drop every compiled program: both units now hold stale programs.
        ctx.registry_mut().reset();
        let fresh = unit(&mut ctx, "color_circles", None);
        let fresh_id = scheduler.spawn(fresh, TickSource::RenderLoop);

        let stats = scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(scheduler.unit(fresh_id).unwrap().update_count(), 1);
        let health = scheduler.health(bad_id).unwrap();
        assert_eq!(health.consecutive_failures, 1);
        assert!(matches!(
            health.last_error,
            Some(TextureError::PipelineUnavailable { .. })
        ));
        assert!(scheduler.health(good_id).unwrap().last_error.is_some());

        scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(scheduler.unit(fresh_id).unwrap().update_count(), 2);
    }

    #[test]
    fn quarantine_skips_repeat_offenders() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::new(SchedulerConfig {
            quarantine_after: Some(2),
            ..SchedulerConfig::default()
        });
        let u = unit(&mut ctx, "color_circles", None);
        let id = scheduler.spawn(u, TickSource::RenderLoop);
        ctx.device_mut().set_encoder_failure(true);

        scheduler.tick(&mut ctx, FRAME, Instant::now());
        scheduler.tick(&mut ctx, FRAME, Instant::now());
        let stats = scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(stats.skipped, 1);
        assert_eq!(scheduler.health(id).unwrap().consecutive_failures, 2);
    }

    #[test]
    fn feed_resizes_source_and_retargets_consumers_once() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let base = base(&mut ctx);
        let source = unit(&mut ctx, "simulate_masking", Some(base));
        let source_id = scheduler.spawn(source, TickSource::FixedPeriod(Duration::from_millis(200)));
        let wave = unit(&mut ctx, "wavy_transparency", Some(base));
        let wave_id = scheduler.spawn(wave, TickSource::RenderLoop);
        let copy = unit(&mut ctx, "blit", Some(base));
        let copy_id = scheduler.spawn(copy, TickSource::RenderLoop);

        let feed = InputFeed::new(
            source_id,
            FeedConfig {
                period: Duration::from_millis(200),
                base: Extent2d::new(400, 200),
            },
        )
        .with_consumer(wave_id)
        .with_consumer(copy_id);
        scheduler.add_feed(feed).unwrap();

        let stats = scheduler.tick(&mut ctx, Duration::from_millis(200), Instant::now());
        assert_eq!(stats.feed_steps, 1);
        // Source and both consumers are refreshed by the feed only.
        assert_eq!(stats.updated, 3);
        assert_eq!(stats.skipped, 3);

        let source_material = scheduler.material(&ctx, source_id).unwrap();
        let expected = crate::feed::oscillating_extent(Extent2d::new(400, 200), 0.2);
        assert_eq!(source_material.extent, expected);
        for id in [wave_id, copy_id] {
            let unit = scheduler.unit(id).unwrap();
            assert_eq!(unit.input().unwrap().texture, source_material.texture);
            assert_eq!(unit.update_count(), 1);
            assert_eq!(scheduler.material(&ctx, id).unwrap().extent, expected);
        }
    }

    #[test]
    fn feed_source_failure_leaves_consumers_alone() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let base = base(&mut ctx);
        let source = unit(&mut ctx, "simulate_masking", Some(base));
        let source_id = scheduler.spawn(source, TickSource::FixedPeriod(Duration::from_secs(1)));
        let copy = unit(&mut ctx, "blit", Some(base));
        let copy_id = scheduler.spawn(copy, TickSource::RenderLoop);
        scheduler
            .add_feed(InputFeed::new(source_id, FeedConfig::default()).with_consumer(copy_id))
            .unwrap();

        ctx.device_mut().set_memory_budget(Some(0));
        let stats = scheduler.tick(&mut ctx, Duration::from_millis(200), Instant::now());
        assert_eq!(stats.failed, 1);
        // The blit needs no allocation and keeps running on its old input.
        assert_eq!(stats.updated, 1);
        assert!(matches!(
            scheduler.health(source_id).unwrap().last_error,
            Some(TextureError::AllocationFailed(_))
        ));
        assert_eq!(scheduler.unit(copy_id).unwrap().input(), Some(base));
    }

    #[test]
    fn add_feed_rejects_unknown_units() {
        let mut scheduler = FrameScheduler::default();
        let ghost = UnitId::new();
        assert_eq!(
            scheduler.add_feed(InputFeed::new(ghost, FeedConfig::default())),
            Err(SchedulerError::UnknownUnit(ghost))
        );
    }

    #[test]
    fn despawn_releases_texture() {
        let mut ctx = ctx();
        let mut scheduler = FrameScheduler::default();
        let u = unit(&mut ctx, "color_circles", None);
        let id = scheduler.spawn(u, TickSource::RenderLoop);
        scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(ctx.device().live_textures(), 1);

        assert!(scheduler.despawn(&mut ctx, id));
        assert!(!scheduler.despawn(&mut ctx, id));
        let stats = scheduler.tick(&mut ctx, FRAME, Instant::now());
        assert_eq!(stats.resources_released, 1);
        assert_eq!(ctx.device().live_textures(), 0);
        assert!(scheduler.is_empty());
    }
}
