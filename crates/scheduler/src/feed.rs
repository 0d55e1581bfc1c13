use std::time::Duration;

use dyntex_common::{Extent2d, UnitId};

use crate::timer::PeriodicTimer;

/// Settings for a simulated external input whose resolution changes over time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub period: Duration,
    /// Extent the oscillation is scaled from.
    pub base: Extent2d,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(200),
            base: Extent2d::new(512, 512),
        }
    }
}

/// Extent of the feed at `t` seconds: `(0.25 + 0.2 * sin t) * base`,
/// truncated, at least one texel per axis.
pub fn oscillating_extent(base: Extent2d, t: f32) -> Extent2d {
    let factor = 0.25 + 0.2 * t.sin();
    let scale = |v: u32| ((factor * v as f32) as u32).max(1);
    Extent2d::new(scale(base.width), scale(base.height))
}

/// Drives a source unit through [`oscillating_extent`] every period and
/// retargets its consumers at the source's new output.
#[derive(Debug, Clone)]
pub struct InputFeed {
    pub(crate) source: UnitId,
    pub(crate) consumers: Vec<UnitId>,
    pub(crate) config: FeedConfig,
    pub(crate) timer: PeriodicTimer,
    pub(crate) running_time: Duration,
}

impl InputFeed {
    pub fn new(source: UnitId, config: FeedConfig) -> Self {
        Self {
            source,
            consumers: Vec::new(),
            timer: PeriodicTimer::new(config.period),
            config,
            running_time: Duration::ZERO,
        }
    }

    pub fn with_consumer(mut self, consumer: UnitId) -> Self {
        self.add_consumer(consumer);
        self
    }

    pub fn add_consumer(&mut self, consumer: UnitId) {
        if !self.consumers.contains(&consumer) {
            self.consumers.push(consumer);
        }
    }

    pub fn source(&self) -> UnitId {
        self.source
    }

    pub fn consumers(&self) -> &[UnitId] {
        &self.consumers
    }

    /// Advance feed time. Returns the extent to apply when a period elapsed.
    pub(crate) fn advance(&mut self, dt: Duration) -> Option<Extent2d> {
        self.running_time += dt;
        self.timer
            .advance(dt)
            .then(|| oscillating_extent(self.config.base, self.running_time.as_secs_f32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_oscillates_between_bounds() {
        let base = Extent2d::new(1000, 500);
        assert_eq!(oscillating_extent(base, 0.0), Extent2d::new(250, 125));
        let peak = oscillating_extent(base, std::f32::consts::FRAC_PI_2);
        assert!((449..=450).contains(&peak.width));
        assert!((224..=225).contains(&peak.height));
        let trough = oscillating_extent(base, -std::f32::consts::FRAC_PI_2);
        assert!((49..=50).contains(&trough.width));
    }

    #[test]
    fn extent_never_zero() {
        let tiny = oscillating_extent(Extent2d::new(2, 2), -std::f32::consts::FRAC_PI_2);
        assert_eq!(tiny, Extent2d::new(1, 1));
    }

    #[test]
    fn feed_fires_on_period() {
        let mut feed = InputFeed::new(UnitId::new(), FeedConfig::default());
        assert!(feed.advance(Duration::from_millis(100)).is_none());
        let extent = feed.advance(Duration::from_millis(100)).unwrap();
        assert!(extent.width > 0);
    }
}
