use std::collections::VecDeque;
use std::time::Duration;

use crate::scheduler::TickStats;

/// Accumulates frame deltas and fires once per elapsed period.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    period: Duration,
    accumulated: Duration,
}

impl PeriodicTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Advance by `dt`. Returns `true` at most once per call even if several
    /// periods elapsed; whole missed periods are dropped, the remainder kept.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.period.is_zero() {
            return true;
        }
        self.accumulated += dt;
        if self.accumulated < self.period {
            return false;
        }
        let remainder = self.accumulated.as_nanos() % self.period.as_nanos();
        self.accumulated = Duration::from_nanos(remainder as u64);
        true
    }
}

/// The last few ticks: how long each took and how much work it did.
#[derive(Debug)]
pub struct TickHistory {
    ticks: VecDeque<TickStats>,
    capacity: usize,
}

impl TickHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, stats: TickStats) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(stats);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn average_tick(&self) -> Duration {
        if self.ticks.is_empty() {
            return Duration::ZERO;
        }
        self.ticks.iter().map(|t| t.tick_time).sum::<Duration>() / self.ticks.len() as u32
    }

    pub fn slowest_tick(&self) -> Duration {
        self.ticks.iter().map(|t| t.tick_time).max().unwrap_or_default()
    }

    /// Mean number of unit updates submitted per tick.
    pub fn updates_per_tick(&self) -> f64 {
        if self.ticks.is_empty() {
            return 0.0;
        }
        let updates: usize = self.ticks.iter().map(|t| t.updated).sum();
        updates as f64 / self.ticks.len() as f64
    }

    /// Ticks in the window where at least one unit failed.
    pub fn failing_ticks(&self) -> usize {
        self.ticks.iter().filter(|t| t.failed > 0).count()
    }
}
