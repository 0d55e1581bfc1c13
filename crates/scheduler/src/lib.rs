//! Frame scheduler: decides when each dynamic texture unit updates.
//!
//! # Invariants
//! - A due unit is updated at most once per tick, whatever drives it.
//! - A failing unit is logged and recorded in its health; other units in
//!   the same tick are unaffected.
//! - Every tick ends by collecting textures whose submissions retired.
//!
//! Units are driven either by the render loop or by a fixed-period timer.
//! An [`InputFeed`] stands in for an external source whose resolution
//! changes over time: it resizes a source unit and retargets the units
//! reading from it.

mod feed;
mod scheduler;
mod timer;

pub use feed::{FeedConfig, InputFeed, oscillating_extent};
pub use scheduler::{
    FrameScheduler, SchedulerConfig, SchedulerError, TickSource, TickStats, UnitHealth,
};
pub use timer::{PeriodicTimer, TickHistory};

pub fn crate_info() -> &'static str {
    "dyntex-scheduler v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scheduler"));
    }
}
