//! Dynamic texture units: GPU textures rewritten every tick by a compute
//! kernel or a copy.
//!
//! # Invariants
//! - A unit has exactly one current output texture at any time.
//! - Resizing allocates a new texture; the old one is destroyed only after
//!   every submission that referenced it has completed.
//! - A kernel is compiled at most once per registry. Failures are memoized.
//! - A unit's material always describes its current texture.
//!
//! # Threading
//! Everything here runs on the thread that owns the [`TextureContext`].
//! GPU work retires asynchronously and is observed through
//! [`TextureContext::collect_retired`].

mod arena;
mod context;
mod error;
mod material;
mod operation;
mod registry;
mod unit;

pub use arena::{ArenaStats, CurrentTexture, TextureArena, TextureLease};
pub use context::{TextureContext, ValidationPolicy};
pub use error::TextureError;
pub use material::{InputTexture, MaterialHandle};
pub use operation::{BLIT, OperationKind, WORKGROUP_SIZE, dispatch_grid};
pub use registry::{ComputeProgram, ProgramRegistry, ProgramStatus};
pub use unit::{DynamicTextureUnit, UnitConfig, UnitState};

pub fn crate_info() -> &'static str {
    "dyntex-core v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("core"));
    }
}
