//! Shared types for the dynamic texture pipeline.
//!
//! # Invariants
//! - A `TextureDescriptor` that passed `validate()` has non-zero width and height.
//! - Ids are opaque and unique per process run.

mod texture;
mod types;

pub use texture::{DescriptorError, Extent2d, PixelFormat, TextureDescriptor, TextureUsages};
pub use types::{QuadId, Transform, UnitId};

pub fn crate_info() -> &'static str {
    "dyntex-common v0.1.0"
}
