//! wgpu backend for the dynamic texture pipeline.
//!
//! `WgpuDevice` implements `GpuDevice` on a real adapter: kernels are WGSL
//! compute shaders, command buffers are re-encoded into wgpu passes, and
//! retirement is reported through `Queue::on_submitted_work_done`.
//! `QuadRenderer` draws a scene's quads, sampling each unit's material.
//!
//! # Invariants
//! - Every WGSL kernel uses a 16x16 work-group and guards against
//!   out-of-range invocations.
//! - The time uniform is 16 bytes; kernels read only its first float.
//! - A submission index is reported retired only after the GPU signalled
//!   completion of that submission.

mod camera;
mod device;
mod error;
mod format;
mod quad;
pub mod shaders;

pub use camera::QuadCamera;
pub use device::WgpuDevice;
pub use error::WgpuInitError;
pub use format::{texture_format, texture_usages};
pub use quad::QuadRenderer;

pub fn crate_info() -> &'static str {
    "dyntex-device-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
