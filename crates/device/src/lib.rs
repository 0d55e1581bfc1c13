//! GPU Device/Queue context: the service every dynamic texture depends on.
//!
//! # Invariants
//! - Command buffers are recorded CPU-side and handed to the device whole.
//! - Submission indices are strictly increasing; `poll()` reports the
//!   newest index whose work has retired.
//! - A texture id is never reused within one device.
//!
//! # Backends
//! `SoftwareDevice` executes kernels on the CPU with deferred retirement so
//! drain-before-release behavior is observable in tests. The wgpu backend
//! lives in `dyntex-device-wgpu` and implements the same trait.

mod command;
mod device;
mod error;
mod kernel;
pub mod software;

pub use command::{
    Command, CommandBuffer, CommandEncoder, DispatchCommand, KernelId, SubmissionIndex,
    TextureBinding, TextureId, WorkgroupCount,
};
pub use device::GpuDevice;
pub use error::DeviceError;
pub use kernel::{
    BUILTIN_KERNELS, CompiledKernel, KernelInfo, KernelLayout, KernelSignature, builtin_kernel,
};
pub use software::SoftwareDevice;

pub fn crate_info() -> &'static str {
    "dyntex-device v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("device"));
    }
}
