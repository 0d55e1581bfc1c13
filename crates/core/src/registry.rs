use std::collections::HashMap;
use std::sync::Arc;

use dyntex_device::{CompiledKernel, GpuDevice, KernelId, KernelSignature};

use crate::error::TextureError;

/// A compiled kernel shared by every unit that names it.
#[derive(Debug, PartialEq, Eq)]
pub struct ComputeProgram {
    name: String,
    kernel: CompiledKernel,
}

impl ComputeProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> KernelId {
        self.kernel.id
    }

    pub fn signature(&self) -> KernelSignature {
        self.kernel.signature
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    NotLoaded,
    Ready,
    Failed(String),
}

/// Lazily compiles kernels and memoizes the outcome per name.
///
/// A failed compilation is never retried within the registry's lifetime,
/// including across [`ProgramRegistry::reset`].
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, Arc<ComputeProgram>>,
    failures: HashMap<String, String>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<D: GpuDevice>(
        &mut self,
        device: &mut D,
        name: &str,
    ) -> Result<Arc<ComputeProgram>, TextureError> {
        if let Some(program) = self.programs.get(name) {
            return Ok(Arc::clone(program));
        }
        if let Some(reason) = self.failures.get(name) {
            return Err(TextureError::PipelineUnavailable {
                kernel: name.to_string(),
                reason: reason.clone(),
            });
        }

        let _span = tracing::debug_span!("compile_kernel", kernel = name).entered();
        match device.compile_kernel(name) {
            Ok(kernel) => {
                tracing::info!(kernel = name, backend = device.backend(), "compute program compiled");
                let program = Arc::new(ComputeProgram {
                    name: name.to_string(),
                    kernel,
                });
                self.programs.insert(name.to_string(), Arc::clone(&program));
                Ok(program)
            }
            Err(err) => {
                tracing::warn!(kernel = name, error = %err, "compute program unavailable");
                self.failures.insert(name.to_string(), err.to_string());
                Err(TextureError::PipelineUnavailable {
                    kernel: name.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    pub fn status(&self, name: &str) -> ProgramStatus {
        if self.programs.contains_key(name) {
            ProgramStatus::Ready
        } else if let Some(reason) = self.failures.get(name) {
            ProgramStatus::Failed(reason.clone())
        } else {
            ProgramStatus::NotLoaded
        }
    }

    /// Drop every compiled program, e.g. after device loss. Units holding
    /// the old programs see them as stale.
    pub fn reset(&mut self) {
        tracing::info!(programs = self.programs.len(), "program registry reset");
        self.programs.clear();
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntex_device::SoftwareDevice;

    #[test]
    fn compiles_once_and_shares() {
        let mut device = SoftwareDevice::new();
        let mut registry = ProgramRegistry::new();
        let a = registry.load(&mut device, "color_circles").unwrap();
        let b = registry.load(&mut device, "color_circles").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(device.compile_attempts("color_circles"), 1);
        assert_eq!(registry.status("color_circles"), ProgramStatus::Ready);
    }

    #[test]
    fn failure_is_permanent() {
        let mut device = SoftwareDevice::new();
        device.break_kernel("invert");
        let mut registry = ProgramRegistry::new();
        assert!(registry.load(&mut device, "invert").is_err());
        assert!(registry.load(&mut device, "invert").is_err());
        assert_eq!(device.compile_attempts("invert"), 1);
        assert!(matches!(registry.status("invert"), ProgramStatus::Failed(_)));

        registry.reset();
        assert!(registry.load(&mut device, "invert").is_err());
        assert_eq!(device.compile_attempts("invert"), 1);
    }

    #[test]
    fn unknown_kernel_is_unavailable() {
        let mut device = SoftwareDevice::new();
        let mut registry = ProgramRegistry::new();
        assert!(matches!(
            registry.load(&mut device, "no_such_kernel"),
            Err(TextureError::PipelineUnavailable { .. })
        ));
        assert_eq!(registry.status("other"), ProgramStatus::NotLoaded);
    }

    #[test]
    fn reset_leaves_weak_handles_stale() {
        let mut device = SoftwareDevice::new();
        let mut registry = ProgramRegistry::new();
        let weak = Arc::downgrade(&registry.load(&mut device, "invert").unwrap());
        assert!(weak.upgrade().is_some());
        registry.reset();
        assert!(weak.upgrade().is_none());
        assert!(registry.is_empty());
    }
}
