use std::sync::{Arc, Weak};

use dyntex_common::Extent2d;
use dyntex_device::{KernelLayout, KernelSignature, WorkgroupCount};

use crate::registry::ComputeProgram;

/// Edge length of the square local work-group every kernel is written for.
pub const WORKGROUP_SIZE: u32 = 16;

/// Kernel name that selects a plain texture copy instead of a compute program.
pub const BLIT: &str = "blit";

/// Work-groups needed to cover `extent`, rounding up on each axis.
pub fn dispatch_grid(extent: Extent2d) -> WorkgroupCount {
    WorkgroupCount {
        x: extent.width.div_ceil(WORKGROUP_SIZE),
        y: extent.height.div_ceil(WORKGROUP_SIZE),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Procedural: writes the output from time alone.
    Generate,
    /// Reads an input texture and writes the output.
    Transform,
    /// Copies the input into the output without a pipeline.
    Blit,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Generate => "generate",
            Self::Transform => "transform",
            Self::Blit => "blit",
        })
    }
}

/// What a unit does on every update.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    Kernel {
        name: String,
        program: Weak<ComputeProgram>,
        signature: KernelSignature,
    },
    Blit,
}

impl Operation {
    pub(crate) fn kernel(program: &Arc<ComputeProgram>) -> Self {
        Self::Kernel {
            name: program.name().to_string(),
            program: Arc::downgrade(program),
            signature: program.signature(),
        }
    }

    pub(crate) fn kind(&self) -> OperationKind {
        match self {
            Self::Kernel { signature, .. } => match signature.layout {
                KernelLayout::OutputOnly => OperationKind::Generate,
                KernelLayout::InputOutput => OperationKind::Transform,
            },
            Self::Blit => OperationKind::Blit,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Kernel { name, .. } => name,
            Self::Blit => BLIT,
        }
    }

    pub(crate) fn needs_input(&self) -> bool {
        self.kind() != OperationKind::Generate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rounds_up() {
        assert_eq!(
            dispatch_grid(Extent2d::new(100, 100)),
            WorkgroupCount { x: 7, y: 7 }
        );
        assert_eq!(
            dispatch_grid(Extent2d::new(128, 128)),
            WorkgroupCount { x: 8, y: 8 }
        );
        assert_eq!(
            dispatch_grid(Extent2d::new(1, 17)),
            WorkgroupCount { x: 1, y: 2 }
        );
    }

    #[test]
    fn blit_needs_input() {
        assert_eq!(Operation::Blit.kind(), OperationKind::Blit);
        assert!(Operation::Blit.needs_input());
        assert_eq!(Operation::Blit.name(), "blit");
    }
}
