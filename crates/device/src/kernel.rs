use dyntex_common::PixelFormat;

use crate::command::KernelId;

/// Which textures a kernel binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelLayout {
    /// Procedural generation: output at slot 0.
    OutputOnly,
    /// Transform: input at slot 0, output at slot 1.
    InputOutput,
}

impl KernelLayout {
    pub fn input_slot(self) -> Option<u32> {
        match self {
            Self::OutputOnly => None,
            Self::InputOutput => Some(0),
        }
    }

    pub fn output_slot(self) -> u32 {
        match self {
            Self::OutputOnly => 0,
            Self::InputOutput => 1,
        }
    }

    /// Binding index of the elapsed-time uniform, placed after the textures.
    pub fn time_binding(self) -> u32 {
        self.output_slot() + 1
    }

    pub fn needs_input(self) -> bool {
        self.input_slot().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    pub layout: KernelLayout,
    /// Whether the kernel reads the elapsed-time scalar.
    pub time_driven: bool,
    /// Storage format of the output image.
    pub output_format: PixelFormat,
}

/// A kernel compiled by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledKernel {
    pub id: KernelId,
    pub signature: KernelSignature,
}

/// Catalog entry for a kernel shipped with the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct KernelInfo {
    pub name: &'static str,
    pub signature: KernelSignature,
    pub summary: &'static str,
}

/// Kernels every backend provides.
pub const BUILTIN_KERNELS: &[KernelInfo] = &[
    KernelInfo {
        name: "color_circles",
        signature: KernelSignature {
            layout: KernelLayout::OutputOnly,
            time_driven: true,
            output_format: PixelFormat::Rgba8Unorm,
        },
        summary: "animated concentric color rings",
    },
    KernelInfo {
        name: "wavy_transparency",
        signature: KernelSignature {
            layout: KernelLayout::InputOutput,
            time_driven: true,
            output_format: PixelFormat::Rgba8Unorm,
        },
        summary: "input with a travelling alpha wave",
    },
    KernelInfo {
        name: "simulate_masking",
        signature: KernelSignature {
            layout: KernelLayout::InputOutput,
            time_driven: true,
            output_format: PixelFormat::Rgba8Unorm,
        },
        summary: "input resampled to the output extent behind a moving mask",
    },
    KernelInfo {
        name: "invert",
        signature: KernelSignature {
            layout: KernelLayout::InputOutput,
            time_driven: false,
            output_format: PixelFormat::Rgba8Unorm,
        },
        summary: "color inversion of the input",
    },
];

pub fn builtin_kernel(name: &str) -> Option<&'static KernelInfo> {
    BUILTIN_KERNELS.iter().find(|k| k.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_slots() {
        let layout = KernelLayout::InputOutput;
        assert_eq!(layout.input_slot(), Some(0));
        assert_eq!(layout.output_slot(), 1);
        assert_eq!(layout.time_binding(), 2);
    }

    #[test]
    fn generator_slots() {
        let layout = KernelLayout::OutputOnly;
        assert_eq!(layout.input_slot(), None);
        assert_eq!(layout.output_slot(), 0);
        assert_eq!(layout.time_binding(), 1);
        assert!(!layout.needs_input());
    }

    #[test]
    fn builtin_lookup() {
        assert!(builtin_kernel("color_circles").is_some());
        assert!(builtin_kernel("does_not_exist").is_none());
        let names: Vec<_> = BUILTIN_KERNELS.iter().map(|k| k.name).collect();
        let mut sorted = names.clone();
        sorted.dedup();
        assert_eq!(names.len(), sorted.len());
    }
}
