use dyntex_common::Extent2d;

/// Device-local handle to an allocated texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Handle to a compiled compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

/// Monotonic index assigned to each submitted command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionIndex(pub u64);

/// Number of work-groups launched per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupCount {
    pub x: u32,
    pub y: u32,
}

/// A texture bound to a kernel slot for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureBinding {
    /// Read-only input.
    Input { slot: u32, texture: TextureId },
    /// Storage image the kernel writes.
    Output { slot: u32, texture: TextureId },
}

impl TextureBinding {
    pub fn texture(&self) -> TextureId {
        match self {
            Self::Input { texture, .. } | Self::Output { texture, .. } => *texture,
        }
    }

    pub fn slot(&self) -> u32 {
        match self {
            Self::Input { slot, .. } | Self::Output { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchCommand {
    pub kernel: KernelId,
    pub bindings: Vec<TextureBinding>,
    /// Elapsed seconds uploaded as the kernel's single scalar uniform.
    pub time: Option<f32>,
    pub workgroups: WorkgroupCount,
    /// Edge length of the square local work-group.
    pub local_size: u32,
}

impl DispatchCommand {
    pub fn output(&self) -> Option<TextureId> {
        self.bindings.iter().find_map(|b| match b {
            TextureBinding::Output { texture, .. } => Some(*texture),
            TextureBinding::Input { .. } => None,
        })
    }

    pub fn input(&self) -> Option<TextureId> {
        self.bindings.iter().find_map(|b| match b {
            TextureBinding::Input { texture, .. } => Some(*texture),
            TextureBinding::Output { .. } => None,
        })
    }
}

/// One recorded GPU operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(DispatchCommand),
    /// Data-movement copy; needs no pipeline.
    Copy {
        src: TextureId,
        dst: TextureId,
        extent: Extent2d,
    },
}

/// Records commands for a single submission.
///
/// Tracks which textures were acquired for writing so a resource cannot be
/// handed out twice within one command buffer.
#[derive(Debug)]
pub struct CommandEncoder {
    label: String,
    commands: Vec<Command>,
    writable: Vec<TextureId>,
}

impl CommandEncoder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
            writable: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Claim `texture` as this buffer's write target. Returns `false` if it
    /// was already claimed.
    pub fn claim_writable(&mut self, texture: TextureId) -> bool {
        if self.writable.contains(&texture) {
            return false;
        }
        self.writable.push(texture);
        true
    }

    pub fn dispatch(&mut self, dispatch: DispatchCommand) {
        self.commands.push(Command::Dispatch(dispatch));
    }

    pub fn copy(&mut self, src: TextureId, dst: TextureId, extent: Extent2d) {
        self.commands.push(Command::Copy { src, dst, extent });
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn finish(self) -> CommandBuffer {
        CommandBuffer {
            label: self.label,
            commands: self.commands,
        }
    }
}

/// A finished, submittable list of commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuffer {
    pub label: String,
    pub commands: Vec<Command>,
}

impl CommandBuffer {
    /// Every texture this buffer reads or writes, deduplicated.
    pub fn referenced_textures(&self) -> Vec<TextureId> {
        let mut ids: Vec<TextureId> = self
            .commands
            .iter()
            .flat_map(|c| match c {
                Command::Dispatch(d) => d.bindings.iter().map(|b| b.texture()).collect::<Vec<_>>(),
                Command::Copy { src, dst, .. } => vec![*src, *dst],
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_claimed_once() {
        let mut enc = CommandEncoder::new("test");
        assert!(enc.claim_writable(TextureId(1)));
        assert!(!enc.claim_writable(TextureId(1)));
        assert!(enc.claim_writable(TextureId(2)));
    }

    #[test]
    fn referenced_textures_are_deduplicated() {
        let mut enc = CommandEncoder::new("refs");
        enc.dispatch(DispatchCommand {
            kernel: KernelId(0),
            bindings: vec![
                TextureBinding::Input {
                    slot: 0,
                    texture: TextureId(3),
                },
                TextureBinding::Output {
                    slot: 1,
                    texture: TextureId(5),
                },
            ],
            time: Some(1.0),
            workgroups: WorkgroupCount { x: 1, y: 1 },
            local_size: 16,
        });
        enc.copy(TextureId(5), TextureId(3), Extent2d::new(4, 4));
        let buffer = enc.finish();
        assert_eq!(buffer.label, "refs");
        assert_eq!(buffer.referenced_textures(), vec![TextureId(3), TextureId(5)]);
    }

    #[test]
    fn dispatch_finds_input_and_output() {
        let d = DispatchCommand {
            kernel: KernelId(1),
            bindings: vec![TextureBinding::Output {
                slot: 0,
                texture: TextureId(9),
            }],
            time: None,
            workgroups: WorkgroupCount { x: 2, y: 2 },
            local_size: 16,
        };
        assert_eq!(d.output(), Some(TextureId(9)));
        assert_eq!(d.input(), None);
    }
}
