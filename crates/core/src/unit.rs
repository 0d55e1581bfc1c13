use std::time::Instant;

use dyntex_common::{Extent2d, PixelFormat, TextureDescriptor};
use dyntex_device::{DispatchCommand, GpuDevice, TextureBinding};

use crate::arena::{TextureArena, TextureLease};
use crate::context::TextureContext;
use crate::error::TextureError;
use crate::material::{InputTexture, MaterialHandle};
use crate::operation::{BLIT, Operation, OperationKind, WORKGROUP_SIZE, dispatch_grid};

/// Parameters a unit is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConfig {
    pub label: String,
    pub kernel: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub input: Option<InputTexture>,
}

impl UnitConfig {
    pub fn new(label: impl Into<String>, kernel: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            kernel: kernel.into(),
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
            input: None,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_input(mut self, input: InputTexture) -> Self {
        self.input = Some(input);
        self
    }

    pub fn descriptor(&self) -> TextureDescriptor {
        TextureDescriptor::dynamic(self.width, self.height, self.format)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Allocated; no update has completed yet.
    Uninitialized,
    Ready,
    Released,
}

/// A texture continuously rewritten by one GPU operation.
#[derive(Debug)]
pub struct DynamicTextureUnit {
    label: String,
    lease: Option<TextureLease>,
    operation: Operation,
    input: Option<InputTexture>,
    spawn_time: Instant,
    state: UnitState,
    updates: u64,
}

impl DynamicTextureUnit {
    /// Validate `config`, resolve its operation, and allocate the output
    /// texture. Nothing is allocated when validation fails.
    pub fn construct<D: GpuDevice>(
        ctx: &mut TextureContext<D>,
        config: UnitConfig,
        now: Instant,
    ) -> Result<Self, TextureError> {
        let _span = tracing::debug_span!("unit_construct", label = %config.label, kernel = %config.kernel).entered();
        let mut descriptor = config.descriptor();
        descriptor
            .validate_output()
            .map_err(|e| TextureError::InvalidInput(e.to_string()))?;
        if let Some(input) = &config.input {
            ctx.validate_input(&input.descriptor)?;
        }

        let operation = if config.kernel == BLIT {
            Operation::Blit
        } else {
            let (device, _, registry) = ctx.parts();
            let program = registry.load(device, &config.kernel)?;
            let output_format = program.signature().output_format;
            if output_format != descriptor.format {
                return Err(TextureError::InvalidInput(format!(
                    "kernel `{}` writes {output_format}, unit requested {}",
                    config.kernel, descriptor.format
                )));
            }
            Operation::kernel(&program)
        };
        if operation.needs_input() && config.input.is_none() {
            return Err(TextureError::InvalidInput(format!(
                "{} operation `{}` requires an input texture",
                operation.kind(),
                operation.name()
            )));
        }
        if let (Operation::Blit, Some(input)) = (&operation, &config.input) {
            check_blit_format(descriptor.format, input)?;
            if input.extent() != descriptor.extent {
                tracing::debug!(label = %config.label, requested = %descriptor.extent, input = %input.extent(), "blit output follows its input extent");
                descriptor = descriptor.with_extent(input.extent());
            }
        }
        if operation.kind() == OperationKind::Generate && config.input.is_some() {
            tracing::debug!(kernel = %config.kernel, "generator ignores its input texture");
        }

        let (device, arena, _) = ctx.parts();
        let lease = arena.create(device, &descriptor, &config.label)?;
        tracing::info!(label = %config.label, kernel = operation.name(), extent = %descriptor.extent, "unit constructed");

        Ok(Self {
            label: config.label,
            lease: Some(lease),
            operation,
            input: config.input,
            spawn_time: now,
            state: UnitState::Uninitialized,
            updates: 0,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn kernel_name(&self) -> &str {
        self.operation.name()
    }

    pub fn spawn_time(&self) -> Instant {
        self.spawn_time
    }

    pub fn input(&self) -> Option<InputTexture> {
        self.input
    }

    /// Completed updates since construction.
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// The unit's current output, or `None` once released.
    pub fn material(&self, arena: &TextureArena) -> Option<MaterialHandle> {
        let current = arena.current(self.lease.as_ref()?)?;
        Some(MaterialHandle {
            texture: current.texture,
            generation: current.generation,
            extent: current.descriptor.extent,
            format: current.descriptor.format,
        })
    }

    fn live_lease(&self) -> Result<&TextureLease, TextureError> {
        match (&self.lease, self.state) {
            (Some(lease), UnitState::Uninitialized | UnitState::Ready) => Ok(lease),
            _ => Err(TextureError::UnitReleased(self.label.clone())),
        }
    }

    /// Record and submit one pass of the unit's operation.
    pub fn update<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        now: Instant,
    ) -> Result<(), TextureError> {
        let lease = self.live_lease()?;
        let _span = tracing::trace_span!("unit_update", label = %self.label).entered();

        let program = match &self.operation {
            Operation::Kernel { name, program, .. } => {
                Some(program.upgrade().ok_or_else(|| TextureError::PipelineUnavailable {
                    kernel: name.clone(),
                    reason: "program was dropped by a registry reset".into(),
                })?)
            }
            Operation::Blit => None,
        };
        if self.operation.needs_input() && self.input.is_none() {
            return Err(TextureError::InvalidInput(format!(
                "unit `{}` has no input texture",
                self.label
            )));
        }

        let (device, arena, _) = ctx.parts();
        let mut encoder = device.create_encoder(&self.label)?;
        let output = arena.acquire_writable(lease, &mut encoder)?;
        let extent = arena
            .current(lease)
            .map(|c| c.descriptor.extent)
            .unwrap_or(Extent2d::new(0, 0));

        match program {
            Some(program) => {
                let signature = program.signature();
                let mut bindings = Vec::with_capacity(2);
                if let (Some(slot), Some(input)) = (signature.layout.input_slot(), self.input) {
                    bindings.push(TextureBinding::Input {
                        slot,
                        texture: input.texture,
                    });
                }
                bindings.push(TextureBinding::Output {
                    slot: signature.layout.output_slot(),
                    texture: output,
                });
                let time = signature
                    .time_driven
                    .then(|| now.saturating_duration_since(self.spawn_time).as_secs_f32());
                encoder.dispatch(DispatchCommand {
                    kernel: program.kernel(),
                    bindings,
                    time,
                    workgroups: dispatch_grid(extent),
                    local_size: WORKGROUP_SIZE,
                });
            }
            None => {
                if let Some(input) = self.input {
                    let source = input.extent();
                    let overlap = Extent2d::new(
                        extent.width.min(source.width),
                        extent.height.min(source.height),
                    );
                    encoder.copy(input.texture, output, overlap);
                }
            }
        }

        let submission = ctx.submit(encoder)?;
        tracing::trace!(label = %self.label, ?submission, "unit update submitted");
        self.state = UnitState::Ready;
        self.updates += 1;
        Ok(())
    }

    /// Replace the output texture with one matching `descriptor`, then
    /// update once. On allocation failure the previous texture stays bound.
    pub fn resize<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        descriptor: &TextureDescriptor,
        now: Instant,
    ) -> Result<(), TextureError> {
        self.replace_output(ctx, descriptor)?;
        self.update(ctx, now)
    }

    fn replace_output<D: GpuDevice>(
        &self,
        ctx: &mut TextureContext<D>,
        descriptor: &TextureDescriptor,
    ) -> Result<(), TextureError> {
        let lease = self.live_lease()?;
        if let Operation::Kernel { name, signature, .. } = &self.operation {
            if signature.output_format != descriptor.format {
                return Err(TextureError::InvalidInput(format!(
                    "kernel `{name}` writes {}, resize requested {}",
                    signature.output_format, descriptor.format
                )));
            }
        }
        let (device, arena, _) = ctx.parts();
        let current = arena.replace(device, lease, descriptor, &self.label)?;
        tracing::debug!(label = %self.label, extent = %descriptor.extent, generation = current.generation, "unit resized");
        Ok(())
    }

    /// Resize to `extent`, keeping the current format and usage.
    pub fn resize_to<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        extent: Extent2d,
        now: Instant,
    ) -> Result<(), TextureError> {
        let descriptor = self
            .live_lease()
            .ok()
            .and_then(|lease| ctx.arena().current(lease))
            .map(|c| c.descriptor.with_extent(extent))
            .ok_or_else(|| TextureError::UnitReleased(self.label.clone()))?;
        self.resize(ctx, &descriptor, now)
    }

    /// Point the unit at a new input. The output follows the input's extent.
    /// If the output cannot be reallocated the unit keeps its previous input.
    pub fn set_input<D: GpuDevice>(
        &mut self,
        ctx: &mut TextureContext<D>,
        input: InputTexture,
        now: Instant,
    ) -> Result<(), TextureError> {
        let lease = self.live_lease()?;
        if !self.operation.needs_input() {
            return Err(TextureError::InvalidInput(format!(
                "kernel `{}` takes no input texture",
                self.operation.name()
            )));
        }
        ctx.validate_input(&input.descriptor)?;
        let current = ctx
            .arena()
            .current(lease)
            .map(|c| c.descriptor)
            .ok_or_else(|| TextureError::UnitReleased(self.label.clone()))?;
        if matches!(self.operation, Operation::Blit) {
            check_blit_format(current.format, &input)?;
        }
        if current.extent != input.extent() {
            self.replace_output(ctx, &current.with_extent(input.extent()))?;
        }
        self.input = Some(input);
        self.update(ctx, now)
    }

    /// Retire the output texture. The unit cannot be updated afterwards.
    pub fn release<D: GpuDevice>(&mut self, ctx: &mut TextureContext<D>) {
        if let Some(lease) = self.lease.take() {
            let (_, arena, _) = ctx.parts();
            arena.release(lease);
            tracing::debug!(label = %self.label, "unit released");
        }
        self.state = UnitState::Released;
    }
}

/// A copy moves raw texels, so both sides must share one format.
fn check_blit_format(output: PixelFormat, input: &InputTexture) -> Result<(), TextureError> {
    if input.descriptor.format != output {
        return Err(TextureError::InvalidInput(format!(
            "blit into {output} cannot copy from a {} input",
            input.descriptor.format
        )));
    }
    Ok(())
}
