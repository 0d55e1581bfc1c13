use std::collections::HashMap;

use dyntex_common::{TextureDescriptor, TextureUsages};
use dyntex_device::{CommandEncoder, GpuDevice, SubmissionIndex, TextureId};

use crate::arena::TextureArena;
use crate::error::TextureError;
use crate::material::InputTexture;
use crate::registry::ProgramRegistry;

/// How strictly input textures are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Formats outside the common set are accepted with a warning.
    #[default]
    Permissive,
    /// Formats outside the common set are rejected.
    Strict,
}

/// Services shared by every unit: the device, the texture arena, and the
/// program registry. Owned by the render thread and passed by `&mut`.
pub struct TextureContext<D: GpuDevice> {
    device: D,
    arena: TextureArena,
    registry: ProgramRegistry,
    policy: ValidationPolicy,
    /// Newest submission reading each caller-owned input texture.
    input_uses: HashMap<TextureId, SubmissionIndex>,
    /// Inputs released by their owner but still read by in-flight work.
    doomed_inputs: Vec<TextureId>,
}

impl<D: GpuDevice> TextureContext<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            arena: TextureArena::new(),
            registry: ProgramRegistry::new(),
            policy: ValidationPolicy::default(),
            input_uses: HashMap::new(),
            doomed_inputs: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn arena(&self) -> &TextureArena {
        &self.arena
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProgramRegistry {
        &mut self.registry
    }

    pub(crate) fn parts(&mut self) -> (&mut D, &mut TextureArena, &mut ProgramRegistry) {
        (&mut self.device, &mut self.arena, &mut self.registry)
    }

    /// Finish `encoder`, submit it, and stamp every texture it references,
    /// arena-owned or not, so none is destroyed while the buffer is in flight.
    pub fn submit(&mut self, encoder: CommandEncoder) -> Result<SubmissionIndex, TextureError> {
        let buffer = encoder.finish();
        let referenced = buffer.referenced_textures();
        let index = self.device.submit(buffer)?;
        for texture in referenced {
            if !self.arena.mark_used(texture, index) {
                self.input_uses.insert(texture, index);
            }
        }
        Ok(index)
    }

    /// Poll the device and destroy every retired texture whose work has
    /// completed, including released inputs. Returns how many textures were
    /// destroyed.
    pub fn collect_retired(&mut self) -> usize {
        let completed = self.device.poll();
        let mut released = self.arena.collect(&mut self.device, completed);

        let device = &mut self.device;
        let uses = &mut self.input_uses;
        self.doomed_inputs.retain(|texture| {
            let drained = match uses.get(texture) {
                None => true,
                Some(used) => completed.is_some_and(|done| *used <= done),
            };
            if drained {
                device.destroy_texture(*texture);
                uses.remove(texture);
                released += 1;
            }
            !drained
        });
        released
    }

    /// Released inputs waiting for their last reader to retire.
    pub fn pending_inputs(&self) -> usize {
        self.doomed_inputs.len()
    }

    /// Upload an externally sourced image for units to read. The caller
    /// owns the texture and frees it with [`TextureContext::destroy_input`].
    pub fn upload_input(
        &mut self,
        descriptor: &TextureDescriptor,
        texels: &[u8],
        label: &str,
    ) -> Result<InputTexture, TextureError> {
        let descriptor = TextureDescriptor {
            usage: descriptor.usage | TextureUsages::SHADER_READ | TextureUsages::COPY_DST,
            ..*descriptor
        };
        self.validate_input(&descriptor)?;
        let texture = self
            .device
            .create_texture(&descriptor, label)
            .map_err(TextureError::AllocationFailed)?;
        if let Err(err) = self.device.write_texture(texture, texels) {
            self.device.destroy_texture(texture);
            return Err(TextureError::InvalidInput(err.to_string()));
        }
        Ok(InputTexture {
            texture,
            descriptor,
        })
    }

    /// Release an uploaded input. A texture no submission has read is
    /// destroyed now; otherwise [`TextureContext::collect_retired`] destroys
    /// it once the last submission reading it has retired.
    pub fn destroy_input(&mut self, input: InputTexture) {
        if self.arena.owns(input.texture) {
            return;
        }
        if self.input_uses.contains_key(&input.texture) {
            if !self.doomed_inputs.contains(&input.texture) {
                self.doomed_inputs.push(input.texture);
            }
        } else {
            self.device.destroy_texture(input.texture);
        }
    }

    /// Check an input texture against the device and the validation policy.
    pub fn validate_input(&self, descriptor: &TextureDescriptor) -> Result<(), TextureError> {
        descriptor
            .validate()
            .map_err(|e| TextureError::InvalidInput(e.to_string()))?;
        if !self
            .device
            .supports_format(descriptor.format, TextureUsages::SHADER_READ)
        {
            return Err(TextureError::InvalidInput(format!(
                "pixel format {} cannot be sampled on {}",
                descriptor.format,
                self.device.backend()
            )));
        }
        if !descriptor.format.is_common() {
            match self.policy {
                ValidationPolicy::Permissive => {
                    tracing::warn!(format = %descriptor.format, "input texture uses a non-standard pixel format");
                }
                ValidationPolicy::Strict => {
                    return Err(TextureError::InvalidInput(format!(
                        "pixel format {} is not allowed under strict validation",
                        descriptor.format
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntex_common::{Extent2d, PixelFormat};
    use dyntex_device::SoftwareDevice;

    fn input_desc(w: u32, h: u32, format: PixelFormat) -> TextureDescriptor {
        TextureDescriptor {
            extent: Extent2d::new(w, h),
            format,
            usage: TextureUsages::SHADER_READ,
        }
    }

    #[test]
    fn zero_extent_input_rejected() {
        let ctx = TextureContext::new(SoftwareDevice::new());
        assert!(matches!(
            ctx.validate_input(&input_desc(0, 4, PixelFormat::Rgba8Unorm)),
            Err(TextureError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_standard_format_depends_on_policy() {
        let desc = input_desc(4, 4, PixelFormat::Rgba16Float);
        let permissive = TextureContext::new(SoftwareDevice::new());
        assert!(permissive.validate_input(&desc).is_ok());

        let strict = TextureContext::new(SoftwareDevice::new()).with_policy(ValidationPolicy::Strict);
        assert!(matches!(
            strict.validate_input(&desc),
            Err(TextureError::InvalidInput(_))
        ));
    }

    #[test]
    fn upload_checks_texel_count() {
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let desc = input_desc(2, 2, PixelFormat::Rgba8Unorm);
        assert!(ctx.upload_input(&desc, &[0; 3], "bad").is_err());
        assert_eq!(ctx.device().live_textures(), 0);

        let input = ctx.upload_input(&desc, &[9; 16], "base").unwrap();
        assert_eq!(ctx.device().texels(input.texture), Some(&[9u8; 16][..]));
        ctx.destroy_input(input);
        assert_eq!(ctx.device().live_textures(), 0);
    }

    #[test]
    fn destroyed_input_waits_for_its_reader() {
        let mut ctx = TextureContext::new(SoftwareDevice::new());
        let input = ctx
            .upload_input(&input_desc(4, 4, PixelFormat::Rgba8Unorm), &[200; 64], "base")
            .unwrap();
        let out = ctx.device_mut().create_texture(&TextureDescriptor::dynamic(4, 4, PixelFormat::Rgba8Unorm), "out").unwrap();
        let mut encoder = ctx.device_mut().create_encoder("blit").unwrap();
        encoder.copy(input.texture, out, Extent2d::new(4, 4));
        ctx.submit(encoder).unwrap();

        ctx.destroy_input(input);
        assert_eq!(ctx.pending_inputs(), 1);
        assert!(ctx.device().texels(input.texture).is_some());

        assert_eq!(ctx.collect_retired(), 1);
        assert_eq!(ctx.pending_inputs(), 0);
        assert!(ctx.device().texels(input.texture).is_none());
        // The copy ran before the input went away.
        assert_eq!(ctx.device().texels(out), Some(&[200u8; 64][..]));
    }
}
