use dyntex_common::{PixelFormat, TextureDescriptor, TextureUsages};

use crate::command::{CommandBuffer, CommandEncoder, SubmissionIndex, TextureId};
use crate::error::DeviceError;
use crate::kernel::CompiledKernel;

/// Device + submission queue interface.
///
/// All methods are called from the single render-affine thread that owns
/// the pipeline; implementations need no internal locking for CPU state.
pub trait GpuDevice {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    fn supports_format(&self, format: PixelFormat, usage: TextureUsages) -> bool;

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        label: &str,
    ) -> Result<TextureId, DeviceError>;

    /// Replace a texture's contents with tightly packed texels.
    fn write_texture(&mut self, texture: TextureId, texels: &[u8]) -> Result<(), DeviceError>;

    /// Free a texture. Callers guarantee no pending submission references it.
    fn destroy_texture(&mut self, texture: TextureId);

    /// Compile the named kernel from the backend's kernel library.
    fn compile_kernel(&mut self, name: &str) -> Result<CompiledKernel, DeviceError>;

    fn create_encoder(&mut self, label: &str) -> Result<CommandEncoder, DeviceError> {
        Ok(CommandEncoder::new(label))
    }

    /// Queue a command buffer. Work retires asynchronously.
    fn submit(&mut self, commands: CommandBuffer) -> Result<SubmissionIndex, DeviceError>;

    /// Make progress on queued work and return the newest retired submission.
    fn poll(&mut self) -> Option<SubmissionIndex>;
}
