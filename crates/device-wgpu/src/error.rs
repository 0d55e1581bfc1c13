/// Failures bringing up a wgpu device.
#[derive(Debug, thiserror::Error)]
pub enum WgpuInitError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}
