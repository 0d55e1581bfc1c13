use dyntex_core::TextureError;
use dyntex_scheduler::SchedulerError;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scene YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid scene: {0}")]
    Invalid(String),
    #[error("texture error: {0}")]
    Texture(#[from] TextureError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
