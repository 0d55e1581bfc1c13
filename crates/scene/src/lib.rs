//! Scene glue around the texture pipeline: quads that display unit
//! outputs, the binder interface renderers implement, and YAML scene files.
//!
//! # Invariants
//! - Quads never own textures; they name a unit or a borrowed image.
//! - A quad whose unit fails to construct is omitted; the rest of the
//!   scene still assembles.
//! - Iteration order over quads is deterministic.

mod binder;
mod config;
mod error;
mod quad;
mod scene;

pub use binder::{BindingTable, SurfaceBinder, SyncReport, sync_materials};
pub use config::{
    BaseImageConfig, DEFAULT_DYNAMIC_SIZE, FeedSection, InputSource, LayoutConfig,
    MaterialConfig, QuadConfig, SceneConfig,
};
pub use error::SceneError;
pub use quad::{Quad, QuadMaterial, QuadStore, Spin, circle_layout};
pub use scene::{OmittedQuad, Scene, base_image_texels};

pub fn crate_info() -> &'static str {
    "dyntex-scene v0.1.0"
}
