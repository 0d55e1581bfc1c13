use std::path::Path;

use dyntex_common::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// A scene description loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub base_image: BaseImageConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedSection>,
    #[serde(default)]
    pub layout: LayoutConfig,
    pub quads: Vec<QuadConfig>,
}

/// Extent of the procedurally generated base image transforms read from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseImageConfig {
    pub width: u32,
    pub height: u32,
}

/// The simulated resizing input consumed by `input: feed` quads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSection {
    pub kernel: String,
    pub period_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Radius of the circle quads are placed on.
    pub radius: f32,
    pub quad_scale: f32,
    /// Tilt of the whole arrangement about the x axis, radians.
    pub tilt: f32,
    /// Spin of each quad, radians per second, about `spin_axis`.
    pub spin_speed: f32,
    pub spin_axis: [f32; 3],
    /// Spin of the whole arrangement about the z axis.
    pub root_spin_speed: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            quad_scale: 0.4,
            tilt: -0.5,
            spin_speed: 0.2,
            spin_axis: [0.05, 0.0, 1.0],
            root_spin_speed: -0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadConfig {
    pub label: String,
    /// Overrides the circle layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f32; 3]>,
    pub material: MaterialConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialConfig {
    Color {
        rgba: [f32; 4],
    },
    /// The base image, unmodified.
    Image,
    Dynamic {
        kernel: String,
        /// Defaults to the input's width, or 100 without input.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default = "default_format")]
        format: PixelFormat,
        #[serde(default)]
        input: InputSource,
        /// Update on a fixed period instead of every frame.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tick_period_ms: Option<u64>,
    },
}

fn default_format() -> PixelFormat {
    PixelFormat::Rgba8Unorm
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    #[default]
    None,
    Base,
    Feed,
}

/// Size of a dynamic texture without an input to follow.
pub const DEFAULT_DYNAMIC_SIZE: u32 = 100;

impl SceneConfig {
    pub fn from_yaml(text: &str) -> Result<Self, SceneError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, SceneError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Structural checks. Per-unit failures (unknown kernels, bad formats)
    /// are left to scene assembly, which omits the affected quad.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.base_image.width == 0 || self.base_image.height == 0 {
            return Err(SceneError::Invalid("base image has a zero dimension".into()));
        }
        if let Some(feed) = &self.feed {
            if feed.period_ms == 0 {
                return Err(SceneError::Invalid("feed period must be positive".into()));
            }
        }
        for quad in &self.quads {
            let MaterialConfig::Dynamic {
                kernel,
                input,
                tick_period_ms,
                ..
            } = &quad.material
            else {
                continue;
            };
            if kernel.is_empty() {
                return Err(SceneError::Invalid(format!("quad `{}` has no kernel", quad.label)));
            }
            if *input == InputSource::Feed && self.feed.is_none() {
                return Err(SceneError::Invalid(format!(
                    "quad `{}` reads the feed but no feed is configured",
                    quad.label
                )));
            }
            if *tick_period_ms == Some(0) {
                return Err(SceneError::Invalid(format!(
                    "quad `{}` has a zero tick period",
                    quad.label
                )));
            }
        }
        Ok(())
    }

    /// A flat quad, the base image, a procedural texture, a wave over the
    /// base image, and a wave and a blit over the resizing feed.
    pub fn demo() -> Self {
        let dynamic = |kernel: &str, input, size: Option<u32>| MaterialConfig::Dynamic {
            kernel: kernel.into(),
            width: size,
            height: size,
            format: PixelFormat::Rgba8Unorm,
            input,
            tick_period_ms: None,
        };
        Self {
            base_image: BaseImageConfig {
                width: 512,
                height: 512,
            },
            feed: Some(FeedSection {
                kernel: "simulate_masking".into(),
                period_ms: 200,
            }),
            layout: LayoutConfig::default(),
            quads: vec![
                QuadConfig {
                    label: "Simple Material".into(),
                    position: None,
                    material: MaterialConfig::Color {
                        rgba: [0.0, 1.0, 0.0, 1.0],
                    },
                },
                QuadConfig {
                    label: "Textured Quad".into(),
                    position: None,
                    material: MaterialConfig::Image,
                },
                QuadConfig {
                    label: "Dynamic Texture".into(),
                    position: None,
                    material: dynamic(
                        "color_circles",
                        InputSource::None,
                        Some(DEFAULT_DYNAMIC_SIZE),
                    ),
                },
                QuadConfig {
                    label: "Wavy Texture Quad".into(),
                    position: None,
                    material: dynamic("wavy_transparency", InputSource::Base, None),
                },
                QuadConfig {
                    label: "Updatable Texture Quad".into(),
                    position: None,
                    material: dynamic("wavy_transparency", InputSource::Feed, None),
                },
                QuadConfig {
                    label: "Blit Texture Quad".into(),
                    position: None,
                    material: dynamic("blit", InputSource::Feed, None),
                },
            ],
        }
    }
}
