//! Declarative pipeline steps.
//!
//! Steps are written as a tagged list, e.g. in TOML:
//!
//! ```toml
//! [[pipeline]]
//! op = "resize"
//! width = 800
//!
//! [[pipeline]]
//! op = "watermark"
//! path = "logo.png"
//! position = "bottom_right"
//! ```

use crate::core::error::{ConfigError, ImageError};
use crate::core::types::{Color, ImageFormat, Position, Quality};
use crate::pipeline::composite::WatermarkOptions;
use crate::pipeline::operation::OperationPipeline;
use crate::pipeline::transform::{CropRect, FlipOptions, ResizeOptions, RotateOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_opacity() -> f32 {
    0.5
}

fn default_padding() -> u32 {
    10
}

fn default_sharpen_sigma() -> f32 {
    1.0
}

fn default_solarize_threshold() -> u8 {
    128
}

fn default_posterize_bits() -> u8 {
    4
}

/// One pipeline step as it appears in a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepConfig {
    /// Resize, see [`ResizeOptions`].
    Resize(ResizeOptions),
    /// Crop to a rectangle.
    Crop(CropRect),
    /// Rotate counter-clockwise.
    Rotate {
        /// Angle in degrees.
        degrees: f32,
        /// Hex fill for uncovered corners; transparent when absent.
        #[serde(default)]
        fill: Option<String>,
    },
    /// Mirror on one or both axes.
    Flip(FlipOptions),
    /// Scale brightness.
    Brightness {
        /// `1.0` leaves the image unchanged.
        factor: f32,
    },
    /// Scale contrast around the mean.
    Contrast {
        /// `1.0` leaves the image unchanged.
        factor: f32,
    },
    /// Scale colour saturation. Also accepted as `adjust_color`.
    #[serde(alias = "adjust_color")]
    Saturation {
        /// `0.0` is grayscale, `1.0` unchanged.
        factor: f32,
    },
    /// Convert to luminance.
    Grayscale,
    /// Invert colours.
    Invert,
    /// Invert values at or above a threshold.
    Solarize {
        /// Defaults to 128.
        #[serde(default = "default_solarize_threshold")]
        threshold: u8,
    },
    /// Reduce each channel to a few bits.
    Posterize {
        /// Bits kept per channel, 1 to 8. Defaults to 4.
        #[serde(default = "default_posterize_bits")]
        bits: u8,
    },
    /// Equalize each channel's histogram.
    Equalize,
    /// Stretch each channel to the full range.
    AutoContrast {
        /// Percent of pixels ignored at each end.
        #[serde(default)]
        cutoff: f32,
    },
    /// Gaussian blur.
    Blur {
        /// Standard deviation in pixels.
        sigma: f32,
    },
    /// Unsharp mask.
    Sharpen {
        /// Standard deviation in pixels. Defaults to 1.
        #[serde(default = "default_sharpen_sigma")]
        sigma: f32,
        /// Minimum difference to sharpen.
        #[serde(default)]
        threshold: i32,
    },
    /// Boost detail around edges.
    EdgeEnhance,
    /// Relief effect.
    Emboss,
    /// Edge map.
    FindEdges,
    /// Overlay an image file.
    Watermark {
        /// Mark image to load.
        path: PathBuf,
        /// Anchor.
        #[serde(default)]
        position: Position,
        /// Defaults to 0.5.
        #[serde(default = "default_opacity")]
        opacity: f32,
        /// Defaults to 10 pixels.
        #[serde(default = "default_padding")]
        padding: u32,
    },
    /// Set the output encoding.
    Convert {
        /// Format name, e.g. `png`.
        format: String,
        /// Encoder quality.
        #[serde(default)]
        quality: Quality,
    },
}

impl StepConfig {
    /// Append this step to `pipeline`.
    ///
    /// Watermark images are loaded here, once, rather than per batch item.
    pub fn append_to(&self, pipeline: OperationPipeline) -> Result<OperationPipeline, ConfigError> {
        let pipeline = match self {
            StepConfig::Resize(options) => pipeline.resize(*options),
            StepConfig::Crop(rect) => pipeline.crop(*rect),
            StepConfig::Rotate { degrees, fill } => {
                let fill = match fill {
                    Some(hex) => Color::from_hex(hex).map_err(|message| ConfigError::InvalidValue {
                        key: "rotate.fill".to_string(),
                        message,
                    })?,
                    None => Color::TRANSPARENT,
                };
                pipeline.rotate(RotateOptions {
                    degrees: *degrees,
                    fill,
                })
            }
            StepConfig::Flip(options) => pipeline.flip(*options),
            StepConfig::Brightness { factor } => pipeline.brightness(*factor),
            StepConfig::Contrast { factor } => pipeline.contrast(*factor),
            StepConfig::Saturation { factor } => pipeline.saturation(*factor),
            StepConfig::Grayscale => pipeline.grayscale(),
            StepConfig::Invert => pipeline.invert(),
            StepConfig::Solarize { threshold } => pipeline.solarize(*threshold),
            StepConfig::Posterize { bits } => pipeline.posterize(*bits),
            StepConfig::Equalize => pipeline.equalize(),
            StepConfig::AutoContrast { cutoff } => pipeline.auto_contrast(*cutoff),
            StepConfig::Blur { sigma } => pipeline.blur(*sigma),
            StepConfig::Sharpen { sigma, threshold } => pipeline.sharpen(*sigma, *threshold),
            StepConfig::EdgeEnhance => pipeline.edge_enhance(),
            StepConfig::Emboss => pipeline.emboss(),
            StepConfig::FindEdges => pipeline.find_edges(),
            StepConfig::Watermark {
                path,
                position,
                opacity,
                padding,
            } => {
                let options = WatermarkOptions::from_path(path)
                    .map_err(|e: ImageError| ConfigError::InvalidValue {
                        key: "watermark.path".to_string(),
                        message: e.to_string(),
                    })?
                    .with_position(*position)
                    .with_opacity(*opacity)
                    .with_padding(*padding);
                pipeline.watermark(options)
            }
            StepConfig::Convert { format, quality } => {
                let format: ImageFormat = format.parse()?;
                pipeline.convert(format, *quality)
            }
        };
        Ok(pipeline)
    }
}

/// Build a pipeline from step configs, in order.
pub fn build_pipeline(steps: &[StepConfig]) -> Result<OperationPipeline, ConfigError> {
    steps
        .iter()
        .try_fold(OperationPipeline::new(), |pipeline, step| step.append_to(pipeline))
}
