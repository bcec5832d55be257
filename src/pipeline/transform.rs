//! Geometric steps: Resize, Crop, Rotate, Flip

use crate::core::error::{ImageError, ImageResult};
use crate::core::image::ImageHandle;
use crate::core::types::Color;
use crate::pipeline::operation::Operation;
use image::imageops::FilterType;
use image::DynamicImage;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::{Deserialize, Serialize};

/// Resampling filter used when resizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    /// Fastest, blocky.
    Nearest,
    /// Bilinear.
    Triangle,
    /// Cubic.
    CatmullRom,
    /// Gaussian.
    Gaussian,
    /// Sharpest, slowest.
    #[default]
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Resize parameters.
///
/// With `maintain_aspect` and a single side given, the other side follows the
/// source ratio. With both sides given the image is fitted inside the box.
/// Without `maintain_aspect` a missing side keeps its source length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResizeOptions {
    /// Target width.
    pub width: Option<u32>,
    /// Target height.
    pub height: Option<u32>,
    /// Keep the source ratio.
    pub maintain_aspect: bool,
    /// Resampling filter.
    pub filter: ResampleFilter,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            maintain_aspect: true,
            filter: ResampleFilter::default(),
        }
    }
}

impl ResizeOptions {
    /// Scale to a target width, keeping the aspect ratio.
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    /// Scale to a target height, keeping the aspect ratio.
    pub fn height(height: u32) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }

    /// Fit inside a box, keeping the aspect ratio.
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Stretch to exactly these dimensions.
    pub fn exact(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            maintain_aspect: false,
            ..Self::default()
        }
    }

    /// Set the resampling filter.
    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Compute output dimensions for a source of `(src_width, src_height)`.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> ImageResult<(u32, u32)> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ImageError::operation("resize", "target dimensions must be at least 1"));
        }

        let (sw, sh) = (src_width as f64, src_height as f64);
        let (w, h) = match (self.width, self.height, self.maintain_aspect) {
            (None, None, _) => {
                return Err(ImageError::operation(
                    "resize",
                    "at least one of width or height must be specified",
                ))
            }
            (Some(w), None, true) => (w, (sh * w as f64 / sw) as u32),
            (None, Some(h), true) => ((sw * h as f64 / sh) as u32, h),
            (Some(w), Some(h), true) => {
                let ratio = (w as f64 / sw).min(h as f64 / sh);
                ((sw * ratio) as u32, (sh * ratio) as u32)
            }
            (w, h, false) => (w.unwrap_or(src_width), h.unwrap_or(src_height)),
        };

        Ok((w.max(1), h.max(1)))
    }
}

/// Resizes an image.
#[derive(Debug, Clone)]
pub struct Resize {
    options: ResizeOptions,
}

impl Resize {
    /// Create the step.
    pub fn new(options: ResizeOptions) -> Self {
        Self { options }
    }
}

impl Operation for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let (src_width, src_height) = image.dimensions();
        let (width, height) = self.options.target_dimensions(src_width, src_height)?;

        if (width, height) == (src_width, src_height) {
            return Ok(image.clone());
        }

        let resized = image
            .image()
            .resize_exact(width, height, self.options.filter.into());
        Ok(image.with_image(resized))
    }
}

/// Crop rectangle as `(left, top)` inclusive to `(right, bottom)` exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CropRect {
    /// First column.
    pub left: u32,
    /// First row.
    pub top: u32,
    /// Column after the last.
    pub right: u32,
    /// Row after the last.
    pub bottom: u32,
}

impl CropRect {
    /// Create a rectangle from its edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width in pixels; zero when empty.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in pixels; zero when empty.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Crops an image. Rectangles that are empty or leave the image are rejected.
#[derive(Debug, Clone)]
pub struct Crop {
    rect: CropRect,
}

impl Crop {
    /// Create the step.
    pub fn new(rect: CropRect) -> Self {
        Self { rect }
    }
}

impl Operation for Crop {
    fn name(&self) -> &str {
        "crop"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let rect = self.rect;
        let (src_width, src_height) = image.dimensions();

        if rect.width() == 0 || rect.height() == 0 {
            return Err(ImageError::operation(
                "crop",
                format!(
                    "empty rectangle ({}, {}) to ({}, {})",
                    rect.left, rect.top, rect.right, rect.bottom
                ),
            ));
        }
        if rect.right > src_width || rect.bottom > src_height {
            return Err(ImageError::operation(
                "crop",
                format!(
                    "rectangle ({}, {}) to ({}, {}) is outside image bounds ({}x{})",
                    rect.left, rect.top, rect.right, rect.bottom, src_width, src_height
                ),
            ));
        }

        let cropped = image
            .image()
            .crop_imm(rect.left, rect.top, rect.width(), rect.height());
        Ok(image.with_image(cropped))
    }
}

/// Rotation parameters. Degrees are counter-clockwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotateOptions {
    /// Angle in degrees.
    pub degrees: f32,
    /// Fill for corners uncovered by non right-angle rotations.
    pub fill: Color,
}

impl Default for RotateOptions {
    fn default() -> Self {
        Self {
            degrees: 90.0,
            fill: Color::TRANSPARENT,
        }
    }
}

impl RotateOptions {
    /// Rotate by `degrees` with a transparent fill.
    pub fn degrees(degrees: f32) -> Self {
        Self {
            degrees,
            ..Self::default()
        }
    }
}

/// Rotates an image.
///
/// Right angles are exact and swap dimensions where needed; other angles
/// rotate about the centre and keep the canvas size.
#[derive(Debug, Clone)]
pub struct Rotate {
    options: RotateOptions,
}

impl Rotate {
    /// Create the step.
    pub fn new(options: RotateOptions) -> Self {
        Self { options }
    }
}

impl Operation for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let degrees = self.options.degrees;
        if !degrees.is_finite() {
            return Err(ImageError::operation("rotate", format!("invalid angle {}", degrees)));
        }

        let normalized = degrees.rem_euclid(360.0);
        let src = image.image();
        let rotated = match normalized {
            d if d == 0.0 => return Ok(image.clone()),
            d if d == 90.0 => src.rotate270(),
            d if d == 180.0 => src.rotate180(),
            d if d == 270.0 => src.rotate90(),
            d => {
                let rgba = src.to_rgba8();
                // imageproc rotates clockwise for positive angles.
                let theta = -d.to_radians();
                DynamicImage::ImageRgba8(rotate_about_center(
                    &rgba,
                    theta,
                    Interpolation::Bicubic,
                    self.options.fill.to_rgba(),
                ))
            }
        };

        Ok(image.with_image(rotated))
    }
}

/// Flip axes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FlipOptions {
    /// Mirror left to right.
    pub horizontal: bool,
    /// Mirror top to bottom.
    pub vertical: bool,
}

impl FlipOptions {
    /// Only a horizontal flip.
    pub fn horizontal() -> Self {
        Self {
            horizontal: true,
            vertical: false,
        }
    }

    /// Only a vertical flip.
    pub fn vertical() -> Self {
        Self {
            horizontal: false,
            vertical: true,
        }
    }
}

/// Flips an image.
#[derive(Debug, Clone)]
pub struct Flip {
    options: FlipOptions,
}

impl Flip {
    /// Create the step.
    pub fn new(options: FlipOptions) -> Self {
        Self { options }
    }
}

impl Operation for Flip {
    fn name(&self) -> &str {
        "flip"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let FlipOptions { horizontal, vertical } = self.options;
        if !horizontal && !vertical {
            return Err(ImageError::operation(
                "flip",
                "at least one of horizontal or vertical must be set",
            ));
        }

        let mut result = image.image().clone();
        if horizontal {
            result = result.fliph();
        }
        if vertical {
            result = result.flipv();
        }

        Ok(image.with_image(result))
    }
}
