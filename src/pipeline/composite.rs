//! Compositing steps: image watermark.

use crate::core::error::{ImageError, ImageResult};
use crate::core::image::ImageHandle;
use crate::core::types::Position;
use crate::pipeline::operation::Operation;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;

/// Oversized marks are shrunk to this fraction of the largest fitting size.
const OVERSIZE_SCALE: f64 = 0.8;

/// Watermark parameters.
#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    /// Image placed over the input.
    pub mark: ImageHandle,
    /// Where the mark goes.
    pub position: Position,
    /// 0.0 is invisible, 1.0 keeps the mark's own alpha.
    pub opacity: f32,
    /// Distance from the edges for corner positions.
    pub padding: u32,
}

impl WatermarkOptions {
    /// Centered, half-transparent mark with 10px padding.
    pub fn new(mark: ImageHandle) -> Self {
        Self {
            mark,
            position: Position::Center,
            opacity: 0.5,
            padding: 10,
        }
    }

    /// Load the mark from disk.
    pub fn from_path(path: impl AsRef<Path>) -> ImageResult<Self> {
        Ok(Self::new(ImageHandle::load(path)?))
    }

    /// Set the anchor.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set the opacity, `0.0..=1.0`.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set the edge distance in pixels.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }
}

/// Alpha-composites a mark image over the input.
#[derive(Debug, Clone)]
pub struct Watermark {
    options: WatermarkOptions,
}

impl Watermark {
    /// Create the step.
    pub fn new(options: WatermarkOptions) -> Self {
        Self { options }
    }

    /// Mark pixels after opacity and oversize scaling for a `base` canvas.
    fn prepared_mark(&self, base: (u32, u32)) -> RgbaImage {
        let mut mark = self.options.mark.image().to_rgba8();
        let (mw, mh) = mark.dimensions();

        if mw > base.0 || mh > base.1 {
            let ratio = (base.0 as f64 / mw as f64).min(base.1 as f64 / mh as f64) * OVERSIZE_SCALE;
            let w = ((mw as f64 * ratio) as u32).max(1);
            let h = ((mh as f64 * ratio) as u32).max(1);
            mark = image::imageops::resize(&mark, w, h, FilterType::Lanczos3);
        }

        if self.options.opacity < 1.0 {
            for pixel in mark.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * self.options.opacity).round() as u8;
            }
        }

        mark
    }
}

impl Operation for Watermark {
    fn name(&self) -> &str {
        "watermark"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let opacity = self.options.opacity;
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ImageError::operation(
                "watermark",
                format!("opacity must be within 0.0..=1.0, got {}", opacity),
            ));
        }

        let mut result = image.image().to_rgba8();
        let base = result.dimensions();
        let mark = self.prepared_mark(base);
        let (x, y) = self
            .options
            .position
            .origin(base, mark.dimensions(), self.options.padding);

        for (mx, my, overlay_pixel) in mark.enumerate_pixels() {
            let bx = x + mx as i64;
            let by = y + my as i64;
            if bx >= base.0 as i64 || by >= base.1 as i64 {
                continue;
            }

            let (bx, by) = (bx as u32, by as u32);
            let base_pixel = *result.get_pixel(bx, by);
            result.put_pixel(bx, by, composite_over(base_pixel, *overlay_pixel));
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Porter-Duff "over" for straight-alpha RGBA.
fn composite_over(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    let src_a = overlay[3] as f32 / 255.0;
    let dst_a = base[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let v = (overlay[i] as f32 * src_a + base[i] as f32 * dst_a * (1.0 - src_a)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
