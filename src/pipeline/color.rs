//! Tone and filter steps: Brightness, Contrast, Saturation, Grayscale, Invert,
//! Solarize, Posterize, Equalize, AutoContrast, Blur, Sharpen
//!
//! Enhancement factors follow the usual convention: `1.0` leaves the image
//! unchanged, `0.0` yields black (brightness) or flat grey (contrast).

use crate::core::error::{ImageError, ImageResult};
use crate::core::image::ImageHandle;
use crate::pipeline::operation::Operation;
use image::{DynamicImage, GrayImage, Luma, Pixel, RgbaImage};

fn check_factor(operation: &str, factor: f32) -> ImageResult<()> {
    if factor.is_finite() && factor >= 0.0 {
        Ok(())
    } else {
        Err(ImageError::operation(
            operation,
            format!("factor must be a non-negative number, got {}", factor),
        ))
    }
}

/// Scales RGB channels by a factor.
#[derive(Debug, Clone)]
pub struct Brightness {
    factor: f32,
}

impl Brightness {
    /// Create the step.
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl Operation for Brightness {
    fn name(&self) -> &str {
        "brightness"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        check_factor("brightness", self.factor)?;

        let mut result = image.image().to_rgba8();
        for pixel in result.pixels_mut() {
            let channels = pixel.channels_mut();
            for c in channels.iter_mut().take(3) {
                *c = (*c as f32 * self.factor).round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Pushes RGB channels away from (or toward) the mean luminance.
#[derive(Debug, Clone)]
pub struct Contrast {
    factor: f32,
}

impl Contrast {
    /// Create the step.
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl Operation for Contrast {
    fn name(&self) -> &str {
        "contrast"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        check_factor("contrast", self.factor)?;

        let mut result = image.image().to_rgba8();
        let pixel_count = (result.width() as f64 * result.height() as f64).max(1.0);
        let luma_sum: f64 = result
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
            })
            .sum();
        let mean = (luma_sum / pixel_count) as f32;

        for pixel in result.pixels_mut() {
            let channels = pixel.channels_mut();
            for c in channels.iter_mut().take(3) {
                let v = mean + (*c as f32 - mean) * self.factor;
                *c = v.round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Moves RGB channels toward (or away from) the pixel's own luminance.
///
/// `0.0` yields grayscale, `1.0` leaves the image unchanged.
#[derive(Debug, Clone)]
pub struct Saturation {
    factor: f32,
}

impl Saturation {
    /// Create the step.
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl Operation for Saturation {
    fn name(&self) -> &str {
        "saturation"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        check_factor("saturation", self.factor)?;

        let mut result = image.image().to_rgba8();
        for pixel in result.pixels_mut() {
            let channels = pixel.channels_mut();
            let [r, g, b] = [channels[0], channels[1], channels[2]].map(|c| c as f32);
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            for c in channels.iter_mut().take(3) {
                let v = luma + (*c as f32 - luma) * self.factor;
                *c = v.round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Converts to single-channel luminance, keeping alpha when present.
#[derive(Debug, Clone)]
pub struct Grayscale;

impl Operation for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        Ok(image.with_image(image.image().grayscale()))
    }
}

/// Inverts RGB channels.
#[derive(Debug, Clone)]
pub struct Invert;

impl Operation for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let mut result = image.image().clone();
        result.invert();
        Ok(image.with_image(result))
    }
}

/// Inverts every RGB channel value at or above `threshold`.
#[derive(Debug, Clone)]
pub struct Solarize {
    threshold: u8,
}

impl Solarize {
    /// Create the step.
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl Operation for Solarize {
    fn name(&self) -> &str {
        "solarize"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let mut result = image.image().to_rgba8();
        for pixel in result.pixels_mut() {
            for c in pixel.channels_mut().iter_mut().take(3) {
                if *c >= self.threshold {
                    *c = 255 - *c;
                }
            }
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Keeps only the `bits` most significant bits of each RGB channel.
#[derive(Debug, Clone)]
pub struct Posterize {
    bits: u8,
}

impl Posterize {
    /// `bits` must be in `1..=8`.
    pub fn new(bits: u8) -> Self {
        Self { bits }
    }
}

impl Operation for Posterize {
    fn name(&self) -> &str {
        "posterize"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        if !(1..=8).contains(&self.bits) {
            return Err(ImageError::operation(
                "posterize",
                format!("bits must be between 1 and 8, got {}", self.bits),
            ));
        }

        let mask = 0xFFu8 << (8 - self.bits);
        let mut result = image.image().to_rgba8();
        for pixel in result.pixels_mut() {
            for c in pixel.channels_mut().iter_mut().take(3) {
                *c &= mask;
            }
        }

        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Run `f` over the R, G and B planes separately. Alpha is kept as is.
fn map_rgb_planes(rgba: &RgbaImage, f: impl Fn(&GrayImage) -> GrayImage) -> RgbaImage {
    let (width, height) = rgba.dimensions();
    let planes: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(width, height, |x, y| Luma([rgba.get_pixel(x, y)[c]]));
            f(&plane)
        })
        .collect();

    let mut result = rgba.clone();
    for (x, y, pixel) in result.enumerate_pixels_mut() {
        for (c, plane) in planes.iter().enumerate() {
            pixel[c] = plane.get_pixel(x, y)[0];
        }
    }
    result
}

fn histogram(plane: &GrayImage) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for p in plane.pixels() {
        counts[p[0] as usize] += 1;
    }
    counts
}

/// Flattens the histogram of each RGB channel.
///
/// A channel holding a single value is left unchanged.
#[derive(Debug, Clone)]
pub struct Equalize;

impl Operation for Equalize {
    fn name(&self) -> &str {
        "equalize"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let rgba = image.image().to_rgba8();
        let result = map_rgb_planes(&rgba, |plane| {
            let used = histogram(plane).iter().filter(|&&n| n > 0).count();
            if used < 2 {
                plane.clone()
            } else {
                imageproc::contrast::equalize_histogram(plane)
            }
        });
        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Stretches each RGB channel to the full `0..=255` range.
///
/// `cutoff` is the percentage of darkest and of lightest pixels ignored
/// when looking for the channel's range.
#[derive(Debug, Clone)]
pub struct AutoContrast {
    cutoff: f32,
}

impl AutoContrast {
    /// `cutoff` is a percentage in `[0, 50)`.
    pub fn new(cutoff: f32) -> Self {
        Self { cutoff }
    }
}

/// Lowest and highest values left after dropping `cutoff` percent of the
/// pixels from each end.
fn channel_range(counts: &[u64; 256], cutoff: f32) -> Option<(u8, u8)> {
    let total: u64 = counts.iter().sum();
    let trim = (total as f64 * cutoff as f64 / 100.0) as u64;

    let mut seen = 0;
    let lo = (0..=255u8).find(|&v| {
        seen += counts[v as usize];
        seen > trim
    })?;
    seen = 0;
    let hi = (0..=255u8).rev().find(|&v| {
        seen += counts[v as usize];
        seen > trim
    })?;
    (lo < hi).then_some((lo, hi))
}

impl Operation for AutoContrast {
    fn name(&self) -> &str {
        "auto_contrast"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        if !(self.cutoff.is_finite() && (0.0..50.0).contains(&self.cutoff)) {
            return Err(ImageError::operation(
                "auto_contrast",
                format!("cutoff must be in [0, 50), got {}", self.cutoff),
            ));
        }

        let rgba = image.image().to_rgba8();
        let result = map_rgb_planes(&rgba, |plane| {
            match channel_range(&histogram(plane), self.cutoff) {
                Some((lo, hi)) => imageproc::contrast::stretch_contrast(plane, lo, hi, 0, 255),
                None => plane.clone(),
            }
        });
        Ok(image.with_image(DynamicImage::ImageRgba8(result)))
    }
}

/// Gaussian blur.
#[derive(Debug, Clone)]
pub struct Blur {
    sigma: f32,
}

impl Blur {
    /// `sigma` is the standard deviation in pixels.
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl Operation for Blur {
    fn name(&self) -> &str {
        "blur"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(ImageError::operation(
                "blur",
                format!("sigma must be positive, got {}", self.sigma),
            ));
        }

        let rgba = image.image().to_rgba8();
        let blurred = imageproc::filter::gaussian_blur_f32(&rgba, self.sigma);
        Ok(image.with_image(DynamicImage::ImageRgba8(blurred)))
    }
}

/// Unsharp mask.
#[derive(Debug, Clone)]
pub struct Sharpen {
    sigma: f32,
    threshold: i32,
}

impl Sharpen {
    /// `threshold` is the minimum difference a pixel needs to be sharpened.
    pub fn new(sigma: f32, threshold: i32) -> Self {
        Self { sigma, threshold }
    }
}

impl Operation for Sharpen {
    fn name(&self) -> &str {
        "sharpen"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(ImageError::operation(
                "sharpen",
                format!("sigma must be positive, got {}", self.sigma),
            ));
        }

        Ok(image.with_image(image.image().unsharpen(self.sigma, self.threshold)))
    }
}
