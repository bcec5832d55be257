//! Fixed 3x3 kernel filters: EdgeEnhance, Emboss, FindEdges

use crate::core::error::ImageResult;
use crate::core::image::ImageHandle;
use crate::pipeline::operation::Operation;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

/// Correlate the RGB channels with `kernel`, then scale by `1 / divisor`
/// and add `offset`. Edges are padded by continuity; alpha is untouched.
fn convolve3x3(image: &ImageHandle, kernel: &[f32; 9], divisor: f32, offset: f32) -> ImageHandle {
    let rgb: RgbImage = image.image().to_rgb8();
    let filtered: ImageBuffer<Rgb<f32>, Vec<f32>> =
        imageproc::filter::filter3x3::<_, f32, f32>(&rgb, kernel);

    let mut rgba = image.image().to_rgba8();
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let sums = filtered.get_pixel(x, y);
        for c in 0..3 {
            pixel[c] = (sums[c] / divisor + offset).round().clamp(0.0, 255.0) as u8;
        }
    }
    image.with_image(DynamicImage::ImageRgba8(rgba))
}

/// Boosts local detail around edges.
#[derive(Debug, Clone)]
pub struct EdgeEnhance;

impl Operation for EdgeEnhance {
    fn name(&self) -> &str {
        "edge_enhance"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let kernel = [-1.0, -1.0, -1.0, -1.0, 10.0, -1.0, -1.0, -1.0, -1.0];
        Ok(convolve3x3(image, &kernel, 2.0, 0.0))
    }
}

/// Relief effect: flat areas become mid grey, diagonal edges light or dark.
#[derive(Debug, Clone)]
pub struct Emboss;

impl Operation for Emboss {
    fn name(&self) -> &str {
        "emboss"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let kernel = [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        Ok(convolve3x3(image, &kernel, 1.0, 128.0))
    }
}

/// Laplacian edge map: flat areas become black.
#[derive(Debug, Clone)]
pub struct FindEdges;

impl Operation for FindEdges {
    fn name(&self) -> &str {
        "find_edges"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let kernel = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];
        Ok(convolve3x3(image, &kernel, 1.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn filled(pixel: [u8; 4]) -> ImageHandle {
        ImageHandle::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 5, Rgba(pixel))))
    }

    /// Black image with a white centre pixel.
    fn dot() -> ImageHandle {
        let mut buf = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 255]));
        buf.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        ImageHandle::new(DynamicImage::ImageRgba8(buf))
    }

    #[test]
    fn test_flat_regions() {
        let flat = filled([90, 60, 30, 200]);

        let edges = FindEdges.apply(&flat).unwrap();
        assert_eq!(edges.image().get_pixel(2, 2), Rgba([0, 0, 0, 200]));

        let embossed = Emboss.apply(&flat).unwrap();
        assert_eq!(embossed.image().get_pixel(0, 0), Rgba([128, 128, 128, 200]));

        let enhanced = EdgeEnhance.apply(&flat).unwrap();
        assert_eq!(enhanced.image().get_pixel(4, 4), Rgba([90, 60, 30, 200]));
    }

    #[test]
    fn test_find_edges_marks_the_dot() {
        let edges = FindEdges.apply(&dot()).unwrap();
        assert_eq!(edges.image().get_pixel(2, 2), Rgba([255, 255, 255, 255]));
        assert_eq!(edges.image().get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(edges.dimensions(), (5, 5));
    }

    #[test]
    fn test_emboss_is_directional() {
        let embossed = Emboss.apply(&dot()).unwrap();
        // Lit from the top left: the dot itself brightens, its lower right
        // neighbour darkens.
        assert_eq!(embossed.image().get_pixel(2, 2)[0], 255);
        assert_eq!(embossed.image().get_pixel(3, 3)[0], 0);
    }
}
