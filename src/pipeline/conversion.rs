//! Format conversion step.

use crate::core::error::ImageResult;
use crate::core::image::ImageHandle;
use crate::core::types::{ImageFormat, Quality};
use crate::pipeline::operation::Operation;

/// Sets the encoding the image will be saved with.
///
/// Pixels are untouched here; channels the target cannot hold are dropped
/// when the handle is saved.
#[derive(Debug, Clone)]
pub struct Convert {
    format: ImageFormat,
    quality: Quality,
}

impl Convert {
    /// Create the step.
    pub fn new(format: ImageFormat, quality: Quality) -> Self {
        Self { format, quality }
    }
}

impl Operation for Convert {
    fn name(&self) -> &str {
        "convert"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        Ok(image.with_encoding(self.format, self.quality))
    }
}
