//! The operation seam and the ordered pipeline built on top of it.

use crate::core::error::ImageResult;
use crate::core::image::ImageHandle;
use crate::core::types::{ImageFormat, Quality};
use crate::pipeline::color::{
    AutoContrast, Blur, Brightness, Contrast, Equalize, Grayscale, Invert, Posterize, Saturation,
    Sharpen, Solarize,
};
use crate::pipeline::composite::{Watermark, WatermarkOptions};
use crate::pipeline::conversion::Convert;
use crate::pipeline::filter::{EdgeEnhance, Emboss, FindEdges};
use crate::pipeline::transform::{
    Crop, CropRect, Flip, FlipOptions, Resize, ResizeOptions, Rotate, RotateOptions,
};
use std::fmt;
use std::sync::Arc;

/// A transform from one image to a new one.
///
/// Implementations must not mutate shared state: the batch processor calls
/// the same operation from several worker threads at once.
pub trait Operation: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Produce a new image from `image`.
    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle>;
}

/// Operation shared between work items and threads.
pub type SharedOperation = Arc<dyn Operation>;

impl<T: Operation + ?Sized> Operation for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        (**self).apply(image)
    }
}

impl<T: Operation + ?Sized> Operation for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        (**self).apply(image)
    }
}

/// An operation backed by a closure.
pub struct FnOperation<F> {
    name: String,
    func: F,
}

impl<F> Operation for FnOperation<F>
where
    F: Fn(&ImageHandle) -> ImageResult<ImageHandle> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        (self.func)(image)
    }
}

/// Wrap a closure as a named [`Operation`].
pub fn operation_fn<F>(name: impl Into<String>, func: F) -> FnOperation<F>
where
    F: Fn(&ImageHandle) -> ImageResult<ImageHandle> + Send + Sync,
{
    FnOperation {
        name: name.into(),
        func,
    }
}

/// An ordered chain of operations applied left to right.
///
/// Each builder call returns a new pipeline; the steps themselves are shared,
/// so cloning a pipeline is cheap.
///
/// ```rust,ignore
/// let pipeline = OperationPipeline::new()
///     .resize(ResizeOptions::width(800))
///     .grayscale()
///     .convert(ImageFormat::WebP, Quality::default());
/// ```
#[derive(Clone, Default)]
pub struct OperationPipeline {
    steps: Vec<SharedOperation>,
}

impl OperationPipeline {
    /// Create an empty pipeline. Applying it returns the input unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any operation.
    pub fn then<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.steps.push(Arc::new(operation));
        self
    }

    /// Append an already shared operation.
    pub fn then_shared(mut self, operation: SharedOperation) -> Self {
        self.steps.push(operation);
        self
    }

    /// Append a closure step.
    pub fn map<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ImageHandle) -> ImageResult<ImageHandle> + Send + Sync + 'static,
    {
        self.then(operation_fn(name, func))
    }

    /// Append a resize.
    pub fn resize(self, options: ResizeOptions) -> Self {
        self.then(Resize::new(options))
    }

    /// Append a crop.
    pub fn crop(self, rect: CropRect) -> Self {
        self.then(Crop::new(rect))
    }

    /// Append a rotation.
    pub fn rotate(self, options: RotateOptions) -> Self {
        self.then(Rotate::new(options))
    }

    /// Append a flip.
    pub fn flip(self, options: FlipOptions) -> Self {
        self.then(Flip::new(options))
    }

    /// Scale brightness; `1.0` is unchanged.
    pub fn brightness(self, factor: f32) -> Self {
        self.then(Brightness::new(factor))
    }

    /// Scale contrast; `1.0` is unchanged.
    pub fn contrast(self, factor: f32) -> Self {
        self.then(Contrast::new(factor))
    }

    /// Scale colour saturation; `0.0` is grayscale.
    pub fn saturation(self, factor: f32) -> Self {
        self.then(Saturation::new(factor))
    }

    /// Convert to luminance.
    pub fn grayscale(self) -> Self {
        self.then(Grayscale)
    }

    /// Invert colours.
    pub fn invert(self) -> Self {
        self.then(Invert)
    }

    /// Invert channel values at or above `threshold`.
    pub fn solarize(self, threshold: u8) -> Self {
        self.then(Solarize::new(threshold))
    }

    /// Keep `bits` bits per channel.
    pub fn posterize(self, bits: u8) -> Self {
        self.then(Posterize::new(bits))
    }

    /// Equalize each channel's histogram.
    pub fn equalize(self) -> Self {
        self.then(Equalize)
    }

    /// Stretch each channel to the full range, ignoring `cutoff` percent of
    /// pixels at either end.
    pub fn auto_contrast(self, cutoff: f32) -> Self {
        self.then(AutoContrast::new(cutoff))
    }

    /// Gaussian blur with standard deviation `sigma`.
    pub fn blur(self, sigma: f32) -> Self {
        self.then(Blur::new(sigma))
    }

    /// Unsharp mask.
    pub fn sharpen(self, sigma: f32, threshold: i32) -> Self {
        self.then(Sharpen::new(sigma, threshold))
    }

    /// Boost detail around edges.
    pub fn edge_enhance(self) -> Self {
        self.then(EdgeEnhance)
    }

    /// Relief effect.
    pub fn emboss(self) -> Self {
        self.then(Emboss)
    }

    /// Edge map.
    pub fn find_edges(self) -> Self {
        self.then(FindEdges)
    }

    /// Overlay a mark image.
    pub fn watermark(self, options: WatermarkOptions) -> Self {
        self.then(Watermark::new(options))
    }

    /// Set the output encoding for the rest of the chain.
    pub fn convert(self, format: ImageFormat, quality: Quality) -> Self {
        self.then(Convert::new(format, quality))
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the steps, in application order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Operation for OperationPipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn apply(&self, image: &ImageHandle) -> ImageResult<ImageHandle> {
        let mut current = image.clone();
        for step in &self.steps {
            log::trace!("applying step '{}'", step.name());
            current = step.apply(&current)?;
        }
        Ok(current)
    }
}

impl fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
