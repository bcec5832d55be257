//! Image transforms and the pipeline that chains them.
//!
//! Every step implements [`Operation`]: it reads one [`ImageHandle`](crate::core::ImageHandle)
//! and returns a new one. [`OperationPipeline`] applies steps left to right
//! and is itself an operation, so the batch processor treats a single step
//! and a full chain the same way.

pub mod color;
pub mod composite;
pub mod config;
pub mod conversion;
pub mod filter;
pub mod operation;
pub mod transform;

pub use color::{
    AutoContrast, Blur, Brightness, Contrast, Equalize, Grayscale, Invert, Posterize, Saturation,
    Sharpen, Solarize,
};
pub use composite::{Watermark, WatermarkOptions};
pub use config::{build_pipeline, StepConfig};
pub use conversion::Convert;
pub use filter::{EdgeEnhance, Emboss, FindEdges};
pub use operation::{operation_fn, FnOperation, Operation, OperationPipeline, SharedOperation};
pub use transform::{
    Crop, CropRect, Flip, FlipOptions, ResampleFilter, Resize, ResizeOptions, Rotate,
    RotateOptions,
};
