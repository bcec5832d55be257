//! # Gneiss - Batch Image Processing
//!
//! Gneiss applies image operations to many files at once. A batch is a list
//! of work items (input path, output path, encoding) run through one
//! operation on a bounded worker pool. Every item ends up with exactly one
//! result in the returned report; a failing or panicking item never takes
//! the rest of the batch down with it.
//!
//! ## Features
//!
//! - **Composable operations**: resize, crop, rotate, flip, tone filters,
//!   watermarking and format conversion, chained with [`OperationPipeline`]
//! - **Bounded parallelism**: at most `max_workers` operations run at a time,
//!   fed in input order
//! - **Partial failure**: classified per-item failures, optional error limit,
//!   skipping of existing outputs
//! - **Progress events**: per-item callbacks with running totals
//! - **Settings files**: batch options, output layout and pipeline from TOML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gneiss::prelude::*;
//!
//! let inputs = find_images("photos", true)?;
//! let pipeline = OperationPipeline::new()
//!     .resize(ResizeOptions::width(1200))
//!     .sharpen(1.0, 2);
//! let layout = OutputLayout::new()
//!     .with_output_dir("web")
//!     .with_format(ImageFormat::WebP);
//!
//! let report = BatchProcessor::new().process(
//!     layout.plan(&inputs),
//!     &pipeline,
//!     &BatchConfig::new().with_error_limit(10),
//! )?;
//! println!("{}", report.summary());
//! for failure in report.failures() {
//!     eprintln!("{:?}", failure);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: image handle, formats, batch data model, error types
//! - [`pipeline`]: the [`Operation`] trait, built-in steps and pipelines
//! - [`execution`]: the [`BatchProcessor`] and progress tracking
//! - [`utils`]: input discovery and renaming helpers
//! - [`config`]: TOML settings with environment overrides
//!
//! [`OperationPipeline`]: pipeline::OperationPipeline
//! [`Operation`]: pipeline::Operation
//! [`BatchProcessor`]: execution::BatchProcessor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod execution;
pub mod pipeline;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gneiss::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::batch::{
        BatchConfig, BatchReport, Outcome, OutputLayout, SkipReason, WorkItem, WorkResult,
    };
    pub use crate::core::image::ImageHandle;
    pub use crate::core::types::{Color, ImageFormat, Position, Quality};

    // Errors
    pub use crate::core::error::{
        BatchError, ConfigError, ErrorKind, GneissError, GneissResult, ImageError, ImageResult,
    };

    // Operations
    pub use crate::pipeline::{
        operation_fn, CropRect, FlipOptions, Operation, OperationPipeline, ResampleFilter,
        ResizeOptions, RotateOptions, SharedOperation, StepConfig, WatermarkOptions,
    };

    // Execution
    pub use crate::execution::{
        channel_observer, BatchProcessor, ProgressCallback, ProgressEvent, RunningTotals,
    };

    // Files and settings
    pub use crate::config::Settings;
    pub use crate::utils::{expand_globs, find_images};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use image::DynamicImage;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "gneiss");
    }

    #[test]
    fn test_prelude_pipeline() {
        let pipeline = OperationPipeline::new()
            .resize(ResizeOptions::width(4))
            .grayscale();
        let out = pipeline
            .apply(&ImageHandle::new(DynamicImage::new_rgb8(8, 2)))
            .unwrap();
        assert_eq!(out.dimensions(), (4, 1));
    }
}
