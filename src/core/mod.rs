//! Core types for the gneiss batch engine.
//!
//! - Error types and their per-item classification
//! - Image formats, quality and colour values
//! - The [`ImageHandle`] wrapper around decoded pixels
//! - Batch work items, results and reports

pub mod batch;
pub mod error;
pub mod image;
pub mod types;

// Re-export commonly used types
pub use self::batch::{
    BatchConfig, BatchReport, Outcome, OutputLayout, SkipReason, WorkItem, WorkResult,
};
pub use self::error::{
    BatchError, ConfigError, ErrorKind, GneissError, GneissResult, ImageError, ImageResult,
};
pub use self::image::ImageHandle;
pub use self::types::{Color, ImageFormat, Position, Quality};
