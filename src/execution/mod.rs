//! Batch execution.
//!
//! This module runs work items through operations on a worker pool and
//! reports progress while doing so.

pub mod engine;
pub mod progress;

pub use engine::BatchProcessor;
pub use progress::{
    channel_observer, ProgressCallback, ProgressEvent, ProgressTracker, RunningTotals,
};
