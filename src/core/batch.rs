//! Batch data model: work items, their results and the aggregate report.
//!
//! A batch turns a list of input paths into [`WorkItem`]s (usually through
//! an [`OutputLayout`]), runs them through
//! [`BatchProcessor`](crate::execution::BatchProcessor) under a
//! [`BatchConfig`], and returns a [`BatchReport`] holding exactly one
//! [`WorkResult`] per item, in input order.

use crate::core::error::{BatchError, ErrorKind, ImageError};
use crate::core::image::ImageHandle;
use crate::core::types::{ImageFormat, Quality};
use crate::pipeline::operation::SharedOperation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation batch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on simultaneously running operations.
    pub max_workers: usize,
    /// Stop scheduling once this many items have failed.
    pub error_limit: Option<usize>,
    /// Skip items whose output already exists.
    pub skip_existing: bool,
    /// Stop scheduling after the first failure when no `error_limit` is set.
    pub stop_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            error_limit: None,
            skip_existing: false,
            stop_on_error: false,
        }
    }
}

impl BatchConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrent workers.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the failure count that aborts the batch.
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = Some(limit);
        self
    }

    /// Enable/disable skipping of existing outputs.
    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Enable/disable stop on first error.
    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Reject settings that cannot run.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_workers == 0 {
            return Err(BatchError::InvalidWorkerCount(self.max_workers));
        }
        if let Some(0) = self.error_limit {
            return Err(BatchError::InvalidErrorLimit(0));
        }
        Ok(())
    }

    /// Number of failures after which scheduling stops, if any.
    pub fn abort_threshold(&self) -> Option<usize> {
        self.error_limit
            .or_else(|| self.stop_on_error.then_some(1))
    }
}

/// One unit of batch work.
#[derive(Clone)]
pub struct WorkItem {
    /// Image to read.
    pub input_path: PathBuf,
    /// Where the result is written.
    pub output_path: PathBuf,
    /// Output encoding. Falls back to the output extension, then to the
    /// format carried by the processed image.
    pub format: Option<ImageFormat>,
    /// Encoder quality. Falls back to the processed image's quality.
    pub quality: Option<Quality>,
    /// Overrides the batch-wide operation for this item.
    pub operation: Option<SharedOperation>,
}

impl WorkItem {
    /// Create an item with no explicit encoding or operation.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            format: None,
            quality: None,
            operation: None,
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the encoder quality.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Run `operation` for this item instead of the batch-wide one.
    pub fn with_operation(mut self, operation: SharedOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Resolve the encoding for a processed image.
    pub fn encoding_for(&self, image: &ImageHandle) -> Result<(ImageFormat, Quality), ImageError> {
        let format = self
            .format
            .or_else(|| ImageFormat::from_path(&self.output_path))
            .or_else(|| image.format())
            .ok_or_else(|| ImageError::UnsupportedFormat {
                format: self.output_path.display().to_string(),
            })?;
        Ok((format, self.quality.unwrap_or_else(|| image.quality())))
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("input_path", &self.input_path)
            .field("output_path", &self.output_path)
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("operation", &self.operation.as_ref().map(|op| op.name()))
            .finish()
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The output path already existed and `skip_existing` was set.
    OutputExists,
    /// The batch stopped scheduling before this item ran.
    BatchAborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OutputExists => write!(f, "output exists"),
            SkipReason::BatchAborted => write!(f, "batch aborted"),
        }
    }
}

/// Outcome class of a [`WorkResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The output was written.
    Success,
    /// The item failed; see its [`ErrorKind`].
    Failure,
    /// The item never ran.
    Skipped,
}

/// The outcome of processing one [`WorkItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkResult {
    /// The output was written.
    Success {
        /// Image that was read.
        input_path: PathBuf,
        /// File that was written.
        output_path: PathBuf,
        /// Input file size in bytes.
        size_before: u64,
        /// Output file size in bytes.
        size_after: u64,
        /// Wall time for this item.
        duration: Duration,
    },
    /// The item failed. Nothing was written.
    Failure {
        /// Image that was read, or failed to be.
        input_path: PathBuf,
        /// Failure class.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
    /// The item never ran.
    Skipped {
        /// Image that would have been read.
        input_path: PathBuf,
        /// Why it was not run.
        reason: SkipReason,
    },
}

impl WorkResult {
    /// Record a classified failure.
    pub fn failure(input_path: impl Into<PathBuf>, error: &ImageError) -> Self {
        WorkResult::Failure {
            input_path: input_path.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Record a skipped item.
    pub fn skipped(input_path: impl Into<PathBuf>, reason: SkipReason) -> Self {
        WorkResult::Skipped {
            input_path: input_path.into(),
            reason,
        }
    }

    /// Input path of the item this result belongs to.
    pub fn input_path(&self) -> &Path {
        match self {
            WorkResult::Success { input_path, .. }
            | WorkResult::Failure { input_path, .. }
            | WorkResult::Skipped { input_path, .. } => input_path,
        }
    }

    /// Outcome class.
    pub fn outcome(&self) -> Outcome {
        match self {
            WorkResult::Success { .. } => Outcome::Success,
            WorkResult::Failure { .. } => Outcome::Failure,
            WorkResult::Skipped { .. } => Outcome::Skipped,
        }
    }

    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        self.outcome() == Outcome::Success
    }

    /// True for `Failure`.
    pub fn is_failure(&self) -> bool {
        self.outcome() == Outcome::Failure
    }

    /// True for `Skipped`.
    pub fn is_skipped(&self) -> bool {
        self.outcome() == Outcome::Skipped
    }

    /// Error kind, for failures.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            WorkResult::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Skip reason, for skipped items.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            WorkResult::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of work items.
    pub total: usize,
    /// Items written successfully.
    pub success: usize,
    /// Items that failed.
    pub failed: usize,
    /// Items skipped, whether the output existed or the batch aborted.
    pub skipped: usize,
    /// One result per work item, in input order.
    pub results: Vec<WorkResult>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Build a report, deriving the counters from `results`.
    pub fn from_results(results: Vec<WorkResult>, elapsed: Duration) -> Self {
        let mut report = Self {
            total: results.len(),
            success: 0,
            failed: 0,
            skipped: 0,
            results: Vec::new(),
            elapsed,
        };
        for result in &results {
            match result.outcome() {
                Outcome::Success => report.success += 1,
                Outcome::Failure => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }
        report.results = results;
        report
    }

    /// True when every item succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.success == self.total
    }

    /// True when scheduling stopped early.
    pub fn was_aborted(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.skip_reason() == Some(SkipReason::BatchAborted))
    }

    /// Failed results, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &WorkResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Successful results, in input order.
    pub fn successes(&self) -> impl Iterator<Item = &WorkResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Bytes saved across successful items (negative if outputs grew).
    pub fn bytes_saved(&self) -> i64 {
        self.successes()
            .map(|r| match r {
                WorkResult::Success {
                    size_before,
                    size_after,
                    ..
                } => *size_before as i64 - *size_after as i64,
                _ => 0,
            })
            .sum()
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} item(s): {} succeeded, {} failed, {} skipped in {:.2}s",
            self.total,
            self.success,
            self.failed,
            self.skipped,
            self.elapsed.as_secs_f64()
        );
        if self.was_aborted() {
            line.push_str(" (aborted)");
        }
        line
    }
}

/// How output paths are derived from input paths.
///
/// Output file name is `<stem><suffix>.<ext>`, placed in `output_dir` or,
/// when none is set, next to the input. The extension comes from `format`
/// or is copied from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    /// Directory for outputs; `None` writes next to each input.
    pub output_dir: Option<PathBuf>,
    /// Target format; `None` keeps the input's extension.
    pub format: Option<ImageFormat>,
    /// Appended to the input stem.
    pub suffix: String,
    /// Quality put on every planned item.
    pub quality: Option<Quality>,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            output_dir: None,
            format: None,
            suffix: "_processed".to_string(),
            quality: None,
        }
    }
}

impl OutputLayout {
    /// Layout with the `_processed` suffix, next to the inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write outputs into `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Re-encode outputs to `format`.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the stem suffix; may be empty.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Set the encoder quality.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Output path for one input.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut name = format!("{}{}", stem, self.suffix);
        match (self.format, input.extension()) {
            (Some(format), _) => {
                name.push('.');
                name.push_str(format.extension());
            }
            (None, Some(ext)) => {
                name.push('.');
                name.push_str(&ext.to_string_lossy());
            }
            (None, None) => {}
        }

        let dir = match &self.output_dir {
            Some(dir) => dir.as_path(),
            None => input.parent().unwrap_or_else(|| Path::new("")),
        };
        dir.join(name)
    }

    /// Plan one work item per input, preserving order.
    pub fn plan<I, P>(&self, inputs: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        inputs
            .into_iter()
            .map(|input| {
                let input = input.as_ref();
                WorkItem {
                    input_path: input.to_path_buf(),
                    output_path: self.output_path_for(input),
                    format: self.format,
                    quality: self.quality,
                    operation: None,
                }
            })
            .collect()
    }

    /// Plan items that all carry their own operation.
    pub fn plan_with<I, P>(&self, inputs: I, operation: SharedOperation) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.plan(inputs)
            .into_iter()
            .map(|item| item.with_operation(Arc::clone(&operation)))
            .collect()
    }
}
