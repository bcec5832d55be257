//! Batch processor implementation.
//!
//! Items are fed to a fixed number of worker loops in input order. Each worker
//! claims the next index from a shared cursor, processes it and hands the
//! result to the coordinator (the calling thread) over a bounded channel. The
//! coordinator reports progress and places results back in input order.

use crate::core::batch::{BatchConfig, BatchReport, OutputLayout, SkipReason, WorkItem, WorkResult};
use crate::core::error::{BatchError, ImageError, ImageResult};
use crate::core::image::ImageHandle;
use crate::core::types::{ImageFormat, Quality};
use crate::execution::progress::{ProgressCallback, ProgressTracker};
use crate::pipeline::composite::{Watermark, WatermarkOptions};
use crate::pipeline::conversion::Convert;
use crate::pipeline::operation::Operation;
use crate::pipeline::transform::{Resize, ResizeOptions};
use crossbeam::channel::{self, Sender};
use log::{debug, info, warn};
use rayon::ThreadPool;
use std::collections::BTreeSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A finished item on its way to the coordinator.
struct Finished {
    index: usize,
    result: WorkResult,
    ran_for: Option<Duration>,
}

/// State shared by the worker loops of one run.
struct Dispatch<'a> {
    items: &'a [WorkItem],
    operation: &'a dyn Operation,
    config: &'a BatchConfig,
    threshold: Option<usize>,
    cursor: AtomicUsize,
    failures: AtomicUsize,
    aborted: AtomicBool,
}

impl<'a> Dispatch<'a> {
    /// Claim the next item, or `None` when the batch is exhausted or aborted.
    fn claim(&self) -> Option<usize> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        if index >= self.items.len() || self.aborted.load(Ordering::SeqCst) {
            return None;
        }
        Some(index)
    }

    fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(threshold) = self.threshold {
            if failures >= threshold && !self.aborted.swap(true, Ordering::SeqCst) {
                warn!(
                    "{} item(s) failed, limit is {}; no further items will be dispatched",
                    failures, threshold
                );
            }
        }
    }

    fn worker_loop(&self, tx: Sender<Finished>) {
        while let Some(index) = self.claim() {
            let item = &self.items[index];
            let operation: &dyn Operation = match &item.operation {
                Some(op) => op.as_ref(),
                None => self.operation,
            };

            let started = Instant::now();
            let result = guard_item(item, operation.name(), || {
                process_item(item, operation, self.config)
            });
            let ran_for = (!result.is_skipped()).then(|| started.elapsed());

            if result.is_failure() {
                self.record_failure();
            }

            if tx.send(Finished { index, result, ran_for }).is_err() {
                // Coordinator is gone.
                break;
            }
        }
    }
}

/// Runs operations over many images with bounded parallelism.
pub struct BatchProcessor {
    /// Pool reused across runs; `None` builds one per run.
    pool: Option<Arc<ThreadPool>>,
}

impl BatchProcessor {
    /// Create a processor that builds a worker pool per run.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Create a processor that keeps one pool of `threads` workers.
    ///
    /// Runs still execute at most `max_workers` operations at a time.
    pub fn with_thread_pool(threads: usize) -> Result<Self, BatchError> {
        if threads == 0 {
            return Err(BatchError::InvalidWorkerCount(threads));
        }
        Ok(Self {
            pool: Some(Arc::new(build_pool(threads)?)),
        })
    }

    /// Process every item with `operation` (or the item's own operation).
    ///
    /// Per-item errors never escape: the report holds one result per item in
    /// input order. Only configuration problems found before dispatch are
    /// returned as errors.
    pub fn process(
        &self,
        items: Vec<WorkItem>,
        operation: &dyn Operation,
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        self.run(items, operation, config, None)
    }

    /// Like [`process`](Self::process), reporting progress to `callback`.
    ///
    /// The callback runs on the calling thread.
    pub fn process_with_progress(
        &self,
        items: Vec<WorkItem>,
        operation: &dyn Operation,
        config: &BatchConfig,
        callback: ProgressCallback,
    ) -> Result<BatchReport, BatchError> {
        self.run(items, operation, config, Some(callback))
    }

    /// Plan items for `inputs` with `layout`, then process them.
    pub fn process_paths<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        operation: &dyn Operation,
        layout: &OutputLayout,
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        self.process(layout.plan(inputs), operation, config)
    }

    /// Re-encode images into `format`, keeping their names.
    pub fn convert_format<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        format: ImageFormat,
        quality: Quality,
        output_dir: Option<&Path>,
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        let layout = convenience_layout(output_dir, "")
            .with_format(format)
            .with_quality(quality);
        self.process_paths(inputs, &Convert::new(format, quality), &layout, config)
    }

    /// Resize images, writing `<stem>_resized.<ext>`.
    pub fn resize_images<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        options: ResizeOptions,
        output_dir: Option<&Path>,
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        let layout = convenience_layout(output_dir, "_resized");
        self.process_paths(inputs, &Resize::new(options), &layout, config)
    }

    /// Watermark images, writing `<stem>_watermarked.<ext>`.
    pub fn watermark_images<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        options: WatermarkOptions,
        output_dir: Option<&Path>,
        config: &BatchConfig,
    ) -> Result<BatchReport, BatchError> {
        let layout = convenience_layout(output_dir, "_watermarked");
        self.process_paths(inputs, &Watermark::new(options), &layout, config)
    }

    fn run(
        &self,
        items: Vec<WorkItem>,
        operation: &dyn Operation,
        config: &BatchConfig,
        callback: Option<ProgressCallback>,
    ) -> Result<BatchReport, BatchError> {
        config.validate()?;
        create_output_dirs(&items)?;

        let start_time = Instant::now();
        let total = items.len();
        let workers = config.max_workers.min(total);

        let mut tracker = ProgressTracker::new(total).with_optional_callback(callback);
        tracker.start(workers);
        info!(
            "Processing {} item(s) with {} worker(s) using '{}'",
            total,
            workers,
            operation.name()
        );

        let mut slots: Vec<Option<WorkResult>> = vec![None; total];

        if workers > 0 {
            let owned_pool;
            let pool: &ThreadPool = match &self.pool {
                Some(pool) => pool.as_ref(),
                None => {
                    owned_pool = build_pool(workers)?;
                    &owned_pool
                }
            };

            let dispatch = Dispatch {
                items: &items,
                operation,
                config,
                threshold: config.abort_threshold(),
                cursor: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                aborted: AtomicBool::new(false),
            };
            let (tx, rx) = channel::bounded::<Finished>(workers);

            pool.in_place_scope(|scope| {
                let rx = rx;
                let dispatch = &dispatch;
                for _ in 0..workers {
                    let tx = tx.clone();
                    scope.spawn(move |_| dispatch.worker_loop(tx));
                }
                drop(tx);

                for finished in rx.iter() {
                    debug!(
                        "[{}/{}] {} -> {:?}",
                        finished.index + 1,
                        total,
                        finished.result.input_path().display(),
                        finished.result.outcome()
                    );
                    tracker.item_finished(
                        finished.index,
                        finished.result.input_path().to_path_buf(),
                        finished.result.outcome(),
                        finished.ran_for,
                    );
                    slots[finished.index] = Some(finished.result);
                }
            });
        }

        let mut aborted = false;
        let results: Vec<WorkResult> = slots
            .into_iter()
            .zip(&items)
            .enumerate()
            .map(|(index, (slot, item))| match slot {
                Some(result) => result,
                None => {
                    aborted = true;
                    let result = WorkResult::skipped(&item.input_path, SkipReason::BatchAborted);
                    tracker.item_finished(index, item.input_path.clone(), result.outcome(), None);
                    result
                }
            })
            .collect();
        tracker.finish(aborted);

        let report = BatchReport::from_results(results, start_time.elapsed());
        info!("{}", report.summary());
        Ok(report)
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool, BatchError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("gneiss-worker-{}", i))
        .build()
        .map_err(|e| BatchError::ThreadPool(e.to_string()))
}

fn convenience_layout(output_dir: Option<&Path>, suffix: &str) -> OutputLayout {
    let layout = OutputLayout::new().with_suffix(suffix);
    match output_dir {
        Some(dir) => layout.with_output_dir(dir),
        None => layout,
    }
}

/// Create every output directory once, before any item runs.
fn create_output_dirs(items: &[WorkItem]) -> Result<(), BatchError> {
    let dirs: BTreeSet<PathBuf> = items
        .iter()
        .filter_map(|item| item.output_path.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();

    for dir in dirs {
        fs::create_dir_all(&dir).map_err(|source| BatchError::OutputDirectory {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Process one item to its final result. Never panics on item errors.
fn process_item(item: &WorkItem, operation: &dyn Operation, config: &BatchConfig) -> WorkResult {
    if config.skip_existing && item.output_path.exists() {
        debug!("Skipping {}: output exists", item.input_path.display());
        return WorkResult::skipped(&item.input_path, SkipReason::OutputExists);
    }

    let started = Instant::now();
    match run_item(item, operation) {
        Ok((size_before, size_after)) => WorkResult::Success {
            input_path: item.input_path.clone(),
            output_path: item.output_path.clone(),
            size_before,
            size_after,
            duration: started.elapsed(),
        },
        Err(e) => {
            warn!("Failed to process {}: {}", item.input_path.display(), e);
            WorkResult::failure(&item.input_path, &e)
        }
    }
}

/// Load, transform and save; returns input and output sizes in bytes.
fn run_item(item: &WorkItem, operation: &dyn Operation) -> ImageResult<(u64, u64)> {
    let size_before = file_size(&item.input_path)?;
    let image = ImageHandle::load(&item.input_path)?;
    let processed = operation.apply(&image)?;

    let (format, quality) = item.encoding_for(&processed)?;
    processed.save(&item.output_path, format, quality)?;

    Ok((size_before, file_size(&item.output_path)?))
}

fn file_size(path: &Path) -> ImageResult<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ImageError::filesystem(path, e))
}

/// Run one item, turning a panic anywhere in it into a `Failure`.
///
/// The panic is attributed to `operation`, the step running the item.
fn guard_item<F>(item: &WorkItem, operation: &str, run: F) -> WorkResult
where
    F: FnOnce() -> WorkResult,
{
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!("Panic while processing {}: {}", item.input_path.display(), message);
        let error = ImageError::operation(operation, format!("panicked: {}", message));
        WorkResult::failure(&item.input_path, &error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::pipeline::operation::operation_fn;
    use image::DynamicImage;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        ImageHandle::new(DynamicImage::new_rgb8(width, height))
            .save(&path, ImageFormat::Png, Quality::default())
            .unwrap();
        path
    }

    fn identity() -> impl Operation {
        operation_fn("identity", |img: &ImageHandle| Ok(img.clone()))
    }

    #[test]
    fn test_empty_batch() {
        let report = BatchProcessor::new()
            .process(Vec::new(), &identity(), &BatchConfig::new())
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_invalid_config_rejected_before_dispatch() {
        let config = BatchConfig::new().with_max_workers(0);
        let err = BatchProcessor::new()
            .process(vec![WorkItem::new("a.png", "b.png")], &identity(), &config)
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidWorkerCount(0)));

        assert!(matches!(
            BatchProcessor::with_thread_pool(0),
            Err(BatchError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn test_success_records_sizes() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "in.png", 8, 8);
        let output = dir.path().join("nested/out.png");

        let report = BatchProcessor::new()
            .process(vec![WorkItem::new(&input, &output)], &identity(), &BatchConfig::new())
            .unwrap();

        assert_eq!(report.success, 1);
        match &report.results[0] {
            WorkResult::Success {
                size_before,
                size_after,
                output_path,
                ..
            } => {
                assert!(*size_before > 0);
                assert!(*size_after > 0);
                assert_eq!(output_path, &output);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_input_is_filesystem_failure() {
        let dir = TempDir::new().unwrap();
        let item = WorkItem::new(dir.path().join("absent.png"), dir.path().join("out.png"));

        let report = BatchProcessor::new()
            .process(vec![item], &identity(), &BatchConfig::new())
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[0].error_kind(), Some(ErrorKind::Filesystem));
    }

    #[test]
    fn test_panic_becomes_operation_failure() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "in.png", 2, 2);
        let boom = operation_fn("boom", |_: &ImageHandle| -> ImageResult<ImageHandle> {
            panic!("kaboom")
        });

        let report = BatchProcessor::new()
            .process(
                vec![WorkItem::new(&input, dir.path().join("out.png"))],
                &boom,
                &BatchConfig::new(),
            )
            .unwrap();

        match &report.results[0] {
            WorkResult::Failure { kind, message, .. } => {
                assert_eq!(*kind, ErrorKind::Operation);
                assert!(message.contains("kaboom"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_panic_outside_operation_is_contained() {
        let item = WorkItem::new("in.png", "out.png");
        let result = guard_item(&item, "resize", || {
            let sizes: Vec<u64> = Vec::new();
            WorkResult::Success {
                input_path: item.input_path.clone(),
                output_path: item.output_path.clone(),
                size_before: sizes[0],
                size_after: 0,
                duration: Duration::ZERO,
            }
        });

        match result {
            WorkResult::Failure { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::Operation);
                assert!(message.contains("resize"));
                assert!(message.contains("panicked"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_item_operation_overrides_batch_operation() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "in.png", 2, 2);
        let fail: Arc<dyn Operation> = Arc::new(operation_fn("fail", |_: &ImageHandle| {
            Err(ImageError::operation("fail", "always"))
        }));

        let items = vec![
            WorkItem::new(&input, dir.path().join("a.png")),
            WorkItem::new(&input, dir.path().join("b.png")).with_operation(fail),
        ];
        let report = BatchProcessor::new()
            .process(items, &identity(), &BatchConfig::new())
            .unwrap();

        assert!(report.results[0].is_success());
        assert!(report.results[1].is_failure());
    }

    #[test]
    fn test_unwritable_output_dir_is_batch_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();

        let item = WorkItem::new("in.png", blocker.join("sub/out.png"));
        let err = BatchProcessor::new()
            .process(vec![item], &identity(), &BatchConfig::new())
            .unwrap_err();
        assert!(matches!(err, BatchError::OutputDirectory { .. }));
    }

    #[test]
    fn test_persistent_pool_is_reused() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "in.png", 3, 3);
        let processor = BatchProcessor::with_thread_pool(2).unwrap();

        for round in 0..3 {
            let item = WorkItem::new(&input, dir.path().join(format!("out{}.png", round)));
            let report = processor
                .process(vec![item], &identity(), &BatchConfig::new().with_max_workers(8))
                .unwrap();
            assert_eq!(report.success, 1);
        }
    }

    #[test]
    fn test_convert_format_names_outputs() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "photo.png", 4, 4);
        let out_dir = dir.path().join("converted");

        let report = BatchProcessor::new()
            .convert_format(
                &[&input],
                ImageFormat::Jpeg,
                Quality::new(80),
                Some(&out_dir),
                &BatchConfig::new(),
            )
            .unwrap();

        assert_eq!(report.success, 1);
        let written = out_dir.join("photo.jpg");
        assert_eq!(ImageHandle::load(&written).unwrap().format(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_resize_images_next_to_input() {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "big.png", 40, 20);

        let report = BatchProcessor::new()
            .resize_images(&[&input], ResizeOptions::width(10), None, &BatchConfig::new())
            .unwrap();

        assert_eq!(report.success, 1);
        let out = ImageHandle::load(dir.path().join("big_resized.png")).unwrap();
        assert_eq!(out.dimensions(), (10, 5));
    }
}
