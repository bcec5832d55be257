//! Progress tracking for batch runs.

use crate::core::batch::Outcome;
use crossbeam::channel::{self, Receiver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Per-outcome counters at the time of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    /// Items written.
    pub success: usize,
    /// Items failed.
    pub failed: usize,
    /// Items skipped.
    pub skipped: usize,
}

impl RunningTotals {
    /// Items finished so far.
    pub fn finished(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// A progress event.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The batch has been validated and is about to dispatch.
    Started {
        /// Number of items in the batch.
        total: usize,
        /// Worker loops that will run.
        workers: usize,
    },
    /// One item reached its final result.
    ItemFinished {
        /// Position of the item in the input list.
        index: usize,
        /// Input of the finished item.
        input_path: PathBuf,
        /// How it ended.
        outcome: Outcome,
        /// Counters including this item.
        totals: RunningTotals,
        /// Number of items in the batch.
        total: usize,
        /// Finished share, 0 to 100.
        percent: f32,
        /// Based on the mean duration of items that ran so far.
        estimated_remaining: Option<Duration>,
    },
    /// Every item has a result.
    Finished {
        /// Final counters.
        totals: RunningTotals,
        /// Wall time of the run.
        elapsed: Duration,
        /// Whether the error limit stopped dispatch.
        aborted: bool,
    },
}

/// Callback type for progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Counts finished items and forwards events to an optional callback.
pub struct ProgressTracker {
    total: usize,
    success: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    start_time: Instant,
    callback: Option<ProgressCallback>,
    /// Durations of items that actually ran, for estimation.
    item_times: parking_lot::Mutex<Vec<Duration>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            success: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            start_time: Instant::now(),
            callback: None,
            item_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set a callback for progress events.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Set the callback if one is given.
    pub fn with_optional_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Start tracking.
    pub fn start(&mut self, workers: usize) {
        self.start_time = Instant::now();
        self.send(ProgressEvent::Started {
            total: self.total,
            workers,
        });
    }

    /// Record one finished item.
    ///
    /// `ran_for` is the time spent processing, `None` for items that never ran.
    pub fn item_finished(
        &self,
        index: usize,
        input_path: PathBuf,
        outcome: Outcome,
        ran_for: Option<Duration>,
    ) {
        let counter = match outcome {
            Outcome::Success => &self.success,
            Outcome::Failure => &self.failed,
            Outcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(duration) = ran_for {
            self.item_times.lock().push(duration);
        }

        self.send(ProgressEvent::ItemFinished {
            index,
            input_path,
            outcome,
            totals: self.totals(),
            total: self.total,
            percent: self.progress_percent(),
            estimated_remaining: self.estimated_remaining(),
        });
    }

    /// Complete tracking.
    pub fn finish(&self, aborted: bool) {
        self.send(ProgressEvent::Finished {
            totals: self.totals(),
            elapsed: self.start_time.elapsed(),
            aborted,
        });
    }

    /// Current counters.
    pub fn totals(&self) -> RunningTotals {
        RunningTotals {
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.totals().finished() as f32 / self.total as f32) * 100.0
    }

    /// Estimate remaining time from the average item duration.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let times = self.item_times.lock();
        if times.is_empty() {
            return None;
        }

        let avg = times.iter().sum::<Duration>() / times.len() as u32;
        let remaining = self.total.saturating_sub(self.totals().finished());
        Some(avg * remaining as u32)
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// A callback that forwards events into a channel, plus its receiving end.
///
/// Events are dropped once the receiver is gone.
pub fn channel_observer() -> (ProgressCallback, Receiver<ProgressEvent>) {
    let (tx, rx) = channel::unbounded();
    let callback: ProgressCallback = Box::new(move |event| {
        let _ = tx.send(event);
    });
    (callback, rx)
}
