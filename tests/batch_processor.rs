use gneiss::prelude::*;
use image::DynamicImage;
use proptest::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    ImageHandle::new(DynamicImage::new_rgb8(4, 4))
        .save(&path, ImageFormat::Png, Quality::default())
        .unwrap();
    path
}

fn identity() -> impl Operation {
    operation_fn("identity", |img: &ImageHandle| Ok(img.clone()))
}

fn failing() -> SharedOperation {
    Arc::new(operation_fn("fail", |_: &ImageHandle| {
        Err(ImageError::operation("fail", "rejected on purpose"))
    }))
}

/// `count` items reading the same input, each with its own output.
fn items_for(input: &Path, out_dir: &Path, count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| WorkItem::new(input, out_dir.join(format!("out_{:03}.png", i))))
        .collect()
}

#[test]
fn test_every_item_gets_exactly_one_result() {
    init();
    let dir = TempDir::new().unwrap();
    let good = write_png(dir.path(), "good.png");
    let corrupt = dir.path().join("corrupt.png");
    std::fs::write(&corrupt, "definitely not a png").unwrap();

    let items = vec![
        WorkItem::new(&good, dir.path().join("a.png")),
        WorkItem::new(dir.path().join("missing.png"), dir.path().join("b.png")),
        WorkItem::new(&corrupt, dir.path().join("c.png")),
        WorkItem::new(&good, dir.path().join("d.png")),
    ];
    let report = BatchProcessor::new()
        .process(items, &identity(), &BatchConfig::new().with_max_workers(3))
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.total, report.success + report.failed + report.skipped);
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.success, 2);
    assert_eq!(report.results[1].error_kind(), Some(ErrorKind::Filesystem));
    assert_eq!(report.results[2].error_kind(), Some(ErrorKind::Decode));
}

#[test]
fn test_skip_existing_does_not_invoke_operation() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");
    let items = items_for(&input, dir.path(), 3);
    std::fs::write(&items[1].output_path, b"already here").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = Arc::clone(&calls);
        operation_fn("count", move |img: &ImageHandle| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(img.clone())
        })
    };

    let report = BatchProcessor::new()
        .process(items, &counted, &BatchConfig::new().with_skip_existing(true))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.results[1].skip_reason(), Some(SkipReason::OutputExists));
    assert_eq!(
        std::fs::read(dir.path().join("out_001.png")).unwrap(),
        b"already here"
    );
}

#[test]
fn test_all_outputs_existing_runs_nothing() {
    init();
    let dir = TempDir::new().unwrap();
    // Inputs are never read when the output is already there.
    let items = items_for(&dir.path().join("never_written.png"), dir.path(), 4);
    for item in &items {
        std::fs::write(&item.output_path, b"done earlier").unwrap();
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = Arc::clone(&calls);
        operation_fn("count", move |img: &ImageHandle| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(img.clone())
        })
    };

    let config = BatchConfig::new().with_skip_existing(true).with_max_workers(2);
    let report = BatchProcessor::new().process(items, &counted, &config).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.skipped, 4);
    assert!(report
        .results
        .iter()
        .all(|r| r.skip_reason() == Some(SkipReason::OutputExists)));
    assert!(!report.was_aborted());
}

#[test]
fn test_results_follow_input_order() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    // Earlier items sleep longer, so they finish last.
    let count = 8;
    let items: Vec<WorkItem> = items_for(&input, dir.path(), count)
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let delay = Duration::from_millis(((count - i) * 15) as u64);
            let op: SharedOperation = Arc::new(operation_fn("sleep", move |img: &ImageHandle| {
                thread::sleep(delay);
                Ok(img.clone())
            }));
            item.with_operation(op)
        })
        .collect();
    let expected: Vec<PathBuf> = items.iter().map(|i| i.output_path.clone()).collect();

    let report = BatchProcessor::new()
        .process(items, &identity(), &BatchConfig::new().with_max_workers(4))
        .unwrap();

    let outputs: Vec<PathBuf> = report
        .results
        .iter()
        .map(|r| match r {
            WorkResult::Success { output_path, .. } => output_path.clone(),
            other => panic!("unexpected result {:?}", other),
        })
        .collect();
    assert_eq!(outputs, expected);
}

#[test]
fn test_error_limit_stops_dispatch() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    let items: Vec<WorkItem> = items_for(&input, dir.path(), 6)
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if i == 1 || i == 3 {
                item.with_operation(failing())
            } else {
                item
            }
        })
        .collect();

    let config = BatchConfig::new().with_max_workers(1).with_error_limit(2);
    let report = BatchProcessor::new().process(items, &identity(), &config).unwrap();

    let outcomes: Vec<Outcome> = report.results.iter().map(|r| r.outcome()).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Success,
            Outcome::Failure,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Skipped,
            Outcome::Skipped,
        ]
    );
    assert_eq!(report.results[4].skip_reason(), Some(SkipReason::BatchAborted));
    assert!(report.was_aborted());
    assert!(!dir.path().join("out_004.png").exists());
}

#[test]
fn test_error_limit_lets_in_flight_items_finish() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    // Item 1 is still running when items 0 and 2 reach the limit.
    let slow: SharedOperation = Arc::new(operation_fn("slow", |img: &ImageHandle| {
        thread::sleep(Duration::from_millis(200));
        Ok(img.clone())
    }));
    let mut items = items_for(&input, dir.path(), 5);
    items[0] = items[0].clone().with_operation(failing());
    items[1] = items[1].clone().with_operation(slow);
    items[2] = items[2].clone().with_operation(failing());

    let config = BatchConfig::new().with_max_workers(2).with_error_limit(2);
    let report = BatchProcessor::new().process(items, &identity(), &config).unwrap();

    let outcomes: Vec<Outcome> = report.results.iter().map(|r| r.outcome()).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Failure,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Skipped,
            Outcome::Skipped,
        ]
    );
    assert_eq!(report.results[3].skip_reason(), Some(SkipReason::BatchAborted));
    assert_eq!(report.results[4].skip_reason(), Some(SkipReason::BatchAborted));
    assert!(dir.path().join("out_001.png").exists());
    assert!(!dir.path().join("out_003.png").exists());
}

#[test]
fn test_stop_on_error_without_limit_stops_after_first_failure() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    let mut items = items_for(&input, dir.path(), 4);
    items[0] = items[0].clone().with_operation(failing());

    let config = BatchConfig::new().with_max_workers(1).with_stop_on_error(true);
    let report = BatchProcessor::new().process(items, &identity(), &config).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 3);
    assert!(report
        .results
        .iter()
        .skip(1)
        .all(|r| r.skip_reason() == Some(SkipReason::BatchAborted)));
}

#[test]
fn test_failure_does_not_affect_siblings() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    let mut items = items_for(&input, dir.path(), 10);
    items[4] = items[4].clone().with_operation(failing());
    items[7] = items[7].clone().with_operation(Arc::new(operation_fn(
        "explode",
        |_: &ImageHandle| -> ImageResult<ImageHandle> { panic!("worker blew up") },
    )));

    let report = BatchProcessor::new()
        .process(items, &identity(), &BatchConfig::new().with_max_workers(4))
        .unwrap();

    assert_eq!(report.success, 8);
    assert_eq!(report.failed, 2);
    assert_eq!(report.results[7].error_kind(), Some(ErrorKind::Operation));
    assert!(report.summary().contains("2 failed"));
}

#[test]
fn test_concurrency_never_exceeds_max_workers() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let tracked = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        operation_fn("tracked", move |img: &ImageHandle| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(img.clone())
        })
    };

    // A larger shared pool must not raise the limit.
    let processor = BatchProcessor::with_thread_pool(8).unwrap();
    let report = processor
        .process(
            items_for(&input, dir.path(), 50),
            &tracked,
            &BatchConfig::new().with_max_workers(4),
        )
        .unwrap();

    assert_eq!(report.success, 50);
    let peak = peak.load(Ordering::SeqCst);
    assert!((1..=4).contains(&peak), "peak concurrency was {}", peak);
}

#[test]
fn test_progress_events() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");
    let mut items = items_for(&input, dir.path(), 5);
    items[2] = items[2].clone().with_operation(failing());

    let (callback, rx) = channel_observer();
    let config = BatchConfig::new().with_max_workers(2);
    let report = BatchProcessor::new()
        .process_with_progress(items, &identity(), &config, callback)
        .unwrap();
    let events: Vec<ProgressEvent> = rx.try_iter().collect();

    assert!(matches!(events.first(), Some(ProgressEvent::Started { total: 5, workers: 2 })));
    let mut indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ItemFinished { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    match events.last() {
        Some(ProgressEvent::Finished { totals, aborted, .. }) => {
            assert_eq!(totals.success, report.success);
            assert_eq!(totals.failed, 1);
            assert!(!aborted);
        }
        other => panic!("unexpected last event {:?}", other),
    }
}

#[test]
fn test_slow_observer_sees_every_item() {
    init();
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png");
    let count = 40;

    let seen = Arc::new(AtomicUsize::new(0));
    let callback: ProgressCallback = {
        let seen = Arc::clone(&seen);
        Box::new(move |event: ProgressEvent| {
            if let ProgressEvent::ItemFinished { .. } = event {
                thread::sleep(Duration::from_millis(3));
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // The hand-off channel holds only `max_workers` results, far fewer
    // than the batch.
    let config = BatchConfig::new().with_max_workers(2);
    let report = BatchProcessor::new()
        .process_with_progress(items_for(&input, dir.path(), count), &identity(), &config, callback)
        .unwrap();

    assert_eq!(report.success, count);
    assert_eq!(seen.load(Ordering::SeqCst), count);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = BatchConfig::new().with_error_limit(0);
    let err = BatchProcessor::new()
        .process(vec![WorkItem::new("a.png", "b.png")], &identity(), &config)
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidErrorLimit(0)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_report_matches_items(
        plan in prop::collection::vec(any::<bool>(), 0..12),
        workers in 1usize..5,
    ) {
        let dir = TempDir::new().unwrap();
        let input = write_png(dir.path(), "in.png");

        // `true` items read a real file, `false` items a missing one.
        let items: Vec<WorkItem> = plan
            .iter()
            .enumerate()
            .map(|(i, ok)| {
                let source = if *ok {
                    input.clone()
                } else {
                    dir.path().join(format!("gone_{}.png", i))
                };
                WorkItem::new(source, dir.path().join(format!("out_{}.png", i)))
            })
            .collect();
        let inputs: Vec<PathBuf> = items.iter().map(|i| i.input_path.clone()).collect();

        let report = BatchProcessor::new()
            .process(items, &identity(), &BatchConfig::new().with_max_workers(workers))
            .unwrap();

        prop_assert_eq!(report.total, plan.len());
        prop_assert_eq!(report.total, report.success + report.failed + report.skipped);
        for (i, result) in report.results.iter().enumerate() {
            prop_assert_eq!(result.input_path(), inputs[i].as_path());
            prop_assert_eq!(result.is_success(), plan[i]);
        }
    }
}
