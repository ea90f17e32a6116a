//! Scheduler tests against in-memory frame stacks
//!
//! Every execution path must fill the same output slots with the same values, and a
//! failing group must abort the run with its index attached.

use frame_merge::{
    data_source::{
        FrameDims, FrameReader, FrameSink, FrameSource, MemoryFrameSink, MemoryFrameSource,
    },
    errors::{FrameMergeError, Result},
    planner::{plan, GroupPlan},
    scheduler::{CancellationToken, MergeScheduler},
    SkipPattern,
};
use ndarray::{Array2, Array3};
use std::ops::Range;

/// Frame `i` holds `i * 1000 + pixel index` at every pixel
fn numbered_frames(count: usize, height: usize, width: usize) -> MemoryFrameSource<i32> {
    MemoryFrameSource::from_fn(count, height, width, |frame| {
        Array2::from_shape_fn((height, width), |(y, x)| {
            (frame * 1000 + y * width + x) as i32
        })
    })
    .expect("frames have the requested shape")
}

fn run_with_workers(
    source: &MemoryFrameSource<i32>,
    plan: &GroupPlan,
    workers: usize,
) -> Result<MemoryFrameSink<i32>> {
    let dims = FrameSource::<i32>::dims(source).with_frames(plan.group_count());
    let mut sink = MemoryFrameSink::new(dims);
    let stats = MergeScheduler::new(workers).run(plan, source, &mut sink)?;
    assert_eq!(stats.groups_written, plan.group_count());
    Ok(sink)
}

#[test]
fn test_sequential_merge_sums_kept_frames() -> Result<()> {
    let source = numbered_frames(9, 2, 3);
    let plan = plan(9, 3, &SkipPattern::new([1]))?;

    let sink = run_with_workers(&source, &plan, 1)?;
    assert!(sink.is_complete());

    let frames = source.frames();
    for group in &plan.groups {
        let expected = group
            .kept_frames
            .iter()
            .map(|&i| frames.index_axis(ndarray::Axis(0), i).to_owned())
            .fold(Array2::<i32>::zeros((2, 3)), |acc, f| acc + f);
        assert_eq!(
            sink.frames().index_axis(ndarray::Axis(0), group.group_index),
            expected
        );
    }

    // Group 1 sums frames 3 and 5
    assert_eq!(sink.frames()[[1, 0, 0]], 8000);
    assert_eq!(sink.frames()[[1, 1, 2]], 8000 + 2 * 5);
    Ok(())
}

#[test]
fn test_parallel_matches_sequential_for_any_worker_count() -> Result<()> {
    let source = numbered_frames(23, 4, 5);
    let plan = plan(23, 4, &SkipPattern::new([0, 3]))?;
    let reference = run_with_workers(&source, &plan, 1)?.into_inner();

    for workers in 2..=8 {
        let sink = run_with_workers(&source, &plan, workers)?;
        assert!(sink.is_complete(), "incomplete output with {workers} workers");
        assert_eq!(sink.into_inner(), reference, "output differs with {workers} workers");
    }
    Ok(())
}

#[test]
fn test_more_workers_than_groups() -> Result<()> {
    let source = numbered_frames(6, 2, 2);
    let plan = plan(6, 3, &SkipPattern::none())?;

    let dims = FrameSource::<i32>::dims(&source).with_frames(plan.group_count());
    let mut sink = MemoryFrameSink::new(dims);
    let stats = MergeScheduler::new(16).run(&plan, &source, &mut sink)?;

    assert_eq!(stats.groups_written, 2);
    assert_eq!(stats.workers, 2);
    assert!(sink.is_complete());
    Ok(())
}

#[test]
fn test_sink_shape_is_checked() -> Result<()> {
    let source = numbered_frames(6, 2, 2);
    let plan = plan(6, 3, &SkipPattern::none())?;

    let mut wrong_slots = MemoryFrameSink::<i32>::new(FrameDims::new(5, 2, 2));
    assert!(matches!(
        MergeScheduler::new(1).run(&plan, &source, &mut wrong_slots),
        Err(FrameMergeError::SlotOutOfRange { .. })
    ));

    let mut wrong_shape = MemoryFrameSink::<i32>::new(FrameDims::new(2, 3, 2));
    assert!(matches!(
        MergeScheduler::new(2).run(&plan, &source, &mut wrong_shape),
        Err(FrameMergeError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_memory_sink_slots() {
    let mut sink = MemoryFrameSink::<u16>::new(FrameDims::new(3, 1, 2));
    let frame = ndarray::array![[7u16, 8]];

    assert!(sink.write_frame(2, frame.view()).is_ok());
    // Rewriting a slot replaces it
    assert!(sink.write_frame(2, frame.view()).is_ok());
    assert_eq!(sink.missing_slots(), vec![0, 1]);
    assert!(!sink.is_complete());

    assert!(matches!(
        sink.write_frame(3, frame.view()),
        Err(FrameMergeError::SlotOutOfRange { index: 3, slots: 3 })
    ));
    let wide = ndarray::array![[1u16, 2, 3]];
    assert!(matches!(
        sink.write_frame(0, wide.view()),
        Err(FrameMergeError::ShapeMismatch { .. })
    ));
}

/// Source whose reads fail for one frame
struct FailingSource {
    inner: MemoryFrameSource<i32>,
    bad_frame: usize,
}

struct FailingReader<'a> {
    inner: Box<dyn FrameReader<i32> + 'a>,
    bad_frame: usize,
}

impl FrameReader<i32> for FailingReader<'_> {
    fn read_frames(&mut self, frames: Range<usize>) -> Result<Array3<i32>> {
        if frames.contains(&self.bad_frame) {
            return Err(std::io::Error::other("unreadable chunk").into());
        }
        self.inner.read_frames(frames)
    }
}

impl FrameSource<i32> for FailingSource {
    fn dims(&self) -> FrameDims {
        self.inner.dims()
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader<i32> + '_>> {
        Ok(Box::new(FailingReader {
            inner: self.inner.open_reader()?,
            bad_frame: self.bad_frame,
        }))
    }
}

#[test]
fn test_failing_group_is_reported() -> Result<()> {
    let source = FailingSource {
        inner: numbered_frames(12, 2, 2),
        bad_frame: 7,
    };
    let plan = plan(12, 3, &SkipPattern::none())?;

    for workers in [1, 2, 4] {
        let mut sink = MemoryFrameSink::<i32>::new(FrameDims::new(4, 2, 2));
        let err = MergeScheduler::new(workers)
            .run(&plan, &source, &mut sink)
            .expect_err("frame 7 cannot be read");

        assert_eq!(err.group_index(), Some(2), "wrong group with {workers} workers");
        assert!(err.is_io());
        assert!(!sink.is_complete());
    }
    Ok(())
}

#[test]
fn test_cancelled_before_start() -> Result<()> {
    let source = numbered_frames(12, 2, 2);
    let plan = plan(12, 2, &SkipPattern::none())?;
    let token = CancellationToken::new();
    token.cancel();
    assert!(token.is_cancelled());

    for workers in [1, 3] {
        let mut sink = MemoryFrameSink::<i32>::new(FrameDims::new(6, 2, 2));
        let result = MergeScheduler::new(workers)
            .with_cancellation(token.clone())
            .run(&plan, &source, &mut sink);

        assert!(matches!(result, Err(FrameMergeError::Cancelled)));
        assert_eq!(sink.missing_slots().len(), 6);
    }
    Ok(())
}

#[test]
fn test_empty_plan_writes_nothing() -> Result<()> {
    let source = numbered_frames(2, 1, 1);
    let plan = plan(0, 2, &SkipPattern::none())?;
    let mut sink = MemoryFrameSink::<i32>::new(FrameDims::new(0, 1, 1));

    let stats = MergeScheduler::new(4).run(&plan, &source, &mut sink)?;
    assert_eq!(stats.groups_written, 0);
    Ok(())
}

/// Source whose reader cancels the run while reading one frame
struct CancellingSource {
    inner: MemoryFrameSource<i32>,
    token: CancellationToken,
    trigger_frame: usize,
}

struct CancellingReader<'a> {
    inner: Box<dyn FrameReader<i32> + 'a>,
    token: &'a CancellationToken,
    trigger_frame: usize,
}

impl FrameReader<i32> for CancellingReader<'_> {
    fn read_frames(&mut self, frames: Range<usize>) -> Result<Array3<i32>> {
        if frames.contains(&self.trigger_frame) {
            self.token.cancel();
        }
        self.inner.read_frames(frames)
    }
}

impl FrameSource<i32> for CancellingSource {
    fn dims(&self) -> FrameDims {
        self.inner.dims()
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader<i32> + '_>> {
        Ok(Box::new(CancellingReader {
            inner: self.inner.open_reader()?,
            token: &self.token,
            trigger_frame: self.trigger_frame,
        }))
    }
}

fn run_cancelled_at(workers: usize, trigger_frame: usize) -> MemoryFrameSink<i32> {
    let source = CancellingSource {
        inner: numbered_frames(12, 2, 2),
        token: CancellationToken::new(),
        trigger_frame,
    };
    let plan = plan(12, 2, &SkipPattern::none()).expect("valid grouping");
    let mut sink = MemoryFrameSink::<i32>::new(FrameDims::new(6, 2, 2));

    let result = MergeScheduler::new(workers)
        .with_cancellation(source.token.clone())
        .run(&plan, &source, &mut sink);

    assert!(
        matches!(result, Err(FrameMergeError::Cancelled)),
        "expected cancellation with {workers} workers, got {result:?}"
    );
    sink
}

#[test]
fn test_cancelled_mid_run_sequential() {
    // Frame 4 belongs to group 2: that group finishes, nothing after it starts
    let sink = run_cancelled_at(1, 4);
    assert_eq!(sink.missing_slots(), vec![3, 4, 5]);
    assert_eq!(sink.frames()[[2, 0, 0]], 4000 + 5000);
}

#[test]
fn test_cancelled_mid_run_parallel() {
    // Two workers take groups 0..3 and 3..6; frame 2 is read for group 1
    let sink = run_cancelled_at(2, 2);
    let missing = sink.missing_slots();

    assert!(!missing.contains(&0));
    assert!(!missing.contains(&1), "in-flight group must still be written");
    assert!(missing.contains(&2), "no group may start after cancellation");
    assert_eq!(sink.frames()[[1, 0, 0]], 2000 + 3000);
}
