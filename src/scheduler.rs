//! Distribution of merge groups over workers
//!
//! Sequential runs read, reduce and write one group at a time in ascending group
//! order. Parallel runs cut the group list into contiguous slices, one per worker
//! (group cost is uniform, so a static partition balances well). Workers only read
//! and reduce; every merged frame travels back over a bounded channel to the calling
//! thread, which is the only writer of the sink. Each write is addressed by group
//! index, so the output does not depend on which worker finishes first.

use crate::data_source::{FrameSink, FrameSource};
use crate::element::FrameElement;
use crate::errors::{FrameMergeError, Result};
use crate::parallel::{partition_static, ParallelConfig};
use crate::planner::{GroupDescriptor, GroupPlan};
use crate::reducer::{reduce_group, MergedFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Merged frames a worker may have in flight before it waits for the writer
const FRAMES_IN_FLIGHT_PER_WORKER: usize = 2;

/// Whole-run cancellation flag shared between a caller and a running merge
///
/// Cancellation is cooperative: groups already being reduced are finished, no new
/// group is started, and the run reports [`FrameMergeError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStats {
    pub groups_written: usize,
    /// Workers that actually received groups; 1 for sequential runs
    pub workers: usize,
}

/// Runs a [`GroupPlan`] against a source and a sink
#[derive(Debug, Clone)]
pub struct MergeScheduler {
    workers: usize,
    cancel: CancellationToken,
}

impl MergeScheduler {
    /// Scheduler with `worker_count` workers; 0 and 1 select the sequential path
    pub fn new(worker_count: usize) -> Self {
        Self {
            workers: worker_count.max(1),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Merge every group of `plan` from `source` into `sink`
    ///
    /// # Errors
    ///
    /// Fails fast with the first error reported: a [`FrameMergeError::MergeError`]
    /// naming the group that could not be read, reduced or written, or
    /// [`FrameMergeError::Cancelled`]. Slots written before the failure stay in the
    /// sink, which must then be treated as incomplete.
    pub fn run<T, S, K>(&self, plan: &GroupPlan, source: &S, sink: &mut K) -> Result<ScheduleStats>
    where
        T: FrameElement,
        S: FrameSource<T> + ?Sized,
        K: FrameSink<T> + ?Sized,
    {
        check_compatible(plan, source.dims(), sink.dims())?;

        if plan.is_empty() {
            return Ok(ScheduleStats {
                groups_written: 0,
                workers: 0,
            });
        }

        if self.workers <= 1 || plan.group_count() == 1 {
            self.run_sequential(plan, source, sink)
        } else {
            self.run_parallel(plan, source, sink)
        }
    }

    fn run_sequential<T, S, K>(
        &self,
        plan: &GroupPlan,
        source: &S,
        sink: &mut K,
    ) -> Result<ScheduleStats>
    where
        T: FrameElement,
        S: FrameSource<T> + ?Sized,
        K: FrameSink<T> + ?Sized,
    {
        info!(groups = plan.group_count(), "Merging groups sequentially");

        let first_group = plan.groups[0].group_index;
        let mut reader = source
            .open_reader()
            .map_err(|err| err.in_group(first_group))?;

        let mut groups_written = 0;
        for group in &plan.groups {
            if self.cancel.is_cancelled() {
                info!(groups_written, "Merge cancelled");
                return Err(FrameMergeError::Cancelled);
            }

            let merged = reduce_group(reader.as_mut(), group)?;
            write_merged(sink, &merged)?;
            groups_written += 1;
            debug!(group = group.group_index, frames = group.kept_frames.len(), "Merged group");
        }

        Ok(ScheduleStats {
            groups_written,
            workers: 1,
        })
    }

    fn run_parallel<T, S, K>(
        &self,
        plan: &GroupPlan,
        source: &S,
        sink: &mut K,
    ) -> Result<ScheduleStats>
    where
        T: FrameElement,
        S: FrameSource<T> + ?Sized,
        K: FrameSink<T> + ?Sized,
    {
        let slices = partition_static(plan.group_count(), self.workers);
        let workers = slices.len();
        let pool = ParallelConfig::with_threads(workers).build_pool(workers)?;

        info!(groups = plan.group_count(), workers, "Merging groups in parallel");

        let halt = AtomicBool::new(false);
        let capacity = workers * FRAMES_IN_FLIGHT_PER_WORKER;
        let (tx, rx) = mpsc::sync_channel::<Result<MergedFrame<T>>>(capacity);
        let mut groups_written = 0;
        let mut failure: Option<FrameMergeError> = None;

        pool.in_place_scope(|scope| {
            for (worker, slice) in slices.iter().enumerate() {
                let groups = &plan.groups[slice.clone()];
                let tx = tx.clone();
                let halt = &halt;
                let cancel = &self.cancel;
                scope.spawn(move |_| run_worker(worker, groups, source, &tx, halt, cancel));
            }
            drop(tx);

            // Single writer: drain until every worker has hung up
            for message in rx {
                if failure.is_some() {
                    continue;
                }
                match message.and_then(|merged| write_merged(sink, &merged)) {
                    Ok(()) => groups_written += 1,
                    Err(err) => {
                        halt.store(true, Ordering::SeqCst);
                        failure = Some(err);
                    }
                }
            }
        });

        if let Some(err) = failure {
            error!(error = %err, groups_written, "Parallel merge failed");
            return Err(err);
        }
        if groups_written < plan.group_count() {
            if self.cancel.is_cancelled() {
                info!(groups_written, "Merge cancelled");
                return Err(FrameMergeError::Cancelled);
            }
            return Err(FrameMergeError::ThreadPoolError(format!(
                "workers stopped after {groups_written} of {} groups",
                plan.group_count()
            )));
        }

        Ok(ScheduleStats {
            groups_written,
            workers,
        })
    }
}

fn run_worker<T, S>(
    worker: usize,
    groups: &[GroupDescriptor],
    source: &S,
    tx: &SyncSender<Result<MergedFrame<T>>>,
    halt: &AtomicBool,
    cancel: &CancellationToken,
) where
    T: FrameElement,
    S: FrameSource<T> + ?Sized,
{
    let (Some(first), Some(last)) = (groups.first(), groups.last()) else {
        return;
    };
    debug!(
        worker,
        first_group = first.group_index,
        last_group = last.group_index,
        "Worker started"
    );

    let mut reader = match source.open_reader() {
        Ok(reader) => reader,
        Err(err) => {
            halt.store(true, Ordering::SeqCst);
            let _ = tx.send(Err(err.in_group(first.group_index)));
            return;
        }
    };

    for group in groups {
        if halt.load(Ordering::SeqCst) || cancel.is_cancelled() {
            debug!(worker, next_group = group.group_index, "Worker stopping early");
            return;
        }

        let merged = reduce_group(reader.as_mut(), group);
        let failed = merged.is_err();
        if failed {
            halt.store(true, Ordering::SeqCst);
        }
        // A closed channel means the writer is gone
        if tx.send(merged).is_err() || failed {
            return;
        }
    }

    debug!(worker, "Worker finished");
}

fn write_merged<T, K>(sink: &mut K, merged: &MergedFrame<T>) -> Result<()>
where
    T: FrameElement,
    K: FrameSink<T> + ?Sized,
{
    sink.write_frame(merged.group_index, merged.data.view())
        .map_err(|err| err.in_group(merged.group_index))
}

fn check_compatible(
    plan: &GroupPlan,
    source: crate::data_source::FrameDims,
    sink: crate::data_source::FrameDims,
) -> Result<()> {
    if source.frame_shape() != sink.frame_shape() {
        return Err(FrameMergeError::ShapeMismatch {
            expected: source.frame_shape(),
            found: sink.frame_shape(),
        });
    }
    if sink.frames != plan.group_count() {
        return Err(FrameMergeError::SlotOutOfRange {
            index: plan.group_count(),
            slots: sink.frames,
        });
    }
    if let Some(last) = plan.groups.last() {
        if last.input_frames.end > source.frames {
            return Err(FrameMergeError::FrameRangeOutOfBounds {
                start: last.input_frames.start,
                end: last.input_frames.end,
                total: source.frames,
            });
        }
    }
    Ok(())
}
