//! The merge facade: configuration in, merged container out
//!
//! A [`Merger`] owns one validated [`MergeConfig`] and runs it exactly once:
//!
//! ```text
//! Configured -> Running -> Completed
//!                       -> Failed
//! ```
//!
//! Input and output handles live inside the run and are closed on every exit path.

use crate::config::{ExecutionMode, MergeConfig};
use crate::element::{ElementType, FrameElement};
use crate::errors::{FrameMergeError, Result};
use crate::netcdf_io::{MergeProvenance, NetcdfFrameSink, NetcdfFrameSource};
use crate::parallel::ParallelConfig;
use crate::planner::{self, GroupPlan};
use crate::scheduler::{CancellationToken, MergeScheduler, ScheduleStats};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{fs, io};
use tracing::{error, info, warn};

/// Call a function generic over [`FrameElement`] with the Rust type of `element_type`
macro_rules! dispatch_element_type {
    ($element_type:expr, $func:ident ( $($arg:expr),* $(,)? )) => {
        match $element_type {
            ElementType::U8 => $func::<u8>($($arg),*),
            ElementType::I8 => $func::<i8>($($arg),*),
            ElementType::U16 => $func::<u16>($($arg),*),
            ElementType::I16 => $func::<i16>($($arg),*),
            ElementType::U32 => $func::<u32>($($arg),*),
            ElementType::I32 => $func::<i32>($($arg),*),
            ElementType::U64 => $func::<u64>($($arg),*),
            ElementType::I64 => $func::<i64>($($arg),*),
            ElementType::F32 => $func::<f32>($($arg),*),
            ElementType::F64 => $func::<f64>($($arg),*),
        }
    };
}

/// Lifecycle of a [`Merger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Configured,
    Running,
    Completed,
    /// A step failed or the run was cancelled; the output file is not valid
    Failed,
}

/// Summary of a completed merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub output: PathBuf,
    pub element_type: ElementType,
    /// Output frames written
    pub groups_written: usize,
    /// Trailing chunks with no surviving frame
    pub dropped_groups: usize,
    /// Input frames covered by the plan (after the frame limit)
    pub frames_considered: usize,
    /// Frames present in the input dataset
    pub frames_available: usize,
    /// Input frames that contributed to some output frame
    pub frames_used: usize,
    pub workers: usize,
    pub mode: ExecutionMode,
    pub elapsed: Duration,
}

impl MergeReport {
    /// Print a human readable summary to stdout
    pub fn print_summary(&self) {
        println!("Output file:        {}", self.output.display());
        println!("Element type:       {}", self.element_type);
        println!(
            "Frames considered:  {} of {} available",
            self.frames_considered, self.frames_available
        );
        println!("Frames merged:      {}", self.frames_used);
        println!("Groups written:     {}", self.groups_written);
        if self.dropped_groups > 0 {
            println!("Groups dropped:     {}", self.dropped_groups);
        }
        println!(
            "Execution:          {} ({} worker{})",
            self.mode.as_str(),
            self.workers,
            if self.workers == 1 { "" } else { "s" }
        );
        println!("Elapsed:            {:.3}s", self.elapsed.as_secs_f64());
    }
}

/// Runs one frame merge described by a [`MergeConfig`]
#[derive(Debug)]
pub struct Merger {
    config: MergeConfig,
    state: MergeState,
    cancel: CancellationToken,
}

impl Merger {
    /// Validate `config` and prepare a merge
    ///
    /// # Errors
    ///
    /// Returns a [`FrameMergeError::ConfigError`] if the configuration is invalid.
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: MergeState::Configured,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Token that cancels the run from another thread
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the merge in the configured execution mode
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; see [`Merger::run_parallel`].
    pub fn process(&mut self) -> Result<MergeReport> {
        self.run(self.config.mode)
    }

    /// Run the merge on the calling thread, one group after another
    ///
    /// # Errors
    ///
    /// See [`Merger::run_parallel`].
    pub fn run_sequential(&mut self) -> Result<MergeReport> {
        self.run(ExecutionMode::Sequential)
    }

    /// Run the merge over the configured number of workers
    ///
    /// # Errors
    ///
    /// Returns a [`FrameMergeError::ConfigError`] if the merger already ran, the input
    /// file does not exist or no group can be formed; container errors when the input
    /// cannot be opened or the output cannot be created; a
    /// [`FrameMergeError::MergeError`] naming the failed group; or
    /// [`FrameMergeError::Cancelled`].
    pub fn run_parallel(&mut self) -> Result<MergeReport> {
        self.run(ExecutionMode::Parallel)
    }

    fn run(&mut self, mode: ExecutionMode) -> Result<MergeReport> {
        if self.state != MergeState::Configured {
            return Err(FrameMergeError::config(
                "merger has already run; create a new one for another merge",
            ));
        }

        self.state = MergeState::Running;
        let started = Instant::now();

        match self.execute(mode, started) {
            Ok(report) => {
                self.state = MergeState::Completed;
                info!(
                    output = %report.output.display(),
                    groups = report.groups_written,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Merge completed"
                );
                Ok(report)
            }
            Err(err) => {
                self.state = MergeState::Failed;
                error!(error = %err, output = %self.config.output.display(), "Merge failed");
                Err(err)
            }
        }
    }

    fn execute(&self, mode: ExecutionMode, started: Instant) -> Result<MergeReport> {
        let config = &self.config;
        if !config.input.is_file() {
            return Err(FrameMergeError::config(format!(
                "input file {} does not exist",
                config.input.display()
            )));
        }
        if refers_to_same_file(&config.input, &config.output)? {
            return Err(FrameMergeError::config(format!(
                "output {} resolves to the input file {}",
                config.output.display(),
                config.input.display()
            )));
        }

        let source = NetcdfFrameSource::open(&config.input, &config.dataset)?;
        let frames_available = source.dims().frames;
        let frames_considered = effective_frame_count(config.frame_limit, frames_available);

        let plan = planner::plan(frames_considered, config.frames_per_group, &config.skip_pattern)?;
        if plan.dropped_groups > 0 {
            warn!(
                dropped = plan.dropped_groups,
                frames_per_group = config.frames_per_group,
                skip_pattern = %config.skip_pattern,
                "Dropped trailing chunk with no frames left after skipping"
            );
        }
        if plan.is_empty() {
            return Err(FrameMergeError::config(format!(
                "no merge group can be formed from {frames_considered} frames"
            )));
        }

        let workers = match mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => ParallelConfig::new(config.workers)
                .worker_count()
                .min(plan.group_count()),
        };
        let scheduler = MergeScheduler::new(workers).with_cancellation(self.cancel.clone());

        info!(
            input = %config.input.display(),
            output = %config.output.display(),
            frames = frames_considered,
            groups = plan.group_count(),
            frames_per_group = config.frames_per_group,
            skip_pattern = %config.skip_pattern,
            workers,
            "Starting merge"
        );

        let element_type = source.element_type();
        let (stats, output) = dispatch_element_type!(
            element_type,
            merge_typed(config, &source, &plan, &scheduler)
        )?;

        Ok(MergeReport {
            output,
            element_type,
            groups_written: stats.groups_written,
            dropped_groups: plan.dropped_groups,
            frames_considered,
            frames_available,
            frames_used: plan.frames_used(),
            workers: stats.workers,
            mode: if stats.workers > 1 {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
            elapsed: started.elapsed(),
        })
    }
}

fn merge_typed<T: FrameElement>(
    config: &MergeConfig,
    source: &NetcdfFrameSource,
    plan: &GroupPlan,
    scheduler: &MergeScheduler,
) -> Result<(ScheduleStats, PathBuf)> {
    let dims = source.dims().with_frames(plan.group_count());
    let mut sink = NetcdfFrameSink::<T>::create(
        &config.output,
        &config.dataset,
        dims,
        source.dimension_names(),
        config.compression_level(),
    )?;

    sink.copy_attributes(source.variable_attributes()?)?;
    sink.record_provenance(&MergeProvenance {
        source_file: config.input.clone(),
        source_frames: plan.total_frames,
        frames_per_group: plan.frames_per_group,
        skip_pattern: config.skip_pattern.to_string(),
        dropped_groups: plan.dropped_groups,
    })?;

    let stats = scheduler.run::<T, _, _>(plan, source, &mut sink)?;
    Ok((stats, sink.finish()))
}

/// Whether `output` names the existing file `input`, through any path alias
///
/// The output file itself may not exist yet, so its directory is resolved instead and
/// the file name appended. An existing output is also resolved directly, which catches
/// symlinks to the input.
fn refers_to_same_file(input: &Path, output: &Path) -> Result<bool> {
    let input = fs::canonicalize(input)?;

    match fs::canonicalize(output) {
        Ok(resolved) => return Ok(resolved == input),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let Some(name) = output.file_name() else {
        return Ok(false);
    };
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match fs::canonicalize(parent) {
        Ok(dir) => Ok(dir.join(name) == input),
        // The output cannot be created there either; leave that error to the sink
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Frames to consider given an optional limit and the frames actually present
fn effective_frame_count(limit: Option<usize>, available: usize) -> usize {
    match limit {
        Some(requested) if requested > available => {
            warn!(
                requested,
                available,
                "Fewer frames in the input than requested; merging all available frames"
            );
            available
        }
        Some(requested) => requested,
        None => available,
    }
}
