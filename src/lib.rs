//! frame_merge: summing consecutive detector frames into merged frames
//!
//! A detector writes a stack of 2-D frames (frame × y × x) into a NetCDF-4 container.
//! frame_merge cuts the stack into contiguous groups of `n` frames, drops the frames at
//! the configured in-group skip positions, sums the remaining frames of each group
//! pixel by pixel and writes one output frame per group to a new container.
//!
//! ## Key Features
//!
//! - **Deterministic output**: sequential and parallel runs produce identical files
//! - **Parallel Processing**: a local Rayon pool with static partitioning and a single writer
//! - **Skip patterns**: any set of in-group positions can be excluded from the sum
//! - **Integer safety**: sums accumulate in a widened type and saturate on narrowing
//! - **Provenance**: input attributes are carried over and the merge parameters recorded
//!
//! ## Module Organization
//!
//! - [`config`]: validated merge configuration, dataset locations and skip patterns
//! - [`planner`]: partitioning of a frame stack into merge groups
//! - [`reducer`]: summation of one group into a merged frame
//! - [`scheduler`]: sequential and parallel execution of a group plan
//! - [`merger`]: the facade tying configuration, containers and scheduling together
//! - [`data_source`]: frame source and sink traits plus in-memory implementations
//! - [`netcdf_io`]: NetCDF-4 frame source and sink
//! - [`element`]: supported element types and their accumulators
//! - [`parallel`]: worker pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use frame_merge::prelude::*;
//!
//! let config = MergeConfig::new("scan.nc", "merged.nc")
//!     .with_frames_per_group(3)
//!     .with_skip_pattern(SkipPattern::new([1]));
//!
//! let mut merger = Merger::new(config)?;
//! let report = merger.process()?;
//! report.print_summary();
//! # Ok::<(), frame_merge::FrameMergeError>(())
//! ```

// Core modules
pub mod config;
pub mod data_source;
pub mod element;
pub mod errors;
pub mod merger;
pub mod netcdf_io;
pub mod parallel;
pub mod planner;
pub mod reducer;
pub mod scheduler;

// Direct re-exports for the public API
pub use config::*;
pub use data_source::*;
pub use element::*;
pub use errors::*;
pub use merger::*;
pub use netcdf_io::*;
pub use parallel::*;
pub use planner::*;
pub use reducer::*;
pub use scheduler::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::{DatasetLocation, ExecutionMode, MergeConfig, SkipPattern};
    pub use crate::data_source::{
        FrameDims, FrameSink, FrameSource, MemoryFrameSink, MemoryFrameSource,
    };
    pub use crate::errors::{FrameMergeError, Result};
    pub use crate::merger::{MergeReport, MergeState, Merger};
    pub use crate::netcdf_io::{NetcdfFrameSink, NetcdfFrameSource};
    pub use crate::parallel::ParallelConfig;
    pub use crate::planner::{plan, GroupDescriptor, GroupPlan};
    pub use crate::scheduler::{CancellationToken, MergeScheduler};
}
