//! Worker pool configuration and static work partitioning
//!
//! Merges never touch Rayon's global thread pool: each parallel run builds its own
//! local pool sized to the configured worker count, so concurrent merges in one
//! process cannot interfere with each other.

use crate::errors::{FrameMergeError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use tracing::debug;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker count; `None` means one worker per CPU core
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Resolve the configured worker count; 0 is treated as 1
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Build a local thread pool with `threads` workers
    ///
    /// # Errors
    ///
    /// Returns [`FrameMergeError::ThreadPoolError`] if the pool cannot be created.
    pub fn build_pool(&self, threads: usize) -> Result<ThreadPool> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("frame-merge-worker-{index}"))
            .build()
            .map_err(|e| {
                FrameMergeError::ThreadPoolError(format!(
                    "Failed to initialize thread pool with {threads} threads: {e}"
                ))
            })?;

        debug!(threads, "Built merge worker pool");
        Ok(pool)
    }
}

/// Split `len` items into at most `parts` contiguous, near-equal slices
///
/// Earlier slices take the remainder, so slice lengths differ by at most one. No
/// empty slice is produced; zero items yield no slices.
#[must_use]
pub fn partition_static(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, len.max(1));
    if len == 0 {
        return Vec::new();
    }

    let base = len / parts;
    let remainder = len % parts;
    let mut slices = Vec::with_capacity(parts);
    let mut start = 0;
    for part in 0..parts {
        let size = base + usize::from(part < remainder);
        slices.push(start..start + size);
        start += size;
    }
    slices
}

/// Get information about the current parallel environment
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information
    pub fn log(&self) {
        debug!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "Parallel processing environment"
        );
    }
}
