//! Partitioning of a frame stack into merge groups
//!
//! Frames `[0, total_frames)` are cut into contiguous chunks of `frames_per_group`
//! frames starting at frame 0. The same skip pattern is applied to every chunk. A short
//! trailing chunk keeps only the skip positions that fall inside it, and is dropped
//! (and counted) when nothing survives.

use crate::config::SkipPattern;
use crate::errors::{FrameMergeError, Result};
use std::ops::Range;

/// One output frame's worth of input frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    /// Output slot of the merged frame
    pub group_index: usize,
    /// Contiguous input frames covered by the group
    pub input_frames: Range<usize>,
    /// Input frames that survive the skip pattern, ascending
    pub kept_frames: Vec<usize>,
}

impl GroupDescriptor {
    /// Number of input frames covered, skipped ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_frames.is_empty()
    }

    /// Positions of the kept frames relative to the start of the group
    #[must_use]
    pub fn kept_positions(&self) -> Vec<usize> {
        self.kept_frames
            .iter()
            .map(|frame| frame - self.input_frames.start)
            .collect()
    }
}

/// Ordered groups of a merge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    /// Groups in ascending `group_index`, which is also their output slot
    pub groups: Vec<GroupDescriptor>,
    /// Trailing chunks with no surviving frame (0 or 1)
    pub dropped_groups: usize,
    pub total_frames: usize,
    pub frames_per_group: usize,
}

impl GroupPlan {
    /// Number of output frames
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Input frames that end up in some output frame
    #[must_use]
    pub fn frames_used(&self) -> usize {
        self.groups.iter().map(|group| group.kept_frames.len()).sum()
    }
}

/// Check that a grouping can always produce a non-empty full group
///
/// # Errors
///
/// Returns a [`FrameMergeError::ConfigError`] if `frames_per_group` is zero, a skip
/// position lies outside the group, or the pattern skips every position.
pub fn validate_grouping(frames_per_group: usize, skip_pattern: &SkipPattern) -> Result<()> {
    if frames_per_group == 0 {
        return Err(FrameMergeError::config(
            "frames per group must be a positive integer",
        ));
    }
    if let Some(&position) = skip_pattern
        .positions()
        .iter()
        .find(|&&p| p >= frames_per_group)
    {
        return Err(FrameMergeError::config(format!(
            "skip position {position} is outside a group of {frames_per_group} frames"
        )));
    }
    if skip_pattern.len() >= frames_per_group {
        return Err(FrameMergeError::config(format!(
            "skip pattern [{skip_pattern}] removes all {frames_per_group} frames of every group"
        )));
    }
    Ok(())
}

/// Compute the ordered merge groups for a stack of `total_frames` frames
///
/// # Errors
///
/// Returns a [`FrameMergeError::ConfigError`] when the grouping is invalid, see
/// [`validate_grouping`].
pub fn plan(
    total_frames: usize,
    frames_per_group: usize,
    skip_pattern: &SkipPattern,
) -> Result<GroupPlan> {
    validate_grouping(frames_per_group, skip_pattern)?;

    let mut groups = Vec::with_capacity(total_frames.div_ceil(frames_per_group));
    let mut dropped_groups = 0;

    for start in (0..total_frames).step_by(frames_per_group) {
        let end = (start + frames_per_group).min(total_frames);
        let kept_frames: Vec<usize> = (start..end)
            .filter(|frame| !skip_pattern.contains(frame - start))
            .collect();

        if kept_frames.is_empty() {
            // Only a short trailing chunk can end up here
            dropped_groups += 1;
            continue;
        }

        groups.push(GroupDescriptor {
            group_index: start / frames_per_group,
            input_frames: start..end,
            kept_frames,
        });
    }

    Ok(GroupPlan {
        groups,
        dropped_groups,
        total_frames,
        frames_per_group,
    })
}
