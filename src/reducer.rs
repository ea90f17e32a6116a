//! Reduction of a merge group to a single frame
//!
//! Merging combines detector counts, so the reduction is a plain elementwise sum (never
//! a mean). The sum runs in the element type's widened accumulator and is narrowed
//! back to the storage type once per pixel.

use crate::data_source::FrameReader;
use crate::element::FrameElement;
use crate::errors::{FrameMergeError, Result};
use crate::planner::GroupDescriptor;
use ndarray::{Array2, ArrayView3, Axis};

/// A merged frame tagged with the output slot it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFrame<T> {
    pub group_index: usize,
    pub data: Array2<T>,
}

impl<T> MergedFrame<T> {
    /// Spatial shape `(height, width)`
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Sum a stack of frames (frame axis first) into one frame
///
/// Frames are folded in stack order, so the result does not depend on how groups were
/// scheduled.
///
/// # Errors
///
/// Returns [`FrameMergeError::EmptyGroupError`] if the stack holds no frames.
pub fn reduce<T: FrameElement>(frames: ArrayView3<'_, T>) -> Result<Array2<T>> {
    if frames.len_of(Axis(0)) == 0 {
        return Err(FrameMergeError::EmptyGroupError);
    }

    let totals = frames.fold_axis(Axis(0), T::Accumulator::default(), |&acc, &x| {
        acc + x.widen()
    });

    Ok(totals.mapv(T::narrow))
}

/// Read the frames of one group, drop the skipped ones and sum the rest
///
/// # Errors
///
/// Any read or reduction failure is returned as a [`FrameMergeError::MergeError`]
/// carrying the group index.
pub fn reduce_group<T, R>(reader: &mut R, group: &GroupDescriptor) -> Result<MergedFrame<T>>
where
    T: FrameElement,
    R: FrameReader<T> + ?Sized,
{
    let data = sum_kept_frames(reader, group).map_err(|err| err.in_group(group.group_index))?;
    Ok(MergedFrame {
        group_index: group.group_index,
        data,
    })
}

fn sum_kept_frames<T, R>(reader: &mut R, group: &GroupDescriptor) -> Result<Array2<T>>
where
    T: FrameElement,
    R: FrameReader<T> + ?Sized,
{
    let stack = reader.read_frames(group.input_frames.clone())?;
    if stack.len_of(Axis(0)) != group.len() {
        return Err(FrameMergeError::InvalidDataset {
            dataset: format!("frames {:?}", group.input_frames),
            message: format!(
                "reader returned {} frames instead of {}",
                stack.len_of(Axis(0)),
                group.len()
            ),
        });
    }

    if group.kept_frames.len() == group.len() {
        reduce(stack.view())
    } else {
        let kept = stack.select(Axis(0), &group.kept_positions());
        reduce(kept.view())
    }
}
