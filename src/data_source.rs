//! Frame source and sink abstractions
//!
//! The merge engine only sees these traits. [`FrameSource`] is a shareable,
//! read-only description of an input frame stack that hands out independent
//! [`FrameReader`] views, one per worker. [`FrameSink`] is the single writer of the
//! output stack. NetCDF implementations live in [`crate::netcdf_io`]; the in-memory
//! ones below back the tests and small in-process merges.

use crate::element::FrameElement;
use crate::errors::{FrameMergeError, Result};
use ndarray::{s, Array3, ArrayView2};
use std::ops::Range;

/// Shape of a frame stack: frame count × height × width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDims {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl FrameDims {
    #[must_use]
    pub const fn new(frames: usize, height: usize, width: usize) -> Self {
        Self {
            frames,
            height,
            width,
        }
    }

    /// Spatial shape of one frame
    #[must_use]
    pub const fn frame_shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Same spatial shape with a different frame count
    #[must_use]
    pub const fn with_frames(self, frames: usize) -> Self {
        Self { frames, ..self }
    }

    /// Check a frame range against the stack
    ///
    /// # Errors
    ///
    /// Returns [`FrameMergeError::FrameRangeOutOfBounds`] for empty, reversed or
    /// overlong ranges.
    pub fn check_range(&self, frames: &Range<usize>) -> Result<()> {
        if frames.start >= frames.end || frames.end > self.frames {
            return Err(FrameMergeError::FrameRangeOutOfBounds {
                start: frames.start,
                end: frames.end,
                total: self.frames,
            });
        }
        Ok(())
    }
}

/// Random access to a contiguous run of frames
pub trait FrameReader<T> {
    /// Read frames `frames.start..frames.end` as a `(n, height, width)` stack
    fn read_frames(&mut self, frames: Range<usize>) -> Result<Array3<T>>;
}

/// Read-only input frame stack shared by all workers
pub trait FrameSource<T>: Sync {
    /// Shape of the full stack
    fn dims(&self) -> FrameDims;

    /// Open an independent read view; each worker opens its own
    fn open_reader(&self) -> Result<Box<dyn FrameReader<T> + '_>>;
}

/// Output frame stack with one slot per merge group
pub trait FrameSink<T> {
    /// Shape of the output stack; `frames` is the number of slots
    fn dims(&self) -> FrameDims;

    /// Store `frame` in slot `group_index`, replacing whatever was there
    fn write_frame(&mut self, group_index: usize, frame: ArrayView2<'_, T>) -> Result<()>;
}

/// Validate a slot write against the sink shape
pub(crate) fn check_slot<T>(
    dims: FrameDims,
    group_index: usize,
    frame: &ArrayView2<'_, T>,
) -> Result<()> {
    if group_index >= dims.frames {
        return Err(FrameMergeError::SlotOutOfRange {
            index: group_index,
            slots: dims.frames,
        });
    }
    if frame.dim() != dims.frame_shape() {
        return Err(FrameMergeError::ShapeMismatch {
            expected: dims.frame_shape(),
            found: frame.dim(),
        });
    }
    Ok(())
}

/// Frame stack held in memory
#[derive(Debug, Clone)]
pub struct MemoryFrameSource<T> {
    frames: Array3<T>,
}

impl<T: FrameElement> MemoryFrameSource<T> {
    pub fn new(frames: Array3<T>) -> Self {
        Self { frames }
    }

    /// Stack of `count` frames where frame `i` is produced by `frame(i)`
    ///
    /// # Errors
    ///
    /// Returns an error if a produced frame does not have shape `(height, width)`.
    pub fn from_fn(
        count: usize,
        height: usize,
        width: usize,
        mut frame: impl FnMut(usize) -> ndarray::Array2<T>,
    ) -> Result<Self> {
        let mut frames = Array3::<T>::default((count, height, width));
        for (index, mut slot) in frames.outer_iter_mut().enumerate() {
            let data = frame(index);
            if data.dim() != (height, width) {
                return Err(FrameMergeError::ShapeMismatch {
                    expected: (height, width),
                    found: data.dim(),
                });
            }
            slot.assign(&data);
        }
        Ok(Self { frames })
    }

    #[must_use]
    pub fn frames(&self) -> &Array3<T> {
        &self.frames
    }
}

struct MemoryFrameReader<'a, T> {
    frames: &'a Array3<T>,
}

impl<T: FrameElement> FrameReader<T> for MemoryFrameReader<'_, T> {
    fn read_frames(&mut self, frames: Range<usize>) -> Result<Array3<T>> {
        let (count, height, width) = self.frames.dim();
        FrameDims::new(count, height, width).check_range(&frames)?;
        Ok(self.frames.slice(s![frames, .., ..]).to_owned())
    }
}

impl<T: FrameElement> FrameSource<T> for MemoryFrameSource<T> {
    fn dims(&self) -> FrameDims {
        let (frames, height, width) = self.frames.dim();
        FrameDims::new(frames, height, width)
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader<T> + '_>> {
        Ok(Box::new(MemoryFrameReader {
            frames: &self.frames,
        }))
    }
}

/// Output stack held in memory, tracking which slots were written
#[derive(Debug, Clone)]
pub struct MemoryFrameSink<T> {
    frames: Array3<T>,
    written: Vec<bool>,
}

impl<T: FrameElement> MemoryFrameSink<T> {
    /// Zero-filled sink with `dims.frames` slots
    pub fn new(dims: FrameDims) -> Self {
        Self {
            frames: Array3::default((dims.frames, dims.height, dims.width)),
            written: vec![false; dims.frames],
        }
    }

    /// Whether every slot has been written at least once
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|&w| w)
    }

    /// Slots that have not been written yet
    #[must_use]
    pub fn missing_slots(&self) -> Vec<usize> {
        self.written
            .iter()
            .enumerate()
            .filter_map(|(i, &w)| if w { None } else { Some(i) })
            .collect()
    }

    #[must_use]
    pub fn frames(&self) -> &Array3<T> {
        &self.frames
    }

    #[must_use]
    pub fn into_inner(self) -> Array3<T> {
        self.frames
    }
}

impl<T: FrameElement> FrameSink<T> for MemoryFrameSink<T> {
    fn dims(&self) -> FrameDims {
        let (frames, height, width) = self.frames.dim();
        FrameDims::new(frames, height, width)
    }

    fn write_frame(&mut self, group_index: usize, frame: ArrayView2<'_, T>) -> Result<()> {
        check_slot(FrameSink::dims(self), group_index, &frame)?;
        self.frames
            .slice_mut(s![group_index, .., ..])
            .assign(&frame);
        self.written[group_index] = true;
        Ok(())
    }
}
