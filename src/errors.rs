//! Centralized error handling for frame merging
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is the
//! structured [`FrameMergeError`]. Configuration problems are reported before any
//! container I/O; per-group failures are wrapped in [`FrameMergeError::MergeError`] so
//! the offending group index travels with the underlying cause.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for frame merge operations
#[derive(Debug, Error)]
pub enum FrameMergeError {
    /// Invalid frames-per-group, skip pattern, dataset location or combination thereof
    #[error("Invalid merge configuration: {message}")]
    ConfigError { message: String },

    /// A reduction was asked to combine zero frames
    #[error("Cannot reduce an empty group of frames")]
    EmptyGroupError,

    /// A specific merge group failed while being read or reduced
    #[error("Failed to merge group {group_index}: {source}")]
    MergeError {
        group_index: usize,
        source: Box<FrameMergeError>,
    },

    /// NetCDF/HDF5 container errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// File-system level I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The configured dataset does not exist in the container
    #[error("Dataset '{dataset}' not found in {}", .file.display())]
    DatasetNotFound { file: PathBuf, dataset: String },

    /// The dataset exists but is not a usable frame stack
    #[error("Invalid dataset '{dataset}': {message}")]
    InvalidDataset { dataset: String, message: String },

    /// The dataset element type has no frame reduction
    #[error("Unsupported element type: {0}")]
    UnsupportedElementType(String),

    /// A read asked for frames past the end of the stack
    #[error("Frame range {start}..{end} out of bounds (total frames: {total})")]
    FrameRangeOutOfBounds {
        start: usize,
        end: usize,
        total: usize,
    },

    /// A write addressed an output slot that was never allocated
    #[error("Output slot {index} out of range (slots: {slots})")]
    SlotOutOfRange { index: usize, slots: usize },

    /// Frames of different spatial shape were combined or written
    #[error("Frame shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Malformed JSON configuration file
    #[error("Configuration file error: {0}")]
    ConfigFileError(#[from] serde_json::Error),

    /// The run was cancelled before every group was written
    #[error("Merge run was cancelled; output is incomplete")]
    Cancelled,
}

impl FrameMergeError {
    /// Shorthand for a [`FrameMergeError::ConfigError`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Wrap a per-group failure with the index of the group that produced it
    pub fn in_group(self, group_index: usize) -> Self {
        match self {
            // Already attributed, or not a group failure at all
            err @ (Self::MergeError { .. } | Self::Cancelled) => err,
            err => Self::MergeError {
                group_index,
                source: Box::new(err),
            },
        }
    }

    /// Index of the merge group that failed, if the error is attributed to one
    #[must_use]
    pub fn group_index(&self) -> Option<usize> {
        match self {
            Self::MergeError { group_index, .. } => Some(*group_index),
            _ => None,
        }
    }

    /// Whether the error originates at the container or file-system boundary
    #[must_use]
    pub fn is_io(&self) -> bool {
        match self {
            Self::NetCDFError(_) | Self::IoError(_) | Self::DatasetNotFound { .. } => true,
            Self::MergeError { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

/// Result type alias for frame merge operations
pub type Result<T> = std::result::Result<T, FrameMergeError>;
