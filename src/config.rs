//! Merge configuration
//!
//! [`MergeConfig`] is the single validated value every component receives. It is built
//! once at the boundary, either from command-line flags or from a JSON file, and is
//! never re-parsed inside the merge engine.

use crate::errors::{FrameMergeError, Result};
use crate::planner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default group path of the frame dataset inside the container
pub const DEFAULT_DATA_LOCATION: &str = "entry/data";
/// Default name of the frame dataset
pub const DEFAULT_DATA_NAME: &str = "data";
/// Default number of input frames combined into one output frame
pub const DEFAULT_FRAMES_PER_GROUP: usize = 10;
/// Default deflate level of the output dataset
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 4;

/// Location of a dataset inside a container: a group path plus a dataset name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLocation {
    /// Slash separated group path, empty for the root group
    #[serde(default = "default_group")]
    pub group: String,
    /// Dataset (variable) name inside the group
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_group() -> String {
    DEFAULT_DATA_LOCATION.to_string()
}

fn default_name() -> String {
    DEFAULT_DATA_NAME.to_string()
}

impl DatasetLocation {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Group path with leading, trailing and repeated slashes removed
    #[must_use]
    pub fn group_path(&self) -> String {
        self.group_components().join("/")
    }

    /// Individual group names from the root down
    pub fn group_components(&self) -> Vec<&str> {
        self.group.split('/').filter(|part| !part.is_empty()).collect()
    }

    /// Full path of the dataset, e.g. `entry/data/data`
    #[must_use]
    pub fn full_path(&self) -> String {
        let group = self.group_path();
        if group.is_empty() {
            self.name.clone()
        } else {
            format!("{group}/{}", self.name)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(FrameMergeError::config(format!(
                "dataset name '{}' must be a single non-empty path component",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for DatasetLocation {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_LOCATION, DEFAULT_DATA_NAME)
    }
}

impl fmt::Display for DatasetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

/// Ordered, deduplicated set of in-group positions excluded from the sum
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct SkipPattern(Vec<usize>);

impl SkipPattern {
    /// Build a pattern from positions in any order, dropping duplicates
    pub fn new(positions: impl IntoIterator<Item = usize>) -> Self {
        let mut positions: Vec<usize> = positions.into_iter().collect();
        positions.sort_unstable();
        positions.dedup();
        Self(positions)
    }

    /// An empty pattern: every frame of a group is kept
    #[must_use]
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Parse a comma separated list of zero-based positions, e.g. `"0,2"`
    ///
    /// # Errors
    ///
    /// Returns a [`FrameMergeError::ConfigError`] if any entry is not a non-negative
    /// integer.
    pub fn parse(list: &str) -> Result<Self> {
        let mut positions = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let position = part.parse::<usize>().map_err(|_| {
                FrameMergeError::config(format!(
                    "skip pattern entry '{part}' is not a non-negative integer"
                ))
            })?;
            positions.push(position);
        }
        Ok(Self::new(positions))
    }

    /// Positions in ascending order
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        self.0.binary_search(&position).is_ok()
    }
}

impl From<Vec<usize>> for SkipPattern {
    fn from(positions: Vec<usize>) -> Self {
        Self::new(positions)
    }
}

impl From<SkipPattern> for Vec<usize> {
    fn from(pattern: SkipPattern) -> Self {
        pattern.0
    }
}

impl fmt::Display for SkipPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// How groups are distributed over workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One group after another on the calling thread
    Sequential,
    /// Static partition of the groups over a worker pool
    #[default]
    Parallel,
}

impl ExecutionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

/// Complete configuration of one merge run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Input container path
    pub input: PathBuf,
    /// Output container path, replaced if it exists
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Dataset location, shared by input and output
    #[serde(default)]
    pub dataset: DatasetLocation,
    /// Number of consecutive input frames per output frame
    #[serde(default = "default_frames_per_group")]
    pub frames_per_group: usize,
    /// In-group positions excluded from the sum
    #[serde(default)]
    pub skip_pattern: SkipPattern,
    /// Only the first `frame_limit` input frames are considered
    #[serde(default)]
    pub frame_limit: Option<usize>,
    /// Worker count; `None` uses every CPU core, 0 or 1 runs sequentially
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Deflate level (1-9) of the output dataset; `None` or 0 disables compression
    #[serde(default = "default_compression")]
    pub compression: Option<u8>,
}

fn default_output() -> PathBuf {
    PathBuf::from("merged.nc")
}

fn default_frames_per_group() -> usize {
    DEFAULT_FRAMES_PER_GROUP
}

#[allow(clippy::unnecessary_wraps)]
fn default_compression() -> Option<u8> {
    Some(DEFAULT_COMPRESSION_LEVEL)
}

impl MergeConfig {
    /// Configuration with the default grouping for the given input and output
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            dataset: DatasetLocation::default(),
            frames_per_group: DEFAULT_FRAMES_PER_GROUP,
            skip_pattern: SkipPattern::none(),
            frame_limit: None,
            workers: None,
            mode: ExecutionMode::Parallel,
            compression: default_compression(),
        }
    }

    #[must_use]
    pub fn with_frames_per_group(mut self, frames_per_group: usize) -> Self {
        self.frames_per_group = frames_per_group;
        self
    }

    #[must_use]
    pub fn with_skip_pattern(mut self, skip_pattern: SkipPattern) -> Self {
        self.skip_pattern = skip_pattern;
        self
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: DatasetLocation) -> Self {
        self.dataset = dataset;
        self
    }

    #[must_use]
    pub fn with_frame_limit(mut self, frame_limit: Option<usize>) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Option<u8>) -> Self {
        self.compression = compression;
        self
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Deflate level to apply, if any
    #[must_use]
    pub fn compression_level(&self) -> Option<u8> {
        self.compression.filter(|&level| level > 0)
    }

    /// Validate everything that can be checked without opening a container
    ///
    /// # Errors
    ///
    /// Returns a [`FrameMergeError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        planner::validate_grouping(self.frames_per_group, &self.skip_pattern)?;
        self.dataset.validate()?;

        if let Some(level) = self.compression {
            if level > 9 {
                return Err(FrameMergeError::config(format!(
                    "compression level {level} is outside 0-9"
                )));
            }
        }
        if self.input.as_os_str().is_empty() {
            return Err(FrameMergeError::config("input file path is empty"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(FrameMergeError::config("output file path is empty"));
        }
        if self.input == self.output {
            return Err(FrameMergeError::config(format!(
                "output {} would overwrite the input",
                self.output.display()
            )));
        }
        Ok(())
    }
}
