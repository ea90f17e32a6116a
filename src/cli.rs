//! Defines command-line interface options using `clap` for the frame_merge application.

use clap::Parser;
use frame_merge::{
    DatasetLocation, ExecutionMode, MergeConfig, SkipPattern, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_DATA_LOCATION, DEFAULT_DATA_NAME, DEFAULT_FRAMES_PER_GROUP,
};
use std::path::PathBuf;

/// Sum consecutive detector frames into merged frames
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = "frame_merge",
    about = "Merge groups of consecutive detector frames in a NetCDF-4 file"
)]
pub struct Args {
    /// Path to the input NetCDF-4 file
    #[arg(short, long, required_unless_present = "config")]
    pub file_name: Option<PathBuf>,

    /// Path of the merged output file. An existing file is replaced.
    #[arg(short, long, default_value = "merged.nc")]
    pub output_file: PathBuf,

    /// Only merge the first N frames. Defaults to every frame in the dataset.
    #[arg(long)]
    pub n_frames: Option<usize>,

    /// Number of consecutive frames summed into one output frame
    #[arg(short = 'n', long, default_value_t = DEFAULT_FRAMES_PER_GROUP)]
    pub n_merged_frames: usize,

    /// Zero-based in-group positions to leave out of the sum, e.g. "0,2"
    #[arg(short, long, value_parser = parse_skip_pattern)]
    pub skip_pattern: Option<SkipPattern>,

    /// Group path of the frame dataset inside the file
    #[arg(long, default_value = DEFAULT_DATA_LOCATION)]
    pub data_location: String,

    /// Name of the frame dataset
    #[arg(long, default_value = DEFAULT_DATA_NAME)]
    pub data_name: String,

    /// Number of worker threads. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub n_workers: Option<usize>,

    /// Merge one group after another on a single thread
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Deflate level of the output dataset (0 disables compression)
    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    pub compression: u8,

    /// Read the whole merge configuration from a JSON file instead of flags
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Build the merge configuration these arguments describe
    ///
    /// A configuration file, when given, is used as is.
    pub fn into_config(self) -> frame_merge::Result<MergeConfig> {
        if let Some(path) = &self.config {
            return MergeConfig::from_json_file(path);
        }

        let input = self
            .file_name
            .ok_or_else(|| frame_merge::FrameMergeError::config("no input file given"))?;

        Ok(MergeConfig::new(input, self.output_file)
            .with_dataset(DatasetLocation::new(self.data_location, self.data_name))
            .with_frames_per_group(self.n_merged_frames)
            .with_skip_pattern(self.skip_pattern.unwrap_or_default())
            .with_frame_limit(self.n_frames)
            .with_workers(self.n_workers)
            .with_mode(if self.sequential {
                ExecutionMode::Sequential
            } else {
                ExecutionMode::Parallel
            })
            .with_compression(Some(self.compression)))
    }
}

fn parse_skip_pattern(s: &str) -> Result<SkipPattern, String> {
    SkipPattern::parse(s).map_err(|e| e.to_string())
}
