//! Unit tests for the frame_merge building blocks
//!
//! Configuration parsing, group planning, frame reduction, work partitioning and
//! error attribution are covered here without touching any container file.

use frame_merge::{
    element::{ElementType, FrameElement},
    errors::{FrameMergeError, Result},
    parallel::{get_parallel_info, partition_static, ParallelConfig},
    planner::{plan, validate_grouping},
    reducer::reduce,
    DatasetLocation, ExecutionMode, MergeConfig, Merger, SkipPattern,
};
use ndarray::{array, Array3, Axis};
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_error_types() {
    let config_err = FrameMergeError::config("bad grouping");
    assert_eq!(
        format!("{config_err}"),
        "Invalid merge configuration: bad grouping"
    );

    let netcdf_err = FrameMergeError::from(netcdf::Error::NotFound("entry".to_string()));
    assert!(format!("{netcdf_err}").contains("NetCDF error"));
    assert!(netcdf_err.is_io());

    let missing = FrameMergeError::DatasetNotFound {
        file: "scan.nc".into(),
        dataset: "entry/data/data".to_string(),
    };
    assert_eq!(
        format!("{missing}"),
        "Dataset 'entry/data/data' not found in scan.nc"
    );
    assert!(!FrameMergeError::EmptyGroupError.is_io());
}

#[test]
fn test_group_attribution() {
    let err = FrameMergeError::EmptyGroupError.in_group(4);
    assert_eq!(err.group_index(), Some(4));
    assert!(format!("{err}").starts_with("Failed to merge group 4"));

    // Already attributed errors keep their original group
    let rewrapped = err.in_group(9);
    assert_eq!(rewrapped.group_index(), Some(4));

    let cancelled = FrameMergeError::Cancelled.in_group(2);
    assert!(matches!(cancelled, FrameMergeError::Cancelled));
    assert_eq!(cancelled.group_index(), None);

    let io = FrameMergeError::from(std::io::Error::other("disk full")).in_group(1);
    assert!(io.is_io());
}

#[test]
fn test_skip_pattern_parsing() -> Result<()> {
    let pattern = SkipPattern::parse("2, 0,2")?;
    assert_eq!(pattern.positions(), &[0, 2]);
    assert_eq!(pattern.to_string(), "0,2");
    assert!(pattern.contains(2));
    assert!(!pattern.contains(1));

    assert!(SkipPattern::parse("")?.is_empty());
    assert!(matches!(
        SkipPattern::parse("1,x"),
        Err(FrameMergeError::ConfigError { .. })
    ));
    assert!(SkipPattern::parse("-1").is_err());
    Ok(())
}

#[test]
fn test_dataset_location_paths() {
    let location = DatasetLocation::new("/entry//data/", "data");
    assert_eq!(location.group_path(), "entry/data");
    assert_eq!(location.group_components(), vec!["entry", "data"]);
    assert_eq!(location.full_path(), "entry/data/data");

    let root = DatasetLocation::new("", "frames");
    assert_eq!(root.full_path(), "frames");
    assert_eq!(DatasetLocation::default().to_string(), "entry/data/data");
}

#[test]
fn test_config_validation() {
    let valid = MergeConfig::new("scan.nc", "merged.nc")
        .with_frames_per_group(3)
        .with_skip_pattern(SkipPattern::new([1]));
    assert!(valid.validate().is_ok());

    let all_skipped = valid
        .clone()
        .with_skip_pattern(SkipPattern::new([0, 1, 2]));
    assert!(matches!(
        all_skipped.validate(),
        Err(FrameMergeError::ConfigError { .. })
    ));

    let outside = valid.clone().with_skip_pattern(SkipPattern::new([3]));
    assert!(outside.validate().is_err());

    assert!(valid.clone().with_frames_per_group(0).validate().is_err());
    assert!(valid.clone().with_compression(Some(12)).validate().is_err());
    assert!(valid
        .clone()
        .with_dataset(DatasetLocation::new("entry", "data/frames"))
        .validate()
        .is_err());
    assert!(MergeConfig::new("scan.nc", "scan.nc").validate().is_err());
}

#[test]
fn test_merger_rejects_invalid_config_before_io() {
    // The input does not exist, but validation fails first
    let config = MergeConfig::new("does-not-exist.nc", "merged.nc")
        .with_frames_per_group(3)
        .with_skip_pattern(SkipPattern::new([0, 1, 2]));

    assert!(matches!(
        Merger::new(config),
        Err(FrameMergeError::ConfigError { .. })
    ));
}

#[test]
fn test_compression_level() {
    let config = MergeConfig::new("a.nc", "b.nc");
    assert_eq!(config.compression_level(), Some(4));
    assert_eq!(config.clone().with_compression(Some(0)).compression_level(), None);
    assert_eq!(config.with_compression(None).compression_level(), None);
}

#[test]
fn test_config_from_json_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("merge.json");
    fs::write(
        &path,
        r#"{
            "input": "scan.nc",
            "frames_per_group": 3,
            "skip_pattern": [2, 0, 2],
            "mode": "sequential",
            "workers": 2
        }"#,
    )?;

    let config = MergeConfig::from_json_file(&path)?;
    assert_eq!(config.input, std::path::PathBuf::from("scan.nc"));
    assert_eq!(config.output, std::path::PathBuf::from("merged.nc"));
    assert_eq!(config.dataset, DatasetLocation::default());
    assert_eq!(config.frames_per_group, 3);
    assert_eq!(config.skip_pattern.positions(), &[0, 2]);
    assert_eq!(config.mode, ExecutionMode::Sequential);
    assert_eq!(config.workers, Some(2));
    assert_eq!(config.frame_limit, None);
    assert_eq!(config.compression, Some(4));
    config.validate()?;

    fs::write(&path, "{ not json")?;
    assert!(matches!(
        MergeConfig::from_json_file(&path),
        Err(FrameMergeError::ConfigFileError(_))
    ));
    Ok(())
}

#[test]
fn test_plan_with_single_skip() -> Result<()> {
    let plan = plan(9, 3, &SkipPattern::new([1]))?;

    assert_eq!(plan.group_count(), 3);
    assert_eq!(plan.dropped_groups, 0);
    let kept: Vec<Vec<usize>> = plan.groups.iter().map(|g| g.kept_frames.clone()).collect();
    assert_eq!(kept, vec![vec![0, 2], vec![3, 5], vec![6, 8]]);
    assert_eq!(plan.groups[1].input_frames, 3..6);
    assert_eq!(plan.groups[1].kept_positions(), vec![0, 2]);
    assert_eq!(plan.groups[2].kept_positions(), vec![0, 2]);
    assert_eq!(plan.frames_used(), 6);
    Ok(())
}

#[test]
fn test_plan_drops_empty_trailing_chunk() -> Result<()> {
    let plan = plan(10, 3, &SkipPattern::new([0]))?;

    assert_eq!(plan.group_count(), 3);
    assert_eq!(plan.dropped_groups, 1);
    assert_eq!(plan.groups.last().map(|g| g.input_frames.clone()), Some(6..9));
    Ok(())
}

#[test]
fn test_plan_keeps_short_trailing_chunk() -> Result<()> {
    let plan = plan(10, 3, &SkipPattern::new([2]))?;

    assert_eq!(plan.group_count(), 4);
    assert_eq!(plan.dropped_groups, 0);
    let last = &plan.groups[3];
    assert_eq!(last.group_index, 3);
    assert_eq!(last.input_frames, 9..10);
    assert_eq!(last.kept_frames, vec![9]);
    Ok(())
}

#[test]
fn test_plan_without_skips_and_edge_sizes() -> Result<()> {
    let plain = plan(6, 2, &SkipPattern::none())?;
    assert_eq!(plain.group_count(), 3);
    assert!(plain.groups.iter().all(|g| g.kept_frames.len() == 2));
    for (index, group) in plain.groups.iter().enumerate() {
        assert_eq!(group.group_index, index);
    }

    let empty = plan(0, 3, &SkipPattern::none())?;
    assert!(empty.is_empty());
    assert_eq!(empty.dropped_groups, 0);

    let single = plan(5, 1, &SkipPattern::none())?;
    assert_eq!(single.group_count(), 5);
    Ok(())
}

#[test]
fn test_validate_grouping_rejections() {
    assert!(validate_grouping(3, &SkipPattern::new([0, 1])).is_ok());
    assert!(validate_grouping(3, &SkipPattern::new([0, 1, 2])).is_err());
    assert!(validate_grouping(0, &SkipPattern::none()).is_err());
    assert!(plan(9, 3, &SkipPattern::new([5])).is_err());
}

#[test]
fn test_reduce_sums_frames() -> Result<()> {
    let frames = Array3::from_shape_vec(
        (3, 2, 2),
        vec![1, 2, 3, 4, 10, 20, 30, 40, 100, 200, 300, 400],
    )?;

    let merged = reduce(frames.view())?;
    assert_eq!(merged, array![[111, 222], [333, 444]]);

    // A single frame reduces to itself
    let one = reduce(frames.index_axis(Axis(0), 1).insert_axis(Axis(0)))?;
    assert_eq!(one, array![[10, 20], [30, 40]]);
    Ok(())
}

#[test]
fn test_reduce_saturates_narrow_integers() -> Result<()> {
    let bytes = Array3::from_shape_vec((2, 1, 2), vec![200u8, 1, 100, 2])?;
    assert_eq!(reduce(bytes.view())?, array![[255u8, 3]]);

    let signed = Array3::from_shape_vec((2, 1, 1), vec![-100i8, -100])?;
    assert_eq!(reduce(signed.view())?, array![[-128i8]]);

    let wide = Array3::from_shape_vec((2, 1, 1), vec![u64::MAX, 5])?;
    assert_eq!(reduce(wide.view())?, array![[u64::MAX]]);
    Ok(())
}

#[test]
fn test_reduce_floats() -> Result<()> {
    let frames = Array3::from_shape_vec((2, 1, 2), vec![0.5f32, 1.25, 0.25, -1.25])?;
    assert_eq!(reduce(frames.view())?, array![[0.75f32, 0.0]]);
    Ok(())
}

#[test]
fn test_reduce_empty_group() {
    let frames = Array3::<i32>::zeros((0, 2, 2));
    assert!(matches!(
        reduce(frames.view()),
        Err(FrameMergeError::EmptyGroupError)
    ));
}

#[test]
fn test_element_types() -> Result<()> {
    assert_eq!(
        ElementType::from_variable_type(&NcVariableType::Int(IntType::U16))?,
        ElementType::U16
    );
    assert_eq!(
        ElementType::from_variable_type(&NcVariableType::Float(FloatType::F64))?,
        ElementType::F64
    );
    assert!(matches!(
        ElementType::from_variable_type(&NcVariableType::String),
        Err(FrameMergeError::UnsupportedElementType(_))
    ));

    assert_eq!(<u16 as FrameElement>::ELEMENT_TYPE, ElementType::U16);
    assert_eq!(ElementType::I32.to_string(), "i32");
    assert_eq!(<i16 as FrameElement>::narrow(1 << 20), i16::MAX);
    Ok(())
}

#[test]
fn test_partition_static() {
    assert_eq!(partition_static(10, 3), vec![0..4, 4..7, 7..10]);
    assert_eq!(partition_static(2, 5), vec![0..1, 1..2]);
    assert_eq!(partition_static(4, 1), vec![0..4]);
    assert_eq!(partition_static(3, 0), vec![0..3]);
    assert!(partition_static(0, 4).is_empty());

    // Slices cover every item exactly once
    let slices = partition_static(17, 4);
    let covered: Vec<usize> = slices.into_iter().flatten().collect();
    assert_eq!(covered, (0..17).collect::<Vec<_>>());
}

#[test]
fn test_parallel_config() -> Result<()> {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());
    assert_eq!(default_config.worker_count(), num_cpus::get().max(1));

    assert_eq!(ParallelConfig::with_threads(4).worker_count(), 4);
    assert_eq!(ParallelConfig::with_threads(0).worker_count(), 1);

    let pool = ParallelConfig::with_threads(2).build_pool(2)?;
    assert_eq!(pool.current_num_threads(), 2);

    let info = get_parallel_info();
    assert!(info.available_cores > 0);
    assert!(info.available_parallelism > 0);
    Ok(())
}
