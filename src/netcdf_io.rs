//! NetCDF-4 frame I/O
//!
//! NetCDF-4 files are HDF5 files, so detector stacks written as `entry/data/data`
//! style datasets are addressed the same way here: a group path plus a variable name.
//! [`NetcdfFrameSource`] owns the read-only input handle and opens one extra handle per
//! worker; [`NetcdfFrameSink`] owns the single output handle.

use crate::config::DatasetLocation;
use crate::data_source::{check_slot, FrameDims, FrameReader, FrameSink, FrameSource};
use crate::element::{ElementType, FrameElement};
use crate::errors::{FrameMergeError, Result};
use chrono::Utc;
use ndarray::{Array3, ArrayView2};
use netcdf::{AttributeValue, File, FileMut, GroupMut};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{debug, info, warn};

/// Input frame stack inside a NetCDF-4 container
#[derive(Debug)]
pub struct NetcdfFrameSource {
    file: File,
    path: PathBuf,
    variable_path: String,
    dims: FrameDims,
    dim_names: [String; 3],
    element_type: ElementType,
}

impl NetcdfFrameSource {
    /// Open `location` inside the container at `path` and check it is a frame stack
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the dataset is missing, is not
    /// three dimensional, or has an unsupported element type.
    pub fn open(path: &Path, location: &DatasetLocation) -> Result<Self> {
        let file = netcdf::open(path)?;
        let variable_path = location.full_path();

        let (dims, dim_names, element_type) = {
            let var = file
                .variable(&variable_path)
                .ok_or_else(|| FrameMergeError::DatasetNotFound {
                    file: path.to_path_buf(),
                    dataset: variable_path.clone(),
                })?;

            let shape: Vec<usize> = var.dimensions().iter().map(netcdf::Dimension::len).collect();
            let &[frames, height, width] = shape.as_slice() else {
                return Err(FrameMergeError::InvalidDataset {
                    dataset: variable_path,
                    message: format!("expected 3 dimensions (frame, y, x), found shape {shape:?}"),
                });
            };
            if height == 0 || width == 0 {
                return Err(FrameMergeError::InvalidDataset {
                    dataset: variable_path,
                    message: format!("frames have empty spatial shape {height}x{width}"),
                });
            }

            let names: Vec<String> = var
                .dimensions()
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            let dim_names = [names[0].clone(), names[1].clone(), names[2].clone()];
            let element_type = ElementType::from_variable_type(&var.vartype())?;

            (FrameDims::new(frames, height, width), dim_names, element_type)
        };

        info!(
            file = %path.display(),
            dataset = %variable_path,
            frames = dims.frames,
            height = dims.height,
            width = dims.width,
            dtype = %element_type,
            "Opened input frame stack"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            variable_path,
            dims,
            dim_names,
            element_type,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shape of the full input stack
    #[must_use]
    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Dimension names of the input variable, frame axis first
    #[must_use]
    pub fn dimension_names(&self) -> &[String; 3] {
        &self.dim_names
    }

    /// Attributes of the input variable, in file order
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute value cannot be read.
    pub fn variable_attributes(&self) -> Result<Vec<(String, AttributeValue)>> {
        let var = self
            .file
            .variable(&self.variable_path)
            .ok_or_else(|| FrameMergeError::DatasetNotFound {
                file: self.path.clone(),
                dataset: self.variable_path.clone(),
            })?;

        let mut attributes = Vec::new();
        for attr in var.attributes() {
            attributes.push((attr.name().to_string(), attr.value()?));
        }
        Ok(attributes)
    }
}

/// One worker's own read handle on the input container
struct NetcdfFrameReader<T> {
    file: File,
    path: PathBuf,
    variable_path: String,
    dims: FrameDims,
    _element: PhantomData<T>,
}

impl<T: FrameElement> FrameReader<T> for NetcdfFrameReader<T> {
    fn read_frames(&mut self, frames: Range<usize>) -> Result<Array3<T>> {
        self.dims.check_range(&frames)?;

        let var = self
            .file
            .variable(&self.variable_path)
            .ok_or_else(|| FrameMergeError::DatasetNotFound {
                file: self.path.clone(),
                dataset: self.variable_path.clone(),
            })?;

        let count = frames.len();
        let values = var.get_values::<T, _>((frames, 0..self.dims.height, 0..self.dims.width))?;
        Ok(Array3::from_shape_vec(
            (count, self.dims.height, self.dims.width),
            values,
        )?)
    }
}

impl<T: FrameElement> FrameSource<T> for NetcdfFrameSource {
    fn dims(&self) -> FrameDims {
        self.dims
    }

    fn open_reader(&self) -> Result<Box<dyn FrameReader<T> + '_>> {
        let file = netcdf::open(&self.path)?;
        Ok(Box::new(NetcdfFrameReader::<T> {
            file,
            path: self.path.clone(),
            variable_path: self.variable_path.clone(),
            dims: self.dims,
            _element: PhantomData,
        }))
    }
}

/// Provenance recorded on the output dataset
#[derive(Debug, Clone)]
pub struct MergeProvenance {
    pub source_file: PathBuf,
    pub source_frames: usize,
    pub frames_per_group: usize,
    pub skip_pattern: String,
    pub dropped_groups: usize,
}

/// Output frame stack inside a NetCDF-4 container
pub struct NetcdfFrameSink<T> {
    file: FileMut,
    path: PathBuf,
    variable_path: String,
    dims: FrameDims,
    _element: PhantomData<T>,
}

impl<T: FrameElement> NetcdfFrameSink<T> {
    /// Create the output container with a `dims`-shaped dataset at `location`
    ///
    /// An existing file at `path` is replaced. The dataset is allocated at its final
    /// size and chunked one frame per chunk; `compression` enables deflate with byte
    /// shuffling at the given level.
    ///
    /// # Errors
    ///
    /// Returns an error if the file, groups, dimensions or variable cannot be created.
    pub fn create(
        path: &Path,
        location: &DatasetLocation,
        dims: FrameDims,
        dim_names: &[String; 3],
        compression: Option<u8>,
    ) -> Result<Self> {
        if dims.frames == 0 {
            // A zero-length NetCDF dimension would silently become unlimited
            return Err(FrameMergeError::InvalidDataset {
                dataset: location.full_path(),
                message: "output stack must have at least one frame".to_string(),
            });
        }

        match fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "Replaced existing output file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut file = netcdf::create(path)?;
        create_group_path(&mut file, location)?;

        {
            let mut group = group_mut(&mut file, location)?;
            for (name, len) in dim_names.iter().zip([dims.frames, dims.height, dims.width]) {
                group.add_dimension(name, len)?;
            }

            let dim_refs: Vec<&str> = dim_names.iter().map(String::as_str).collect();
            let mut var = group.add_variable::<T>(&location.name, &dim_refs)?;
            var.set_chunking(&[1, dims.height, dims.width])?;
            if let Some(level) = compression {
                var.set_compression(i32::from(level), true)?;
            }
        }

        info!(
            file = %path.display(),
            dataset = %location.full_path(),
            frames = dims.frames,
            height = dims.height,
            width = dims.width,
            dtype = %T::ELEMENT_TYPE,
            "Created output frame stack"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            variable_path: location.full_path(),
            dims,
            _element: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy attributes of the input variable onto the output variable
    ///
    /// # Errors
    ///
    /// Returns an error if the output variable is missing or an attribute cannot be
    /// written.
    pub fn copy_attributes(&mut self, attributes: Vec<(String, AttributeValue)>) -> Result<()> {
        let mut var = self.variable_mut()?;
        for (name, value) in attributes {
            if let Err(err) = var.put_attribute(&name, value) {
                warn!(attribute = %name, error = %err, "Skipped input attribute");
            }
        }
        Ok(())
    }

    /// Record how the output was produced
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute cannot be written.
    pub fn record_provenance(&mut self, provenance: &MergeProvenance) -> Result<()> {
        {
            let mut var = self.variable_mut()?;
            var.put_attribute("frames_per_group", provenance.frames_per_group as u64)?;
            var.put_attribute("skip_pattern", provenance.skip_pattern.as_str())?;
            var.put_attribute("source_frames", provenance.source_frames as u64)?;
            var.put_attribute("dropped_groups", provenance.dropped_groups as u64)?;
        }

        self.file.add_attribute(
            "source_file",
            provenance.source_file.display().to_string(),
        )?;
        self.file.add_attribute(
            "history",
            format!("Created by frame_merge on {}", Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    /// Flush and close the output container
    pub fn finish(self) -> PathBuf {
        let Self { file, path, .. } = self;
        drop(file);
        debug!(file = %path.display(), "Closed output frame stack");
        path
    }

    fn variable_mut(&mut self) -> Result<netcdf::VariableMut<'_>> {
        let path = self.path.clone();
        let dataset = self.variable_path.clone();
        self.file
            .variable_mut(&self.variable_path)
            .ok_or(FrameMergeError::DatasetNotFound {
                file: path,
                dataset,
            })
    }
}

impl<T: FrameElement> FrameSink<T> for NetcdfFrameSink<T> {
    fn dims(&self) -> FrameDims {
        self.dims
    }

    fn write_frame(&mut self, group_index: usize, frame: ArrayView2<'_, T>) -> Result<()> {
        check_slot(self.dims, group_index, &frame)?;

        let (height, width) = self.dims.frame_shape();
        let contiguous = frame.as_standard_layout();
        let values = contiguous
            .as_slice()
            .ok_or_else(|| FrameMergeError::ShapeMismatch {
                expected: (height, width),
                found: frame.dim(),
            })?;

        let mut var = self.variable_mut()?;
        var.put_values(values, (group_index..group_index + 1, 0..height, 0..width))?;
        Ok(())
    }
}

/// Create every group along the location's group path that does not exist yet
fn create_group_path(file: &mut FileMut, location: &DatasetLocation) -> Result<()> {
    let mut prefix = String::new();
    for component in location.group_components() {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(component);

        if file.group(&prefix)?.is_none() {
            file.add_group(&prefix)?;
        }
    }
    Ok(())
}

fn group_mut<'f>(file: &'f mut FileMut, location: &DatasetLocation) -> Result<GroupMut<'f>> {
    let group_path = location.group_path();
    let group = if group_path.is_empty() {
        file.root_mut()
    } else {
        file.group_mut(&group_path)?
    };
    group.ok_or_else(|| FrameMergeError::InvalidDataset {
        dataset: location.full_path(),
        message: format!("group '{group_path}' could not be opened for writing"),
    })
}
