//! Reduction kinds and the axis-reduction trait

use crate::cube::SpectralCube;
use crate::errors::{CubeError, Result};
use crate::selection::Selector;
use ndarray::{ArrayD, Axis, IxDyn};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported statistical operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
}

impl StatOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "minimum",
            Self::Max => "maximum",
        }
    }
}

impl fmt::Display for StatOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatOperation {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "min" | "minimum" => Ok(Self::Min),
            "max" | "maximum" => Ok(Self::Max),
            other => Err(CubeError::InvalidSelection {
                message: format!("unknown statistic '{other}'"),
            }),
        }
    }
}

/// Result of reducing a cube along one axis
#[derive(Debug, Clone)]
pub struct StatResult<T> {
    pub data: ArrayD<T>,
    pub operation: StatOperation,
    /// Array axis that was reduced
    pub axis: usize,
    /// Unit of the reduced values
    pub unit: String,
}

impl<T> StatResult<T> {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }
}

/// Types that can be reduced along an axis
pub trait StatisticalReduction<T> {
    /// Reduce along `axis`, skipping non-finite values
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is out of bounds for the array.
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<T>>;
}

impl StatisticalReduction<f32> for ArrayD<f32> {
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f32>> {
        if axis >= self.ndim() {
            return Err(CubeError::IndexOutOfBounds {
                axis,
                index: i64::try_from(axis).unwrap_or(i64::MAX),
                size: self.ndim(),
            });
        }

        match operation {
            StatOperation::Mean => super::parallel::parallel_mean_axis(self, axis),
            StatOperation::Sum => super::parallel::parallel_sum_axis(self, axis),
            StatOperation::Min => super::parallel::parallel_min_axis(self, axis),
            StatOperation::Max => super::parallel::parallel_max_axis(self, axis),
        }
    }
}

/// Reduce the valid pixels of `cube` along array `axis`.
///
/// Masked pixels are treated as missing; a line of sight with no valid pixel
/// reduces to NaN. The cube is read one plane at a time across the first
/// axis that is not reduced, so at most one plane per worker is in memory.
pub fn reduce_cube(cube: &SpectralCube, axis: usize, operation: StatOperation) -> Result<StatResult<f32>> {
    let shape = cube.shape().to_vec();
    if axis >= shape.len() {
        return Err(CubeError::IndexOutOfBounds {
            axis,
            index: i64::try_from(axis).unwrap_or(i64::MAX),
            size: shape.len(),
        });
    }
    let outer = usize::from(axis == 0);
    // Position of the reduced axis inside one plane
    let inner_axis = if axis > outer { axis - 1 } else { axis };
    debug!(%operation, axis, outer, shape = ?shape, "reducing cube plane by plane");

    let mut result_shape = shape.clone();
    result_shape.remove(axis);
    if shape[outer] == 0 {
        return Ok(StatResult {
            data: ArrayD::from_elem(IxDyn(&result_shape), f32::NAN),
            operation,
            axis,
            unit: cube.unit().to_string(),
        });
    }

    let planes = (0..shape[outer])
        .into_par_iter()
        .map(|i| -> Result<ArrayD<f32>> {
            let mut selection = vec![Selector::all(); outer + 1];
            selection[outer] = Selector::try_from(i)?;
            cube.filled_data(&selection, f32::NAN)?
                .reduce_along_axis(inner_axis, operation)
        })
        .collect::<Result<Vec<_>>>()?;

    let views: Vec<_> = planes.iter().map(ArrayD::view).collect();
    // The outer axis always precedes the reduced one in the result
    let data = ndarray::stack(Axis(0), &views)?;
    Ok(StatResult {
        data,
        operation,
        axis,
        unit: cube.unit().to_string(),
    })
}
