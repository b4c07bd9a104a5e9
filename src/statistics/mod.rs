//! Statistical reductions over cubes
//!
//! - [`operations`]: reduction kinds and the [`StatisticalReduction`] trait
//! - [`parallel`]: NaN-skipping parallel kernels
//! - [`moments`]: spectral moments of a cube

pub mod moments;
pub mod operations;
pub mod parallel;

pub use moments::{moment0, Projection};
pub use operations::{reduce_cube, StatOperation, StatResult, StatisticalReduction};
pub use parallel::{parallel_max_axis, parallel_mean_axis, parallel_min_axis, parallel_sum_axis};
