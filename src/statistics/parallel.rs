//! Parallel reduction kernels
//!
//! Every kernel reduces the lanes of an array along one axis in parallel and
//! skips non-finite values. A lane without a single finite value reduces to
//! NaN.

use crate::errors::Result;
use ndarray::{ArrayD, ArrayView1, Axis, Zip};
use tracing::debug;

fn reduce_lanes<F>(data: &ArrayD<f32>, axis: usize, reduce: F) -> Result<ArrayD<f32>>
where
    F: Fn(ArrayView1<'_, f32>) -> f32 + Sync + Send,
{
    let output_size: usize = data
        .shape()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != axis)
        .map(|(_, &len)| len)
        .product();
    debug!(
        output_size,
        threads = rayon::current_num_threads(),
        "reducing along axis {axis}"
    );

    Ok(Zip::from(data.lanes(Axis(axis))).par_map_collect(reduce))
}

/// Mean along `axis`, accumulated in f64
pub fn parallel_mean_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    reduce_lanes(data, axis, |lane| {
        let (sum, count) = lane
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0_f64, 0_u32), |(sum, count), &v| (sum + f64::from(v), count + 1));
        if count > 0 {
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / f64::from(count)) as f32
            }
        } else {
            f32::NAN
        }
    })
}

/// Sum along `axis`, accumulated in f64
pub fn parallel_sum_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    reduce_lanes(data, axis, |lane| {
        let mut finite = lane.iter().filter(|v| v.is_finite()).peekable();
        if finite.peek().is_none() {
            return f32::NAN;
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            finite.map(|&v| f64::from(v)).sum::<f64>() as f32
        }
    })
}

/// Minimum along `axis`
pub fn parallel_min_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    reduce_lanes(data, axis, |lane| {
        let min = lane
            .iter()
            .filter(|v| v.is_finite())
            .fold(f32::INFINITY, |acc, &v| acc.min(v));
        if min == f32::INFINITY {
            f32::NAN
        } else {
            min
        }
    })
}

/// Maximum along `axis`
pub fn parallel_max_axis(data: &ArrayD<f32>, axis: usize) -> Result<ArrayD<f32>> {
    reduce_lanes(data, axis, |lane| {
        let max = lane
            .iter()
            .filter(|v| v.is_finite())
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        if max == f32::NEG_INFINITY {
            f32::NAN
        } else {
            max
        }
    })
}
