//! Spectral moments

use crate::cube::SpectralCube;
use crate::errors::{CubeError, Result};
use crate::selection::Selector;
use crate::wcs::{AxisKind, Wcs};
use ndarray::{Array2, Ix2, Zip};
use rayon::prelude::*;
use std::fmt;
use tracing::{debug, info};

/// A 2-D map on the celestial axes of a cube, (latitude, longitude) order
#[derive(Debug, Clone)]
pub struct Projection {
    pub data: Array2<f32>,
    /// Celestial coordinate system, FITS order
    pub wcs: Wcs,
    pub unit: String,
}

/// Summary of the finite pixels of a projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionStats {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub valid: usize,
    pub total: usize,
}

impl Projection {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Min, max and mean over the finite pixels
    #[must_use]
    pub fn stats(&self) -> ProjectionStats {
        let (min, max, sum, valid) = self.data.iter().filter(|v| v.is_finite()).fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0_f64, 0_usize),
            |(min, max, sum, n), &v| (min.min(v), max.max(v), sum + f64::from(v), n + 1),
        );
        if valid == 0 {
            return ProjectionStats {
                min: f32::NAN,
                max: f32::NAN,
                mean: f64::NAN,
                valid,
                total: self.data.len(),
            };
        }
        ProjectionStats {
            min,
            max,
            mean: sum / valid as f64,
            valid,
            total: self.data.len(),
        }
    }
}

impl fmt::Display for ProjectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={} max={} mean={} ({} of {} pixels valid)",
            self.min, self.max, self.mean, self.valid, self.total
        )
    }
}

/// Zeroth moment: the sum over valid channels times the channel width.
///
/// Masked and non-finite pixels are skipped. A line of sight with no valid
/// channel gives NaN. The unit is the brightness unit times the spectral
/// axis unit.
pub fn moment0(cube: &SpectralCube) -> Result<Projection> {
    let wcs = cube.wcs();
    let spectral = wcs
        .find_axis(AxisKind::Spectral)
        .ok_or_else(|| CubeError::UnsupportedAxes {
            message: "moment 0 needs a spectral axis".to_string(),
        })?;
    let channel_width = wcs.axes[spectral].cdelt.abs();
    let spectral_unit = wcs.axes[spectral].cunit.clone();

    let shape = cube.shape();
    let (n_chan, ny, nx) = match shape {
        [c, y, x] => (*c, *y, *x),
        _ => {
            return Err(CubeError::ShapeMismatch {
                message: format!("moment 0 needs a 3-axis cube, got shape {shape:?}"),
            })
        }
    };
    debug!(n_chan, ny, nx, channel_width, "computing moment 0");

    let (sum, count) = (0..n_chan)
        .into_par_iter()
        .map(|channel| -> Result<(Array2<f64>, Array2<u32>)> {
            let plane = cube
                .filled_data(&[Selector::try_from(channel)?], f32::NAN)?
                .into_dimensionality::<Ix2>()?;
            let sum = plane.mapv(|v| if v.is_finite() { f64::from(v) } else { 0.0 });
            let count = plane.mapv(|v| u32::from(v.is_finite()));
            Ok((sum, count))
        })
        .try_reduce(
            || (Array2::<f64>::zeros((ny, nx)), Array2::<u32>::zeros((ny, nx))),
            |(sum_a, count_a), (sum_b, count_b)| Ok((sum_a + sum_b, count_a + count_b)),
        )?;

    #[allow(clippy::cast_possible_truncation)]
    let data = Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &n| if n == 0 { f32::NAN } else { (s * channel_width) as f32 });

    let unit = format!("{} {}", cube.unit(), spectral_unit).trim().to_string();
    info!(shape = ?data.shape(), %unit, "computed moment 0");
    Ok(Projection {
        data,
        wcs: wcs.drop_axis(spectral)?,
        unit,
    })
}
