//! Axis arrangement helpers for cube assembly
//!
//! Arrays are in conventional order (slowest axis first), so array axis `k`
//! of an `n`-axis image corresponds to FITS axis `n - 1 - k`.

use crate::data_source::{ArraySource, Element, LazyView};
use crate::errors::{CubeError, Result};
use crate::wcs::{AxisKind, Stokes, Wcs};
use tracing::debug;

fn fits_to_array(naxis: usize, fits_axis: usize) -> usize {
    naxis - 1 - fits_axis
}

/// FITS-order axis permutation putting a 3-axis system into
/// (longitude, latitude, spectral) order
fn orientation(wcs: &Wcs) -> Result<[usize; 3]> {
    if wcs.naxis() != 3 {
        return Err(CubeError::UnsupportedAxes {
            message: format!("orientation needs 3 axes, got {}", wcs.naxis()),
        });
    }
    let find = |kind: AxisKind| {
        wcs.find_axis(kind).ok_or_else(|| CubeError::UnsupportedAxes {
            message: format!(
                "no {kind:?} axis among {:?}",
                wcs.axes.iter().map(|a| a.ctype.as_str()).collect::<Vec<_>>()
            ),
        })
    };
    Ok([
        find(AxisKind::Longitude)?,
        find(AxisKind::Latitude)?,
        find(AxisKind::Spectral)?,
    ])
}

/// Lazily transpose `data` so the array is (spectral, latitude, longitude)
/// and return the matching coordinate system
pub fn orient<E: Element>(data: &LazyView<E>, wcs: &Wcs) -> Result<(LazyView<E>, Wcs)> {
    let target = orientation(wcs)?;
    let n = target.len();
    let perm: Vec<usize> = (0..n)
        .map(|k| fits_to_array(n, target[n - 1 - k]))
        .collect();

    if perm.iter().enumerate().all(|(k, &p)| k == p) {
        return Ok((data.clone(), wcs.clone()));
    }
    debug!(?perm, "reorienting cube axes");
    Ok((data.permuted(&perm)?, wcs.reorder(&target)?))
}

/// Split a 4-axis array along its polarization axis
///
/// Returns one lazy 3-axis view per component, labelled from the
/// polarization axis world values, and the coordinate system with that axis
/// removed.
pub fn split_stokes<E: Element>(
    data: &LazyView<E>,
    wcs: &Wcs,
) -> Result<(Vec<(Stokes, LazyView<E>)>, Wcs)> {
    let stokes_axis = wcs
        .find_axis(AxisKind::Stokes)
        .ok_or_else(|| CubeError::UnsupportedAxes {
            message: "4-axis image without a STOKES axis".to_string(),
        })?;
    if data.ndim() != wcs.naxis() {
        return Err(CubeError::ShapeMismatch {
            message: format!(
                "{}-axis array with a {}-axis coordinate system",
                data.ndim(),
                wcs.naxis()
            ),
        });
    }

    let array_axis = fits_to_array(wcs.naxis(), stokes_axis);
    let n_stokes = data.shape()[array_axis];
    let labels = wcs.stokes_labels(n_stokes)?;

    let components = labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| Ok((label, data.index_axis(array_axis, i)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok((components, wcs.drop_axis(stokes_axis)?))
}
