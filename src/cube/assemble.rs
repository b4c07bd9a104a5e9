//! Cube assembly from lazy arrays, coordinates, metadata and beams

use super::utils::{orient, split_stokes};
use super::{BooleanArrayMask, CubeMeta, SpectralCube, StokesSpectralCube};
use crate::beam::BeamInfo;
use crate::data_source::{ArraySource, LazyView};
use crate::errors::{CubeError, Result};
use crate::wcs::Wcs;
use std::collections::BTreeMap;
use tracing::debug;

/// Everything needed to assemble a cube, arrays in conventional order
#[derive(Debug, Clone)]
pub struct CubeParts {
    pub data: LazyView<f32>,
    /// Validity flags; `None` means every pixel is valid
    pub mask: Option<LazyView<bool>>,
    /// Coordinate system of the full image, FITS order
    pub wcs: Wcs,
    pub meta: CubeMeta,
    pub beam: BeamInfo,
}

/// Result of loading an image
#[derive(Debug, Clone)]
pub enum LoadedCube {
    /// 3-axis image
    Spectral(SpectralCube),
    /// 4-axis image, one cube per polarization
    Stokes(StokesSpectralCube),
}

impl LoadedCube {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            LoadedCube::Spectral(cube) => cube.shape(),
            LoadedCube::Stokes(cube) => cube.shape(),
        }
    }

    #[must_use]
    pub fn wcs(&self) -> &Wcs {
        match self {
            LoadedCube::Spectral(cube) => cube.wcs(),
            LoadedCube::Stokes(cube) => cube.wcs(),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &CubeMeta {
        match self {
            LoadedCube::Spectral(cube) => cube.meta(),
            LoadedCube::Stokes(cube) => cube.meta(),
        }
    }

    /// The plain cube, or Stokes I (else the first component) of a
    /// polarization cube
    #[must_use]
    pub fn primary(&self) -> &SpectralCube {
        match self {
            LoadedCube::Spectral(cube) => cube,
            LoadedCube::Stokes(cube) => cube.primary(),
        }
    }

    #[must_use]
    pub fn as_spectral(&self) -> Option<&SpectralCube> {
        match self {
            LoadedCube::Spectral(cube) => Some(cube),
            LoadedCube::Stokes(_) => None,
        }
    }

    #[must_use]
    pub fn as_stokes(&self) -> Option<&StokesSpectralCube> {
        match self {
            LoadedCube::Stokes(cube) => Some(cube),
            LoadedCube::Spectral(_) => None,
        }
    }
}

impl AsRef<SpectralCube> for LoadedCube {
    fn as_ref(&self) -> &SpectralCube {
        self.primary()
    }
}

impl AsRef<SpectralCube> for SpectralCube {
    fn as_ref(&self) -> &SpectralCube {
        self
    }
}

fn build_cube(
    data: &LazyView<f32>,
    mask: Option<&LazyView<bool>>,
    wcs: &Wcs,
    meta: &CubeMeta,
    beam: &BeamInfo,
) -> Result<SpectralCube> {
    let (data, wcs_slice) = orient(data, wcs)?;
    let mask = match mask {
        Some(mask) => BooleanArrayMask::new(orient(mask, wcs)?.0, wcs_slice.clone()),
        None => BooleanArrayMask::all_valid(data.shape().to_vec(), wcs_slice.clone()),
    };
    SpectralCube::new(data, wcs_slice, mask, meta.clone(), beam.clone())
}

/// Assemble a cube from its parts.
///
/// 3-axis images give a [`LoadedCube::Spectral`], 4-axis images are split
/// along the polarization axis into a [`LoadedCube::Stokes`].
///
/// # Errors
///
/// [`CubeError::UnsupportedDimensions`] for any other axis count,
/// [`CubeError::ShapeMismatch`] or [`CubeError::WcsMismatch`] if the mask
/// does not line up with the data.
pub fn assemble(parts: CubeParts) -> Result<LoadedCube> {
    let CubeParts {
        data,
        mask,
        wcs,
        meta,
        beam,
    } = parts;

    match wcs.naxis() {
        3 => {
            let cube = build_cube(&data, mask.as_ref(), &wcs, &meta, &beam)?;
            if cube.mask().shape() != cube.shape() {
                return Err(CubeError::ShapeMismatch {
                    message: format!(
                        "mask shape {:?} differs from cube shape {:?}",
                        cube.mask().shape(),
                        cube.shape()
                    ),
                });
            }
            debug!(shape = ?cube.shape(), "assembled spectral cube");
            Ok(LoadedCube::Spectral(cube))
        }
        4 => {
            let (data_parts, wcs3) = split_stokes(&data, &wcs)?;
            let mask_parts = match &mask {
                Some(mask) => Some(split_stokes(mask, &wcs)?.0),
                None => None,
            };

            let mut components = BTreeMap::new();
            for (i, (label, component)) in data_parts.iter().enumerate() {
                let component_mask = mask_parts.as_ref().map(|parts| &parts[i].1);
                let cube = build_cube(component, component_mask, &wcs3, &meta, &beam)?;
                components.insert(*label, cube);
            }

            let cube = StokesSpectralCube::new(components)?;
            let primary = cube.primary();
            if primary.mask().shape() != cube.shape() {
                return Err(CubeError::ShapeMismatch {
                    message: format!(
                        "mask shape {:?} differs from cube shape {:?}",
                        primary.mask().shape(),
                        cube.shape()
                    ),
                });
            }
            if primary.mask().wcs() != cube.wcs() {
                return Err(CubeError::WcsMismatch {
                    message: "primary component mask is not on the cube's coordinate system"
                        .to_string(),
                });
            }
            debug!(shape = ?cube.shape(), stokes = ?cube.labels(), "assembled polarization cube");
            Ok(LoadedCube::Stokes(cube))
        }
        naxis => Err(CubeError::UnsupportedDimensions { naxis }),
    }
}
