//! Loading images as cubes
//!
//! [`load_casa_image`] reads everything except pixels through one short
//! session (coordinate system, brightness unit, restoring beam), then builds
//! lazy data and mask arrays, converts the coordinate system, normalizes the
//! beam and assembles the cube. Pixels are fetched later, on demand.

use crate::beam::{normalize_beam, BeamInfo};
use crate::coords::wcs_from_coordsys;
use crate::cube::{assemble, CubeMeta, CubeParts, LoadedCube};
use crate::data_source::{ArraySource, LazyView};
use crate::errors::Result;
use crate::lazy_array::{CasaData, CasaMask};
use crate::service::{open_session, ImageSession, ImageTool};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether `path` names an image directory (by its `.image` suffix)
#[must_use]
pub fn is_casa_image(path: impl AsRef<Path>) -> bool {
    let text = path.as_ref().to_string_lossy();
    text.trim_end_matches('/').ends_with(".image")
}

/// Options for [`load_casa_image`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Do not read the validity mask; every pixel is treated as valid
    pub skip_valid: bool,
}

/// Non-fatal conditions found while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The image carries no restoring beam
    MissingBeam,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::MissingBeam => f.write_str("No beam information found in CASA image."),
        }
    }
}

/// A loaded cube and the warnings raised while loading it
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub cube: LoadedCube,
    pub warnings: Vec<LoadWarning>,
}

/// Load the image at `path` as a lazy cube.
///
/// # Errors
///
/// [`crate::CubeError::FileNotFound`] if the path does not exist, service
/// failures verbatim, beam normalization failures, and
/// [`crate::CubeError::UnsupportedDimensions`] for images that are not 3- or
/// 4-dimensional.
pub fn load_casa_image<T>(tool: Arc<T>, path: impl AsRef<Path>, options: &LoadOptions) -> Result<LoadedImage>
where
    T: ImageTool + 'static,
{
    let path = path.as_ref();

    let session = open_session(tool.as_ref(), path)?;
    let data: Arc<dyn ArraySource<f32>> = Arc::new(CasaData::new(Arc::clone(&tool), path)?);
    let mask = if options.skip_valid {
        None
    } else {
        let mask: Arc<dyn ArraySource<bool>> = Arc::new(CasaMask::new(Arc::clone(&tool), path)?);
        Some(LazyView::new(mask))
    };

    let coordsys = session.coordsys()?;
    let wcs = wcs_from_coordsys(tool.as_ref(), &coordsys)?;
    let unit = session.brightness_unit()?;
    let beam = normalize_beam(&session.restoring_beam()?)?;
    session.close()?;

    let mut warnings = Vec::new();
    if beam.is_missing() {
        warn!(path = %path.display(), "{}", LoadWarning::MissingBeam);
        warnings.push(LoadWarning::MissingBeam);
    }

    let beam_kind = match &beam {
        BeamInfo::NoBeam => "none",
        BeamInfo::Single(_) => "single",
        BeamInfo::Varying(_) => "per-channel",
    };
    let cube = assemble(CubeParts {
        data: LazyView::new(data),
        mask,
        wcs,
        meta: CubeMeta::new(path, &unit),
        beam,
    })?;
    info!(
        path = %path.display(),
        shape = ?cube.shape(),
        unit = %unit,
        beam = beam_kind,
        "loaded image"
    );

    Ok(LoadedImage { cube, warnings })
}
