//! Writing cube masks back as images
//!
//! The cube's validity flags are written as a 16-bit FITS image on the
//! cube's coordinate system and imported through the service, either as a
//! standalone image or as a named mask inside an existing image.

use crate::cube::SpectralCube;
use crate::errors::{CubeError, Result};
use crate::service::{open_session, ImageSession, ImageTool};
use crate::wcs::{history_card, write_primary_image, WcsAxis};
use fitsio_pure::image::ImageData;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options for [`make_casa_mask`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskWriteOptions {
    /// Define the mask inside this image and make it the default mask
    /// instead of writing a standalone image
    pub append_to_image: Option<PathBuf>,
    /// Append a degenerate STOKES axis after the cube axes
    pub add_stokes: bool,
    /// Replace an existing mask image
    pub overwrite: bool,
}

impl MaskWriteOptions {
    #[must_use]
    pub fn append_to(mut self, image: impl Into<PathBuf>) -> Self {
        self.append_to_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn with_stokes(mut self, add_stokes: bool) -> Self {
        self.add_stokes = add_stokes;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Name a mask image is registered under inside the target image
fn mask_name(outname: &Path) -> String {
    outname
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "mask".to_string())
}

/// Write the validity mask of `cube` as the image `outname`.
///
/// `cube` is a [`SpectralCube`] or a [`LoadedCube`](crate::cube::LoadedCube);
/// a polarization cube contributes the mask of its primary component.
///
/// With [`MaskWriteOptions::append_to_image`] set, nothing is created at
/// `outname`: the mask is defined inside the target image under the file
/// stem of `outname` and made its default mask. The target must have the
/// mask's shape.
pub fn make_casa_mask<T, C>(
    tool: &T,
    cube: &C,
    outname: &Path,
    options: &MaskWriteOptions,
) -> Result<()>
where
    T: ImageTool + ?Sized,
    C: AsRef<SpectralCube> + ?Sized,
{
    let cube = cube.as_ref();
    let valid = cube.mask().include(&[])?;
    let values: Vec<i16> = valid.iter().map(|&v| i16::from(v)).collect();

    let mut shape: Vec<usize> = valid.shape().iter().rev().copied().collect();
    let mut wcs = cube.wcs().clone();
    if options.add_stokes {
        shape.push(1);
        wcs.axes.push(WcsAxis {
            ctype: "STOKES".to_string(),
            crval: 1.0,
            cdelt: 1.0,
            crpix: 1.0,
            cunit: String::new(),
        });
    }

    if let Some(target) = &options.append_to_image {
        let session = open_session(tool, target)?;
        let target_shape = session.shape()?;
        session.close()?;
        if target_shape != shape {
            return Err(CubeError::ShapeMismatch {
                message: format!(
                    "mask shape {shape:?} does not match image {} with shape {target_shape:?}",
                    target.display()
                ),
            });
        }
    }

    let mut cards = wcs.to_cards();
    cards.push(history_card(&format!(
        "Mask written by casa_cube {} on {}",
        env!("CARGO_PKG_VERSION"),
        Utc::now().to_rfc3339()
    )));

    let scratch = tempfile::Builder::new().prefix("casa_cube_mask").tempdir()?;
    let fits = scratch.path().join("mask.fits");
    write_primary_image(&fits, &shape, &ImageData::I16(values), &cards)?;

    match &options.append_to_image {
        Some(target) => {
            let staged = scratch.path().join("mask.image");
            tool.import_fits(&fits, &staged, true)?;
            let name = mask_name(outname);
            tool.define_mask(target, &name, &staged)?;
            info!(image = %target.display(), mask = %name, "set default mask");
        }
        None => {
            tool.import_fits(&fits, outname, options.overwrite)?;
            debug!(mask = %outname.display(), ?shape, "wrote mask image");
        }
    }
    Ok(())
}
