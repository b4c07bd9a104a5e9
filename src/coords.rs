//! Coordinate bridge
//!
//! The native coordinate system record is not interpreted here. Instead the
//! service writes a one-pixel-per-axis scratch image carrying the record,
//! exports it to FITS with the polarization axis left in place, and the
//! coordinate system is read back from that FITS header.

use crate::errors::Result;
use crate::service::{CoordinateSystem, ImageTool};
use crate::wcs::Wcs;
use ndarray::{ArrayD, IxDyn};
use tracing::debug;

/// Convert a native coordinate system record to a [`Wcs`].
///
/// Scratch files live in a temporary directory removed on return.
pub fn wcs_from_coordsys<T: ImageTool + ?Sized>(tool: &T, csys: &CoordinateSystem) -> Result<Wcs> {
    let scratch = tempfile::Builder::new().prefix("casa_cube_wcs").tempdir()?;
    let image = scratch.path().join("coords.image");
    let fits = scratch.path().join("coords.fits");

    let pixels = ArrayD::<f32>::ones(IxDyn(&vec![1; csys.naxes()]));
    tool.new_image_from_array(&image, &pixels, csys)?;
    tool.export_fits(&image, &fits, false)?;

    let wcs = Wcs::from_fits_file(&fits)?;
    debug!(naxis = wcs.naxis(), "converted coordinate system");
    Ok(wcs)
}
