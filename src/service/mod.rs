//! Image service abstraction
//!
//! The native image tool is consumed through two traits. [`ImageTool`] is the
//! stateless entry point: it opens sessions and performs whole-image
//! operations such as creating an image from an array or exporting to FITS.
//! [`ImageSession`] is one open handle on one image path.
//!
//! Sessions are never held across public operations. [`open_session`] wraps
//! the native handle in a [`Session`] guard that closes it when dropped, and
//! translates the service's "path does not exist" failure into
//! [`CubeError::FileNotFound`]. Every other open failure is passed through.
//!
//! The service speaks in its own axis order (fastest-varying axis first) and
//! its own region vocabulary, see [`Region`].

pub mod directory;

pub use directory::DirectoryImageTool;

use crate::errors::{CubeError, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by the image service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The requested path does not exist
    #[error("{} must be of cReqPath type: path does not exist", path.display())]
    PathNotFound { path: PathBuf },

    /// Region outside the image or with inconsistent bounds
    #[error("Invalid region: {message}")]
    InvalidRegion { message: String },

    /// Output already exists and overwriting was not requested
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// Image contents could not be decoded
    #[error("Malformed image: {message}")]
    Format { message: String },

    /// Underlying storage failure
    #[error("Image I/O error: {message}")]
    Io { message: String },

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(error: std::io::Error) -> Self {
        ServiceError::Io {
            message: error.to_string(),
        }
    }
}

/// Result type for raw service calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Native pixel types reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Float,
    Double,
    Complex,
    DComplex,
    Int,
    Bool,
}

impl PixelType {
    /// Name used by the native tool
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::Complex => "complex",
            Self::DComplex => "dcomplex",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }

    /// Size of one element in bytes
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Float | Self::Int => 4,
            Self::Double | Self::Complex => 8,
            Self::DComplex => 16,
            Self::Bool => 1,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rectangular region in the service's begin/end/stride vocabulary.
///
/// All three vectors are in native axis order. `blc` and `trc` are inclusive
/// pixel bounds; a value of `-1` in either means "the whole axis" for that
/// bound. `inc` is the stride, at least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub blc: Vec<i64>,
    pub trc: Vec<i64>,
    pub inc: Vec<i64>,
}

impl Region {
    /// Region covering every pixel of an image with `ndim` axes
    #[must_use]
    pub fn full(ndim: usize) -> Self {
        Self {
            blc: vec![-1; ndim],
            trc: vec![-1; ndim],
            inc: vec![1; ndim],
        }
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.blc.len()
    }
}

/// One axis of the native coordinate system record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateAxis {
    /// Descriptive axis name, e.g. "Right Ascension"
    pub name: String,
    /// FITS-style axis type code, e.g. "RA---SIN" or "STOKES"
    pub ctype: String,
    pub crval: f64,
    pub cdelt: f64,
    /// One-based reference pixel
    pub crpix: f64,
    #[serde(default)]
    pub unit: String,
}

/// Native coordinate system record, axes in native order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub axes: Vec<CoordinateAxis>,
    #[serde(default)]
    pub equinox: Option<f64>,
    #[serde(default)]
    pub rest_frequency: Option<f64>,
}

impl CoordinateSystem {
    /// Number of axes described by the record
    #[must_use]
    pub fn naxes(&self) -> usize {
        self.axes.len()
    }
}

/// One open handle on an image
pub trait ImageSession {
    /// Image shape in native axis order
    fn shape(&self) -> ServiceResult<Vec<usize>>;

    /// Native pixel type
    fn pixel_type(&self) -> ServiceResult<PixelType>;

    /// Native coordinate system record
    fn coordsys(&self) -> ServiceResult<CoordinateSystem>;

    /// Brightness unit string, e.g. "Jy/beam"
    fn brightness_unit(&self) -> ServiceResult<String>;

    /// Restoring beam record: a scalar `major`/`minor`/`positionangle`
    /// record, a `beams` table, or an empty record
    fn restoring_beam(&self) -> ServiceResult<JsonValue>;

    /// Pixel values inside `region`, in native axis order. Axes selected by a
    /// single index are returned with length 1.
    fn get_chunk(&self, region: &Region) -> ServiceResult<ArrayD<f32>>;

    /// Validity mask inside `region`, `true` where the pixel is good. Images
    /// without a mask report every pixel as good.
    fn get_mask_chunk(&self, region: &Region) -> ServiceResult<ArrayD<bool>>;

    /// Release the handle
    fn close(&mut self) -> ServiceResult<()>;
}

/// Entry point to the image service
pub trait ImageTool: Send + Sync {
    type Session: ImageSession;

    /// Open a session on the image at `path`
    fn open(&self, path: &Path) -> ServiceResult<Self::Session>;

    /// Create an image at `outfile` holding `pixels` (native order) tagged with `csys`
    fn new_image_from_array(
        &self,
        outfile: &Path,
        pixels: &ArrayD<f32>,
        csys: &CoordinateSystem,
    ) -> ServiceResult<()>;

    /// Export the image at `image` to a FITS file. When `stokes_last` is
    /// false the polarization axis keeps its native position.
    fn export_fits(&self, image: &Path, fitsfile: &Path, stokes_last: bool) -> ServiceResult<()>;

    /// Create an image at `outfile` from a FITS file
    fn import_fits(&self, fitsfile: &Path, outfile: &Path, overwrite: bool) -> ServiceResult<()>;

    /// Define a named mask inside `image` from the pixels of `source`
    /// (`> 0.5` is good) and make it the default mask
    fn define_mask(&self, image: &Path, mask_name: &str, source: &Path) -> ServiceResult<()>;
}

/// Scoped session: closes the native handle on drop
pub struct Session<S: ImageSession> {
    inner: Option<S>,
    path: PathBuf,
}

impl<S: ImageSession> Session<S> {
    /// Path this session was opened on
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the session, reporting close failures
    pub fn close(mut self) -> Result<()> {
        if let Some(mut inner) = self.inner.take() {
            debug!(path = %self.path.display(), "closing image session");
            inner.close()?;
        }
        Ok(())
    }
}

impl<S: ImageSession> Deref for Session<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `close` and `drop` take the handle, both consume the guard.
        self.inner
            .as_ref()
            .unwrap_or_else(|| unreachable!("session used after close"))
    }
}

impl<S: ImageSession> Drop for Session<S> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Err(e) = inner.close() {
                warn!(path = %self.path.display(), "failed to close image session: {e}");
            }
        }
    }
}

/// Open a scoped session on `path`.
///
/// # Errors
///
/// [`CubeError::FileNotFound`] when the service reports the path does not
/// exist, [`CubeError::Service`] for any other open failure.
pub fn open_session<T: ImageTool + ?Sized>(tool: &T, path: &Path) -> Result<Session<T::Session>> {
    debug!(path = %path.display(), "opening image session");
    match tool.open(path) {
        Ok(inner) => Ok(Session {
            inner: Some(inner),
            path: path.to_path_buf(),
        }),
        Err(source @ ServiceError::PathNotFound { .. }) => Err(CubeError::FileNotFound {
            path: path.to_path_buf(),
            source,
        }),
        Err(other) => Err(CubeError::Service(other)),
    }
}
