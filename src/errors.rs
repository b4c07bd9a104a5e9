//! Centralized error handling for casa_cube
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`CubeError`] carries one structured variant per failure category. Errors
//! reported by the image service itself are kept verbatim in
//! [`CubeError::Service`]; only a missing path on open is reinterpreted.

use crate::service::ServiceError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for casa_cube operations
#[derive(Debug, Error)]
pub enum CubeError {
    /// The image path does not exist
    #[error("File {} not found.  Error was: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: ServiceError,
    },

    /// Any other failure reported by the image service, passed through unchanged
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Coordinate system with an axis count other than 3 or 4
    #[error("CASA image has {naxis} dimensions, and therefore is not readable as a spectral cube")]
    UnsupportedDimensions { naxis: usize },

    /// Axis types that cannot be arranged into a spectral cube
    #[error("Unsupported axis layout: {message}")]
    UnsupportedAxes { message: String },

    /// Beam tables covering more than one polarization
    #[error("Beam tables with {n_stokes} polarizations are not implemented")]
    MultiPolarizationBeams { n_stokes: u64 },

    /// Beam table size disagrees with the reported channel count
    #[error("Beam table has {beams} entries but the image reports {channels} channels")]
    InconsistentBeamTable { beams: usize, channels: u64 },

    /// Restoring beam record is missing fields or has the wrong types
    #[error("Malformed restoring beam record: {message}")]
    MalformedBeam { message: String },

    /// Selection that cannot be expressed for the image
    #[error("Invalid selection: {message}")]
    InvalidSelection { message: String },

    /// Integer index outside the axis
    #[error("Index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds { axis: usize, index: i64, size: usize },

    /// Array shapes that should agree but do not
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Coordinate systems that should be equal but are not
    #[error("Coordinate system mismatch: {message}")]
    WcsMismatch { message: String },

    /// Interchange file errors
    #[error("FITS error: {0}")]
    Fits(#[from] fitsio_pure::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A background chunk task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Physical unit that cannot be converted
    #[error("Unit error: {0}")]
    Unit(String),
}

/// Result type alias for casa_cube operations
pub type Result<T> = std::result::Result<T, CubeError>;
