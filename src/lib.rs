//! casa_cube: lazy access to CASA image cubes
//!
//! casa_cube reads images stored by an external image service and exposes
//! them as spectral cubes without loading them into memory. Pixels are
//! fetched chunk by chunk on demand, each fetch through its own short-lived
//! service session.
//!
//! ## Key Features
//!
//! - **Lazy arrays**: service-backed arrays in conventional axis order, with
//!   integer and slice selections translated to the service's region vocabulary
//! - **Cube assembly**: 3-axis images become a [`SpectralCube`], 4-axis images a
//!   [`StokesSpectralCube`] with one cube per polarization
//! - **Beams**: single restoring beams and per-channel beam tables
//! - **Parallel processing**: chunked evaluation and reductions on Rayon, async
//!   chunk streams on Tokio
//! - **Masks**: validity masks written back as images
//!
//! ## Module Organization
//!
//! - [`service`]: the image service contract and a directory-backed implementation
//! - [`selection`], [`data_source`], [`lazy_array`], [`chunked`]: lazy arrays
//! - [`wcs`], [`coords`]: world coordinates and FITS interchange
//! - [`beam`], [`cube`], [`loader`]: cube assembly
//! - [`statistics`], [`mask_writer`], [`metadata`]: operations on loaded cubes
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use casa_cube::prelude::*;
//! use casa_cube::sel;
//! use std::sync::Arc;
//!
//! let tool = Arc::new(DirectoryImageTool::new());
//! let image = load_casa_image(tool, "cube.image", &LoadOptions::default()).unwrap();
//! let cube = image.cube.primary();
//!
//! // One spectrum, fetched without reading the rest of the cube
//! let spectrum = cube.unmasked_data(&sel![.., 0, 0]).unwrap();
//! println!("{} channels in {}", spectrum.len(), cube.unit());
//!
//! let moment = cube.moment0().unwrap();
//! println!("{}", moment.stats());
//! ```

pub mod beam;
pub mod chunked;
pub mod coords;
pub mod cube;
pub mod data_source;
pub mod errors;
pub mod lazy_array;
pub mod loader;
pub mod mask_writer;
pub mod metadata;
pub mod parallel;
pub mod selection;
pub mod service;
pub mod statistics;
pub mod wcs;

pub use beam::{Beam, BeamInfo, Beams, Quantity};
pub use cube::{BooleanArrayMask, CubeMeta, LoadedCube, SpectralCube, StokesSpectralCube};
pub use errors::{CubeError, Result};
pub use loader::{is_casa_image, load_casa_image, LoadOptions, LoadWarning, LoadedImage};
pub use mask_writer::{make_casa_mask, MaskWriteOptions};

/// Commonly used imports
pub mod prelude {
    pub use crate::beam::{Beam, BeamInfo, Beams, Quantity};
    pub use crate::chunked::{Chunk, ChunkedArray};
    pub use crate::cube::{BooleanArrayMask, CubeMeta, LoadedCube, SpectralCube, StokesSpectralCube};
    pub use crate::data_source::{ArrayDescriptor, ArraySource, LazyView, MemoryArray};
    pub use crate::errors::{CubeError, Result};
    pub use crate::lazy_array::{CasaData, CasaMask, LazyCasaArray};
    pub use crate::loader::{is_casa_image, load_casa_image, LoadOptions, LoadWarning, LoadedImage};
    pub use crate::mask_writer::{make_casa_mask, MaskWriteOptions};
    pub use crate::parallel::ParallelConfig;
    pub use crate::selection::{Selector, SliceSpec};
    pub use crate::service::{DirectoryImageTool, ImageSession, ImageTool};
    pub use crate::statistics::{Projection, StatOperation, StatisticalReduction};
    pub use crate::wcs::{Stokes, Wcs};
}
