//! Service-backed lazy arrays
//!
//! [`LazyCasaArray`] exposes one image as an n-dimensional array in
//! conventional axis order (slowest axis first), while the service works in
//! native order (fastest axis first). Every read opens its own session,
//! fetches exactly the requested region and closes the session again, so no
//! handle outlives a call and independent arrays can be read concurrently.

use crate::data_source::{ArrayDescriptor, ArraySource, Element};
use crate::errors::{CubeError, Result};
use crate::selection::{extents, normalize, result_shape, to_region, AxisSelection, Selector};
use crate::service::{open_session, ImageSession, ImageTool, PixelType, Region, ServiceResult};
use ndarray::{ArrayD, Axis, IxDyn};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Elements the service can fetch: pixel values or validity flags
pub trait ChunkElement: Element {
    /// Fetch `region` through `session`
    fn fetch<S: ImageSession>(session: &S, region: &Region) -> ServiceResult<ArrayD<Self>>;

    /// Element type reported for an image whose pixels are `pixel_type`
    fn dtype_for(pixel_type: PixelType) -> PixelType;
}

impl ChunkElement for f32 {
    fn fetch<S: ImageSession>(session: &S, region: &Region) -> ServiceResult<ArrayD<f32>> {
        session.get_chunk(region)
    }

    fn dtype_for(pixel_type: PixelType) -> PixelType {
        pixel_type
    }
}

impl ChunkElement for bool {
    fn fetch<S: ImageSession>(session: &S, region: &Region) -> ServiceResult<ArrayD<bool>> {
        session.get_mask_chunk(region)
    }

    fn dtype_for(_: PixelType) -> PixelType {
        PixelType::Bool
    }
}

/// Lazy, chunk-on-demand view of one image's pixels (`E = f32`) or
/// validity mask (`E = bool`)
pub struct LazyCasaArray<T: ImageTool, E> {
    tool: Arc<T>,
    path: PathBuf,
    descriptor: ArrayDescriptor,
    _element: PhantomData<fn() -> E>,
}

/// Pixel values of an image
pub type CasaData<T> = LazyCasaArray<T, f32>;

/// Validity mask of an image
pub type CasaMask<T> = LazyCasaArray<T, bool>;

impl<T: ImageTool, E: ChunkElement> LazyCasaArray<T, E> {
    /// Record shape and element type of the image at `path`.
    ///
    /// A session is opened for the metadata query and closed before returning.
    pub fn new(tool: Arc<T>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let session = open_session(tool.as_ref(), &path)?;
        let mut shape = session.shape()?;
        let pixel_type = session.pixel_type()?;
        session.close()?;

        shape.reverse();
        Ok(Self {
            tool,
            path,
            descriptor: ArrayDescriptor {
                shape,
                dtype: E::dtype_for(pixel_type),
            },
            _element: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch the elements selected by `selection` (conventional order).
    ///
    /// Axes selected by a plain index are dropped from the result; axes
    /// selected by a slice are kept, even at length 1.
    pub fn get(&self, selection: &[Selector]) -> Result<ArrayD<E>> {
        let norm = normalize(selection, &self.descriptor.shape)?;

        if extents(&norm, &self.descriptor.shape).contains(&0) {
            return Ok(ArrayD::from_shape_vec(
                IxDyn(&result_shape(&norm, &self.descriptor.shape)),
                Vec::new(),
            )?);
        }

        let native: Vec<AxisSelection> = norm.iter().rev().copied().collect();
        let region = to_region(&native)?;

        let session = open_session(self.tool.as_ref(), &self.path)?;
        debug!(
            path = %self.path.display(),
            blc = ?region.blc,
            trc = ?region.trc,
            inc = ?region.inc,
            dtype = %self.descriptor.dtype,
            "fetching chunk"
        );
        let chunk = E::fetch(&*session, &region)?;
        session.close()?;

        let mut native_extents = extents(&norm, &self.descriptor.shape);
        native_extents.reverse();
        if chunk.shape() != native_extents.as_slice() {
            return Err(CubeError::ShapeMismatch {
                message: format!(
                    "service returned a {:?} chunk for a {:?} region",
                    chunk.shape(),
                    native_extents
                ),
            });
        }

        let mut chunk = chunk;
        for axis in (0..native.len()).rev() {
            if native[axis].is_index() {
                chunk = chunk.index_axis_move(Axis(axis), 0);
            }
        }
        Ok(chunk.reversed_axes().as_standard_layout().into_owned())
    }
}

impl<T: ImageTool, E: ChunkElement> ArraySource<E> for LazyCasaArray<T, E> {
    fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    fn read(&self, selection: &[Selector]) -> Result<ArrayD<E>> {
        self.get(selection)
    }
}

impl<T: ImageTool, E> fmt::Debug for LazyCasaArray<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCasaArray")
            .field("path", &self.path)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
