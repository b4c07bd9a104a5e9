//! Chunked evaluation of lazy arrays
//!
//! A [`ChunkedArray`] splits an [`ArraySource`] into a regular grid of
//! rectangular chunks. By default each chunk is one plane (every leading
//! axis pinned, the last two axes whole), which for a cube means one channel
//! per chunk. Chunks can be materialized all at once in parallel with
//! [`ChunkedArray::compute`] or one by one as an async stream with
//! [`ChunkedArray::stream_chunks`].

use crate::data_source::{ArraySource, Element};
use crate::errors::{CubeError, Result};
use crate::selection::{signed, Selector};
use futures::Stream;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use rayon::prelude::*;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// One materialized chunk and its position in the full array
#[derive(Debug, Clone)]
pub struct Chunk<E> {
    /// Position in the chunk grid
    pub index: Vec<usize>,
    /// First element of the chunk in the full array
    pub offset: Vec<usize>,
    pub data: ArrayD<E>,
}

/// Boxed stream of chunks
pub type ChunkStream<E> = Pin<Box<dyn Stream<Item = Result<Chunk<E>>> + Send + 'static>>;

/// A lazy array evaluated chunk by chunk
pub struct ChunkedArray<E> {
    source: Arc<dyn ArraySource<E>>,
    chunk_shape: Vec<usize>,
}

impl<E> Clone for ChunkedArray<E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            chunk_shape: self.chunk_shape.clone(),
        }
    }
}

/// One plane per chunk: leading axes of length 1, last two axes whole
#[must_use]
pub fn plane_chunks(shape: &[usize]) -> Vec<usize> {
    let n = shape.len();
    shape
        .iter()
        .enumerate()
        .map(|(axis, &len)| if axis + 2 >= n { len.max(1) } else { 1 })
        .collect()
}

impl<E: Element> ChunkedArray<E> {
    /// Chunk `source` plane by plane
    pub fn new(source: Arc<dyn ArraySource<E>>) -> Self {
        let chunk_shape = plane_chunks(source.shape());
        Self {
            source,
            chunk_shape,
        }
    }

    /// Chunk `source` with an explicit chunk shape. Chunks at the upper edge
    /// of an axis may be shorter.
    pub fn with_chunk_shape(source: Arc<dyn ArraySource<E>>, chunk_shape: Vec<usize>) -> Result<Self> {
        if chunk_shape.len() != source.ndim() || chunk_shape.contains(&0) {
            return Err(CubeError::InvalidSelection {
                message: format!(
                    "chunk shape {chunk_shape:?} does not fit an array of shape {:?}",
                    source.shape()
                ),
            });
        }
        Ok(Self {
            source,
            chunk_shape,
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.source.shape()
    }

    #[must_use]
    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    /// Number of chunks along each axis
    #[must_use]
    pub fn grid(&self) -> Vec<usize> {
        self.shape()
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&len, &chunk)| len.div_ceil(chunk))
            .collect()
    }

    #[must_use]
    pub fn n_chunks(&self) -> usize {
        self.grid().iter().product()
    }

    fn grid_index(&self, mut flat: usize) -> Vec<usize> {
        let grid = self.grid();
        let mut index = vec![0; grid.len()];
        for axis in (0..grid.len()).rev() {
            index[axis] = flat % grid[axis];
            flat /= grid[axis];
        }
        index
    }

    /// Read the chunk with row-major position `flat` in the grid
    pub fn read_chunk(&self, flat: usize) -> Result<Chunk<E>> {
        let n = self.n_chunks();
        if flat >= n {
            return Err(CubeError::IndexOutOfBounds {
                axis: 0,
                index: i64::try_from(flat).unwrap_or(i64::MAX),
                size: n,
            });
        }
        let index = self.grid_index(flat);
        let offset: Vec<usize> = index
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&i, &c)| i * c)
            .collect();
        let selection: Vec<Selector> = offset
            .iter()
            .zip(&self.chunk_shape)
            .zip(self.shape())
            .map(|((&start, &chunk), &len)| -> Result<Selector> {
                Ok(Selector::from(signed(start)?..signed((start + chunk).min(len))?))
            })
            .collect::<Result<_>>()?;

        debug!(chunk = ?index, "reading chunk");
        let data = self.source.read(&selection)?;
        Ok(Chunk {
            index,
            offset,
            data,
        })
    }

    /// Materialize the whole array, reading chunks in parallel
    pub fn compute(&self) -> Result<ArrayD<E>>
    where
        E: Default,
    {
        let chunks = (0..self.n_chunks())
            .into_par_iter()
            .map(|flat| self.read_chunk(flat))
            .collect::<Result<Vec<_>>>()?;

        let mut out = ArrayD::from_elem(IxDyn(self.shape()), E::default());
        for chunk in chunks {
            let mut view = out.view_mut();
            for (axis, (&start, &len)) in chunk.offset.iter().zip(chunk.data.shape()).enumerate() {
                view.slice_axis_inplace(Axis(axis), Slice::from(start..start + len));
            }
            view.assign(&chunk.data);
        }
        Ok(out)
    }

    /// Stream chunks in grid order. Each read runs on the blocking pool.
    pub fn stream_chunks(&self) -> ChunkStream<E> {
        let this = self.clone();
        let n = self.n_chunks();

        Box::pin(async_stream::stream! {
            for flat in 0..n {
                let reader = this.clone();
                match tokio::task::spawn_blocking(move || reader.read_chunk(flat)).await {
                    Ok(result) => yield result,
                    Err(e) => {
                        yield Err(CubeError::Task(e.to_string()));
                        return;
                    }
                }
            }
        })
    }
}
