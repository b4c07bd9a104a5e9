//! Lazy array abstraction
//!
//! [`ArraySource`] is the contract every lazily evaluated array in the crate
//! satisfies: it knows its shape and element type up front and materializes
//! only the part of itself a selection asks for. The service-backed adapter
//! in [`crate::lazy_array`] is the main implementation; [`MemoryArray`] wraps
//! data that is already in memory and [`LazyView`] re-indexes another source
//! without reading it.

use crate::errors::{CubeError, Result};
use crate::selection::{normalize, AxisSelection, Selector};
use crate::service::PixelType;
use ndarray::{ArrayD, Axis, Slice};
use std::fmt;
use std::sync::Arc;

/// Element types that lazy arrays can hold
pub trait Element: Clone + Send + Sync + 'static {
    /// Pixel type reported for arrays of this element
    const DTYPE: PixelType;
}

impl Element for f32 {
    const DTYPE: PixelType = PixelType::Float;
}

impl Element for f64 {
    const DTYPE: PixelType = PixelType::Double;
}

impl Element for bool {
    const DTYPE: PixelType = PixelType::Bool;
}

/// Shape and element type of a lazy array, conventional axis order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDescriptor {
    pub shape: Vec<usize>,
    pub dtype: PixelType,
}

impl ArrayDescriptor {
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ArrayDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.shape, self.dtype)
    }
}

/// A lazily evaluated n-dimensional array
pub trait ArraySource<E>: Send + Sync {
    fn descriptor(&self) -> &ArrayDescriptor;

    /// Materialize the elements picked by `selection`
    fn read(&self, selection: &[Selector]) -> Result<ArrayD<E>>;

    fn shape(&self) -> &[usize] {
        &self.descriptor().shape
    }

    fn dtype(&self) -> PixelType {
        self.descriptor().dtype
    }

    fn ndim(&self) -> usize {
        self.descriptor().ndim()
    }

    /// Materialize the whole array
    fn read_all(&self) -> Result<ArrayD<E>> {
        self.read(&[])
    }
}

/// Apply a normalized selection to an in-memory array
#[must_use]
pub fn apply_selection<E: Clone>(array: &ArrayD<E>, selection: &[AxisSelection]) -> ArrayD<E> {
    let mut view = array.view();
    for (axis, sel) in selection.iter().enumerate() {
        let len = view.len_of(Axis(axis));
        let (start, end, step) = match *sel {
            AxisSelection::Index(i) => (i, i + 1, 1),
            AxisSelection::Slice { start, stop, step } => {
                let start = start.unwrap_or(0).min(len);
                (start, stop.unwrap_or(len).clamp(start, len), step)
            }
        };
        view.slice_axis_inplace(
            Axis(axis),
            Slice::new(start as isize, Some(end as isize), step as isize),
        );
    }
    for axis in (0..selection.len()).rev() {
        if selection[axis].is_index() {
            view = view.index_axis_move(Axis(axis), 0);
        }
    }
    view.to_owned()
}

/// An in-memory array behind the lazy contract
#[derive(Debug, Clone)]
pub struct MemoryArray<E> {
    data: ArrayD<E>,
    descriptor: ArrayDescriptor,
}

impl<E: Element> MemoryArray<E> {
    #[must_use]
    pub fn new(data: ArrayD<E>) -> Self {
        let descriptor = ArrayDescriptor {
            shape: data.shape().to_vec(),
            dtype: E::DTYPE,
        };
        Self { data, descriptor }
    }

    #[must_use]
    pub fn data(&self) -> &ArrayD<E> {
        &self.data
    }
}

impl<E: Element> ArraySource<E> for MemoryArray<E> {
    fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    fn read(&self, selection: &[Selector]) -> Result<ArrayD<E>> {
        let norm = normalize(selection, self.shape())?;
        Ok(apply_selection(&self.data, &norm))
    }
}

/// A re-indexed view of another source: some axes pinned to one position,
/// the remaining axes in any order. Nothing is read until [`ArraySource::read`].
pub struct LazyView<E> {
    source: Arc<dyn ArraySource<E>>,
    fixed: Vec<Option<usize>>,
    /// Source axis behind each view axis
    axes: Vec<usize>,
    descriptor: ArrayDescriptor,
}

impl<E> Clone for LazyView<E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            fixed: self.fixed.clone(),
            axes: self.axes.clone(),
            descriptor: self.descriptor.clone(),
        }
    }
}

impl<E> fmt::Debug for LazyView<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyView")
            .field("descriptor", &self.descriptor)
            .field("fixed", &self.fixed)
            .field("axes", &self.axes)
            .finish()
    }
}

impl<E: Element> LazyView<E> {
    /// Identity view of `source`
    pub fn new(source: Arc<dyn ArraySource<E>>) -> Self {
        let ndim = source.ndim();
        let descriptor = source.descriptor().clone();
        Self {
            source,
            fixed: vec![None; ndim],
            axes: (0..ndim).collect(),
            descriptor,
        }
    }

    fn rebuild_descriptor(&mut self) {
        let source_shape = self.source.shape();
        self.descriptor.shape = self.axes.iter().map(|&a| source_shape[a]).collect();
    }

    /// Pin view axis `axis` to `index`, dropping it from the view
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Self> {
        let size = *self
            .descriptor
            .shape
            .get(axis)
            .ok_or_else(|| CubeError::InvalidSelection {
                message: format!("axis {axis} out of range for a {}-d view", self.ndim()),
            })?;
        if index >= size {
            return Err(CubeError::IndexOutOfBounds {
                axis,
                index: i64::try_from(index).unwrap_or(i64::MAX),
                size,
            });
        }
        let mut view = self.clone();
        let source_axis = view.axes.remove(axis);
        view.fixed[source_axis] = Some(index);
        view.rebuild_descriptor();
        Ok(view)
    }

    /// Reorder the view axes; view axis `k` of the result is axis `order[k]` of `self`
    pub fn permuted(&self, order: &[usize]) -> Result<Self> {
        let mut seen = vec![false; self.axes.len()];
        for &o in order {
            match seen.get_mut(o) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(CubeError::InvalidSelection {
                        message: format!("{order:?} is not a permutation of {} axes", self.axes.len()),
                    })
                }
            }
        }
        if order.len() != self.axes.len() {
            return Err(CubeError::InvalidSelection {
                message: format!("{order:?} is not a permutation of {} axes", self.axes.len()),
            });
        }
        let mut view = self.clone();
        view.axes = order.iter().map(|&o| self.axes[o]).collect();
        view.rebuild_descriptor();
        Ok(view)
    }

    /// Whether this view reads its source unchanged
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.fixed.iter().all(Option::is_none) && self.axes.iter().enumerate().all(|(k, &a)| k == a)
    }
}

impl<E: Element> ArraySource<E> for LazyView<E> {
    fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    fn read(&self, selection: &[Selector]) -> Result<ArrayD<E>> {
        if self.is_identity() {
            return self.source.read(selection);
        }

        let norm = normalize(selection, &self.descriptor.shape)?;
        let mut source_sel: Vec<Selector> = self
            .fixed
            .iter()
            .map(|f| f.map_or(Ok(Selector::all()), Selector::try_from))
            .collect::<Result<_>>()?;
        for (k, sel) in norm.iter().enumerate() {
            source_sel[self.axes[k]] = sel.to_selector()?;
        }
        let data = self.source.read(&source_sel)?;

        // The source returns its kept axes in source order; put them in view order.
        let kept: Vec<usize> = norm
            .iter()
            .enumerate()
            .filter(|(_, sel)| !sel.is_index())
            .map(|(k, _)| self.axes[k])
            .collect();
        let mut sorted = kept.clone();
        sorted.sort_unstable();
        let perm: Vec<usize> = kept
            .iter()
            .map(|a| sorted.iter().position(|s| s == a).unwrap_or_default())
            .collect();
        Ok(data.permuted_axes(perm).as_standard_layout().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sel;
    use ndarray::{Array, IxDyn};

    fn ramp() -> MemoryArray<f32> {
        let data = Array::from_iter((0..24).map(|v| v as f32))
            .into_shape(IxDyn(&[2, 3, 4]))
            .unwrap();
        MemoryArray::new(data)
    }

    #[test]
    fn memory_array_drops_indexed_axes() {
        let arr = ramp();
        let out = arr.read(&sel![1, .., (1i64..3)]).unwrap();
        assert_eq!(out.shape(), &[3, 2]);
        assert_eq!(out[[0, 0]], 13.0);
        assert_eq!(out[[2, 1]], 22.0);
    }

    #[test]
    fn view_index_and_permute_match_eager_ops() {
        let arr = Arc::new(ramp());
        let eager = arr.data().clone();
        let view = LazyView::new(arr as Arc<dyn ArraySource<f32>>)
            .index_axis(1, 2)
            .unwrap()
            .permuted(&[1, 0])
            .unwrap();
        assert_eq!(view.shape(), &[4, 2]);

        let expected = eager.index_axis(Axis(1), 2).reversed_axes().to_owned();
        assert_eq!(view.read_all().unwrap(), expected.into_dyn());

        let part = view.read(&sel![(1i64..3), 0]).unwrap();
        assert_eq!(part.shape(), &[2]);
        assert_eq!(part[[0]], eager[[0, 2, 1]]);
        assert_eq!(part[[1]], eager[[0, 2, 2]]);
    }

    #[test]
    fn permutation_must_be_complete() {
        let view = LazyView::new(Arc::new(ramp()) as Arc<dyn ArraySource<f32>>);
        assert!(view.permuted(&[0, 0, 1]).is_err());
        assert!(view.permuted(&[0, 1]).is_err());
        assert!(view.index_axis(0, 5).is_err());
    }
}
