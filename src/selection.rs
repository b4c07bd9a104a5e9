//! Selections and their translation to service regions
//!
//! A selection is a list of [`Selector`]s in conventional (slowest axis
//! first) order. Before use it is normalized to exactly one
//! [`AxisSelection`] per dimension: ellipses are expanded, missing trailing
//! dimensions become full slices, negative positions are resolved against the
//! axis length and slice bounds are clamped.
//!
//! [`to_region`] then emits the service's begin/end/stride triple per axis:
//! an unset slice bound becomes `-1`, the exclusive stop becomes an inclusive
//! `stop - 1`, and a plain index `i` becomes `(i, i, 1)`.

use crate::errors::{CubeError, Result};
use crate::service::Region;
use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// Python-style slice with optional bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// The full slice `:`
    #[must_use]
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: None,
        }
    }

    #[must_use]
    pub const fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", show(self.start), show(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

/// One entry of a user selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Select a single position and drop the axis
    Index(i64),
    /// Select a range and keep the axis, even at length 1
    Slice(SliceSpec),
    /// Stands for as many full slices as needed
    Ellipsis,
}

impl Selector {
    /// Shorthand for the full slice `:`
    #[must_use]
    pub const fn all() -> Self {
        Selector::Slice(SliceSpec::full())
    }

    #[must_use]
    pub const fn range(start: i64, stop: i64, step: i64) -> Self {
        Selector::Slice(SliceSpec::new(Some(start), Some(stop), Some(step)))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(i) => write!(f, "{i}"),
            Selector::Slice(s) => write!(f, "{s}"),
            Selector::Ellipsis => f.write_str("..."),
        }
    }
}

impl From<i64> for Selector {
    fn from(index: i64) -> Self {
        Selector::Index(index)
    }
}

impl From<i32> for Selector {
    fn from(index: i32) -> Self {
        Selector::Index(i64::from(index))
    }
}

impl TryFrom<usize> for Selector {
    type Error = CubeError;

    fn try_from(index: usize) -> Result<Self> {
        signed(index).map(Selector::Index)
    }
}

impl From<SliceSpec> for Selector {
    fn from(slice: SliceSpec) -> Self {
        Selector::Slice(slice)
    }
}

impl From<RangeFull> for Selector {
    fn from(_: RangeFull) -> Self {
        Selector::all()
    }
}

impl From<Range<i64>> for Selector {
    fn from(r: Range<i64>) -> Self {
        Selector::Slice(SliceSpec::new(Some(r.start), Some(r.end), None))
    }
}

impl From<RangeFrom<i64>> for Selector {
    fn from(r: RangeFrom<i64>) -> Self {
        Selector::Slice(SliceSpec::new(Some(r.start), None, None))
    }
}

impl From<RangeTo<i64>> for Selector {
    fn from(r: RangeTo<i64>) -> Self {
        Selector::Slice(SliceSpec::new(None, Some(r.end), None))
    }
}

/// Build a `Vec<Selector>` from indices and ranges.
///
/// ```
/// use casa_cube::sel;
/// use casa_cube::selection::Selector;
///
/// let s = sel![0, .., 1i64..3];
/// assert_eq!(s[0], Selector::Index(0));
/// assert_eq!(s.len(), 3);
/// ```
#[macro_export]
macro_rules! sel {
    () => { ::std::vec::Vec::<$crate::selection::Selector>::new() };
    ($($item:expr),+ $(,)?) => {
        vec![$($crate::selection::Selector::from($item)),+]
    };
}

/// One normalized axis of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelection {
    /// In-bounds position, axis dropped from the result
    Index(usize),
    /// Resolved slice; `None` bounds cover the axis end to end
    Slice {
        start: Option<usize>,
        stop: Option<usize>,
        step: usize,
    },
}

impl AxisSelection {
    /// Full slice of an axis
    #[must_use]
    pub const fn full() -> Self {
        AxisSelection::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Number of positions selected along an axis of length `len`
    #[must_use]
    pub fn extent(&self, len: usize) -> usize {
        match *self {
            AxisSelection::Index(_) => 1,
            AxisSelection::Slice { start, stop, step } => {
                let start = start.unwrap_or(0);
                let stop = stop.unwrap_or(len);
                if stop <= start {
                    0
                } else {
                    (stop - start).div_ceil(step)
                }
            }
        }
    }

    /// Position in the source axis of the `k`-th selected element
    #[must_use]
    pub fn position(&self, k: usize) -> usize {
        match *self {
            AxisSelection::Index(i) => i,
            AxisSelection::Slice { start, step, .. } => start.unwrap_or(0) + k * step,
        }
    }

    #[must_use]
    pub const fn is_index(&self) -> bool {
        matches!(self, AxisSelection::Index(_))
    }

    /// The begin/end/stride triple for this axis
    ///
    /// # Errors
    ///
    /// [`CubeError::InvalidSelection`] if a position does not fit in `i64`.
    pub fn triple(&self) -> Result<(i64, i64, i64)> {
        Ok(match *self {
            AxisSelection::Index(i) => {
                let i = signed(i)?;
                (i, i, 1)
            }
            AxisSelection::Slice { start, stop, step } => (
                start.map_or(Ok(-1), signed)?,
                stop.map_or(Ok(-1), |s| signed(s).map(|s| s - 1))?,
                signed(step)?,
            ),
        })
    }

    /// The same axis selection as a [`Selector`]
    ///
    /// # Errors
    ///
    /// [`CubeError::InvalidSelection`] if a position does not fit in `i64`.
    pub fn to_selector(&self) -> Result<Selector> {
        Ok(match *self {
            AxisSelection::Index(i) => Selector::Index(signed(i)?),
            AxisSelection::Slice { start, stop, step } => Selector::Slice(SliceSpec::new(
                start.map(signed).transpose()?,
                stop.map(signed).transpose()?,
                Some(signed(step)?),
            )),
        })
    }
}

/// `value` as a signed position.
///
/// # Errors
///
/// [`CubeError::InvalidSelection`] if `value` exceeds `i64::MAX`.
pub fn signed(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| CubeError::InvalidSelection {
        message: format!("position {value} does not fit in a signed 64-bit index"),
    })
}

/// Axis length for comparisons against signed positions
fn signed_len(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn resolve_bound(value: i64, len: usize) -> usize {
    let bound = signed_len(len);
    let resolved = if value < 0 { value + bound } else { value };
    usize::try_from(resolved.clamp(0, bound)).unwrap_or(len)
}

/// Normalize `selection` against `shape` (both in conventional order).
///
/// # Errors
///
/// [`CubeError::InvalidSelection`] for more selectors than dimensions, more
/// than one ellipsis, or a non-positive step. [`CubeError::IndexOutOfBounds`]
/// for an integer outside its axis.
pub fn normalize(selection: &[Selector], shape: &[usize]) -> Result<Vec<AxisSelection>> {
    let ellipses = selection
        .iter()
        .filter(|s| matches!(s, Selector::Ellipsis))
        .count();
    if ellipses > 1 {
        return Err(CubeError::InvalidSelection {
            message: "an index can only have a single ellipsis".to_string(),
        });
    }
    let explicit = selection.len() - ellipses;
    if explicit > shape.len() {
        return Err(CubeError::InvalidSelection {
            message: format!(
                "too many indices: array is {}-dimensional, but {explicit} were indexed",
                shape.len()
            ),
        });
    }

    let mut expanded = Vec::with_capacity(shape.len());
    for selector in selection {
        match selector {
            Selector::Ellipsis => {
                expanded.extend(std::iter::repeat(Selector::all()).take(shape.len() - explicit));
            }
            other => expanded.push(*other),
        }
    }
    expanded.resize(shape.len(), Selector::all());

    expanded
        .iter()
        .zip(shape)
        .enumerate()
        .map(|(axis, (selector, &len))| match *selector {
            Selector::Index(index) => {
                let resolved = if index < 0 { index + signed_len(len) } else { index };
                match usize::try_from(resolved) {
                    Ok(position) if position < len => Ok(AxisSelection::Index(position)),
                    _ => Err(CubeError::IndexOutOfBounds {
                        axis,
                        index,
                        size: len,
                    }),
                }
            }
            Selector::Slice(slice) => {
                let step = slice.step.unwrap_or(1);
                if step <= 0 {
                    return Err(CubeError::InvalidSelection {
                        message: format!("slice step must be positive, got {step}"),
                    });
                }
                let step = usize::try_from(step).map_err(|_| CubeError::InvalidSelection {
                    message: format!("slice step {step} does not fit the platform index"),
                })?;
                Ok(AxisSelection::Slice {
                    start: slice.start.map(|s| resolve_bound(s, len)),
                    stop: slice.stop.map(|s| resolve_bound(s, len)),
                    step,
                })
            }
            Selector::Ellipsis => Ok(AxisSelection::full()),
        })
        .collect()
}

/// Begin/end/stride region for a normalized selection, axis order preserved
///
/// # Errors
///
/// [`CubeError::InvalidSelection`] if a position does not fit in `i64`.
pub fn to_region(selection: &[AxisSelection]) -> Result<Region> {
    let mut region = Region {
        blc: Vec::with_capacity(selection.len()),
        trc: Vec::with_capacity(selection.len()),
        inc: Vec::with_capacity(selection.len()),
    };
    for axis in selection {
        let (blc, trc, inc) = axis.triple()?;
        region.blc.push(blc);
        region.trc.push(trc);
        region.inc.push(inc);
    }
    Ok(region)
}

/// Per-axis extents of a normalized selection, including dropped axes
#[must_use]
pub fn extents(selection: &[AxisSelection], shape: &[usize]) -> Vec<usize> {
    selection
        .iter()
        .zip(shape)
        .map(|(axis, &len)| axis.extent(len))
        .collect()
}

/// Shape of the array a normalized selection produces
#[must_use]
pub fn result_shape(selection: &[AxisSelection], shape: &[usize]) -> Vec<usize> {
    selection
        .iter()
        .zip(shape)
        .filter(|(axis, _)| !axis.is_index())
        .map(|(axis, &len)| axis.extent(len))
        .collect()
}

/// Parse a comma-separated selection such as `0,:,2:4,...` or `::2,-1`.
///
/// # Errors
///
/// [`CubeError::InvalidSelection`] when an entry is not an integer, a slice
/// of up to three optional integers, or `...`.
pub fn parse_selection(text: &str) -> Result<Vec<Selector>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let parse_int = |part: &str, entry: &str| -> Result<Option<i64>> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(None);
        }
        part.parse::<i64>()
            .map(Some)
            .map_err(|_| CubeError::InvalidSelection {
                message: format!("'{entry}' is not an index or slice"),
            })
    };

    text.split(',')
        .map(|entry| {
            let entry = entry.trim();
            if entry == "..." {
                return Ok(Selector::Ellipsis);
            }
            let parts: Vec<&str> = entry.split(':').collect();
            match parts.as_slice() {
                [single] => parse_int(single, entry)?
                    .map(Selector::Index)
                    .ok_or_else(|| CubeError::InvalidSelection {
                        message: "empty selection entry".to_string(),
                    }),
                [start, stop] => Ok(Selector::Slice(SliceSpec::new(
                    parse_int(start, entry)?,
                    parse_int(stop, entry)?,
                    None,
                ))),
                [start, stop, step] => Ok(Selector::Slice(SliceSpec::new(
                    parse_int(start, entry)?,
                    parse_int(stop, entry)?,
                    parse_int(step, entry)?,
                ))),
                _ => Err(CubeError::InvalidSelection {
                    message: format!("'{entry}' has too many ':' separators"),
                }),
            }
        })
        .collect()
}
