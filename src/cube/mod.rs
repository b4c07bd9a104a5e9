//! Spectral cube objects
//!
//! A [`SpectralCube`] is a lazy 3-D array in (spectral, latitude, longitude)
//! order together with its validity mask, world coordinates, metadata and
//! beam information. A [`StokesSpectralCube`] bundles one such cube per
//! polarization component.
//!
//! Nothing here reads pixels until asked: data and mask are [`LazyView`]s
//! over the image service.

pub mod assemble;
pub mod utils;

pub use assemble::{assemble, CubeParts, LoadedCube};
pub use utils::{orient, split_stokes};

use crate::beam::{Beam, BeamInfo, Beams};
use crate::chunked::ChunkedArray;
use crate::data_source::{ArraySource, LazyView, MemoryArray};
use crate::errors::{CubeError, Result};
use crate::selection::{normalize, result_shape, Selector};
use crate::statistics::moments::{moment0, Projection};
use crate::wcs::{Stokes, Wcs};
use ndarray::{ArrayD, IxDyn, Zip};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata attached to a loaded cube
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CubeMeta {
    entries: BTreeMap<String, String>,
}

impl CubeMeta {
    /// Metadata naming the source image and its brightness unit
    #[must_use]
    pub fn new(filename: &Path, bunit: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("filename".to_string(), filename.display().to_string());
        entries.insert("BUNIT".to_string(), bunit.to_string());
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn filename(&self) -> Option<PathBuf> {
        self.get("filename").map(PathBuf::from)
    }

    #[must_use]
    pub fn bunit(&self) -> &str {
        self.get("BUNIT").unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Validity mask bound to a coordinate system. `true` marks a valid pixel.
#[derive(Debug, Clone)]
pub struct BooleanArrayMask {
    mask: Option<LazyView<bool>>,
    shape: Vec<usize>,
    wcs: Wcs,
}

impl BooleanArrayMask {
    #[must_use]
    pub fn new(mask: LazyView<bool>, wcs: Wcs) -> Self {
        let shape = mask.shape().to_vec();
        Self {
            mask: Some(mask),
            shape,
            wcs,
        }
    }

    /// Mask held in memory, conventional axis order
    #[must_use]
    pub fn from_array(mask: ArrayD<bool>, wcs: Wcs) -> Self {
        let source: Arc<dyn ArraySource<bool>> = Arc::new(MemoryArray::new(mask));
        Self::new(LazyView::new(source), wcs)
    }

    /// Mask marking every pixel of `shape` valid
    #[must_use]
    pub fn all_valid(shape: Vec<usize>, wcs: Wcs) -> Self {
        Self {
            mask: None,
            shape,
            wcs,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    /// Whether the mask is backed by stored validity flags
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.mask.is_some()
    }

    /// Validity flags for `selection`
    pub fn include(&self, selection: &[Selector]) -> Result<ArrayD<bool>> {
        match &self.mask {
            Some(mask) => mask.read(selection),
            None => {
                let norm = normalize(selection, &self.shape)?;
                Ok(ArrayD::from_elem(IxDyn(&result_shape(&norm, &self.shape)), true))
            }
        }
    }

    /// Invalid-pixel flags for `selection`
    pub fn exclude(&self, selection: &[Selector]) -> Result<ArrayD<bool>> {
        Ok(self.include(selection)?.mapv(|v| !v))
    }
}

/// Lazy spectral cube in (spectral, latitude, longitude) order
#[derive(Debug, Clone)]
pub struct SpectralCube {
    data: LazyView<f32>,
    mask: BooleanArrayMask,
    wcs: Wcs,
    meta: CubeMeta,
    beam: BeamInfo,
}

impl SpectralCube {
    /// Build a cube; the mask must have the data's shape
    pub fn new(
        data: LazyView<f32>,
        wcs: Wcs,
        mask: BooleanArrayMask,
        meta: CubeMeta,
        beam: BeamInfo,
    ) -> Result<Self> {
        if mask.shape() != data.shape() {
            return Err(CubeError::ShapeMismatch {
                message: format!(
                    "mask shape {:?} differs from data shape {:?}",
                    mask.shape(),
                    data.shape()
                ),
            });
        }
        Ok(Self {
            data,
            mask,
            wcs,
            meta,
            beam,
        })
    }

    /// The same cube with a different validity mask
    pub fn with_mask(&self, mask: BooleanArrayMask) -> Result<Self> {
        Self::new(
            self.data.clone(),
            self.wcs.clone(),
            mask,
            self.meta.clone(),
            self.beam.clone(),
        )
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    #[must_use]
    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    #[must_use]
    pub fn mask(&self) -> &BooleanArrayMask {
        &self.mask
    }

    #[must_use]
    pub fn meta(&self) -> &CubeMeta {
        &self.meta
    }

    /// Brightness unit
    #[must_use]
    pub fn unit(&self) -> &str {
        self.meta.bunit()
    }

    #[must_use]
    pub fn beam_info(&self) -> &BeamInfo {
        &self.beam
    }

    /// The single beam, for cubes with one resolution
    #[must_use]
    pub fn beam(&self) -> Option<&Beam> {
        match &self.beam {
            BeamInfo::Single(beam) => Some(beam),
            _ => None,
        }
    }

    /// Per-channel beams, for cubes whose resolution varies by channel
    #[must_use]
    pub fn beams(&self) -> Option<&Beams> {
        match &self.beam {
            BeamInfo::Varying(beams) => Some(beams),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_varying_resolution(&self) -> bool {
        matches!(self.beam, BeamInfo::Varying(_))
    }

    /// Pixel values for `selection`, mask ignored
    pub fn unmasked_data(&self, selection: &[Selector]) -> Result<ArrayD<f32>> {
        self.data.read(selection)
    }

    /// Pixel values for `selection` with masked pixels replaced by `fill`
    pub fn filled_data(&self, selection: &[Selector], fill: f32) -> Result<ArrayD<f32>> {
        let mut data = self.unmasked_data(selection)?;
        if self.mask.is_stored() {
            let valid = self.mask.include(selection)?;
            Zip::from(&mut data).and(&valid).for_each(|value, &ok| {
                if !ok {
                    *value = fill;
                }
            });
        }
        Ok(data)
    }

    /// World values of the spectral channels, in the spectral axis unit
    #[must_use]
    pub fn spectral_axis(&self) -> Vec<f64> {
        match self.wcs.spectral_axis() {
            Some(axis) => (0..self.shape()[0]).map(|c| axis.world(c as f64)).collect(),
            None => Vec::new(),
        }
    }

    /// Chunked evaluator over the pixel values, one channel per chunk
    #[must_use]
    pub fn chunked(&self) -> ChunkedArray<f32> {
        ChunkedArray::new(Arc::new(self.data.clone()) as Arc<dyn ArraySource<f32>>)
    }

    /// Integrated intensity along the spectral axis
    pub fn moment0(&self) -> Result<Projection> {
        moment0(self)
    }
}

impl fmt::Display for SpectralCube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_varying_resolution() {
            "VaryingResolutionSpectralCube"
        } else {
            "SpectralCube"
        };
        let shape = self.shape();
        writeln!(
            f,
            "{kind} with shape={:?} and unit={}:",
            shape,
            self.unit()
        )?;
        write!(f, "{}", self.wcs)
    }
}

/// One spectral cube per polarization component
#[derive(Debug, Clone)]
pub struct StokesSpectralCube {
    components: BTreeMap<Stokes, SpectralCube>,
    wcs: Wcs,
}

impl StokesSpectralCube {
    /// Bundle components. All must share one shape.
    pub fn new(components: BTreeMap<Stokes, SpectralCube>) -> Result<Self> {
        let primary = Self::pick_primary(&components).ok_or_else(|| CubeError::ShapeMismatch {
            message: "a polarization cube needs at least one component".to_string(),
        })?;
        let (shape, wcs) = (primary.shape().to_vec(), primary.wcs().clone());
        if let Some((label, cube)) = components.iter().find(|(_, c)| c.shape() != shape.as_slice()) {
            return Err(CubeError::ShapeMismatch {
                message: format!(
                    "component {label} has shape {:?}, expected {shape:?}",
                    cube.shape()
                ),
            });
        }
        Ok(Self { components, wcs })
    }

    fn pick_primary(components: &BTreeMap<Stokes, SpectralCube>) -> Option<&SpectralCube> {
        components
            .get(&Stokes::I)
            .or_else(|| components.values().next())
    }

    /// Stokes I if present, otherwise the first component
    #[must_use]
    pub fn primary(&self) -> &SpectralCube {
        Self::pick_primary(&self.components)
            .unwrap_or_else(|| unreachable!("constructed with at least one component"))
    }

    #[must_use]
    pub fn get(&self, stokes: Stokes) -> Option<&SpectralCube> {
        self.components.get(&stokes)
    }

    #[must_use]
    pub fn components(&self) -> &BTreeMap<Stokes, SpectralCube> {
        &self.components
    }

    #[must_use]
    pub fn labels(&self) -> Vec<Stokes> {
        self.components.keys().copied().collect()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.primary().shape()
    }

    #[must_use]
    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    #[must_use]
    pub fn mask(&self) -> &BooleanArrayMask {
        self.primary().mask()
    }

    #[must_use]
    pub fn meta(&self) -> &CubeMeta {
        self.primary().meta()
    }
}

impl fmt::Display for StokesSpectralCube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.components.keys().map(|s| s.as_str()).collect();
        writeln!(
            f,
            "StokesSpectralCube with shape={:?} and stokes={}",
            self.shape(),
            labels.join(",")
        )?;
        write!(f, "{}", self.wcs)
    }
}
