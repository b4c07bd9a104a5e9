//! World coordinate systems
//!
//! A linear world coordinate system in FITS axis order (first axis fastest),
//! read from and written to FITS header cards. Axis types are classified from
//! the `CTYPEn` prefix; polarization axes map their world values to [`Stokes`]
//! labels.
//!
//! FITS files themselves are read and written with `fitsio-pure`; the helpers
//! at the bottom of this module only deal with the primary image and the
//! keywords a coordinate system needs.

use crate::errors::{CubeError, Result};
use fitsio_pure::hdu::parse_fits;
use fitsio_pure::header::{format_card, format_end_card, Card};
use fitsio_pure::image::{image_dimensions, read_image_data, serialize_image, ImageData};
use fitsio_pure::primary::build_primary_header;
use fitsio_pure::value::Value;
use fitsio_pure::BLOCK_SIZE;
use std::fmt;
use std::fs;
use std::path::Path;

/// One world coordinate axis
#[derive(Debug, Clone, PartialEq)]
pub struct WcsAxis {
    pub ctype: String,
    pub crval: f64,
    pub cdelt: f64,
    /// One-based reference pixel
    pub crpix: f64,
    pub cunit: String,
}

impl WcsAxis {
    #[must_use]
    pub fn kind(&self) -> AxisKind {
        AxisKind::from_ctype(&self.ctype)
    }

    /// World value at zero-based pixel `pixel`
    #[must_use]
    pub fn world(&self, pixel: f64) -> f64 {
        self.crval + (pixel + 1.0 - self.crpix) * self.cdelt
    }
}

/// Physical type of a world axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    Longitude,
    Latitude,
    Spectral,
    Stokes,
    Other,
}

impl AxisKind {
    /// Classify an axis from its `CTYPE` value
    #[must_use]
    pub fn from_ctype(ctype: &str) -> Self {
        let prefix = ctype.split('-').next().unwrap_or_default().trim();
        match prefix {
            "RA" | "GLON" | "ELON" | "SLON" | "HPLN" | "TLON" => AxisKind::Longitude,
            "DEC" | "GLAT" | "ELAT" | "SLAT" | "HPLT" | "TLAT" => AxisKind::Latitude,
            "FREQ" | "ENER" | "WAVN" | "VRAD" | "WAVE" | "VOPT" | "ZOPT" | "AWAV" | "VELO"
            | "FELO" | "BETA" => AxisKind::Spectral,
            "STOKES" => AxisKind::Stokes,
            _ => AxisKind::Other,
        }
    }
}

/// Polarization components, by their FITS `STOKES` axis code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stokes {
    I,
    Q,
    U,
    V,
    RR,
    LL,
    RL,
    LR,
    XX,
    YY,
    XY,
    YX,
}

impl Stokes {
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Stokes::I,
            2 => Stokes::Q,
            3 => Stokes::U,
            4 => Stokes::V,
            -1 => Stokes::RR,
            -2 => Stokes::LL,
            -3 => Stokes::RL,
            -4 => Stokes::LR,
            -5 => Stokes::XX,
            -6 => Stokes::YY,
            -7 => Stokes::XY,
            -8 => Stokes::YX,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Stokes::I => 1,
            Stokes::Q => 2,
            Stokes::U => 3,
            Stokes::V => 4,
            Stokes::RR => -1,
            Stokes::LL => -2,
            Stokes::RL => -3,
            Stokes::LR => -4,
            Stokes::XX => -5,
            Stokes::YY => -6,
            Stokes::XY => -7,
            Stokes::YX => -8,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Stokes::I => "I",
            Stokes::Q => "Q",
            Stokes::U => "U",
            Stokes::V => "V",
            Stokes::RR => "RR",
            Stokes::LL => "LL",
            Stokes::RL => "RL",
            Stokes::LR => "LR",
            Stokes::XX => "XX",
            Stokes::YY => "YY",
            Stokes::XY => "XY",
            Stokes::YX => "YX",
        }
    }
}

impl fmt::Display for Stokes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear world coordinate system, FITS axis order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Wcs {
    pub axes: Vec<WcsAxis>,
    pub equinox: Option<f64>,
    pub restfrq: Option<f64>,
}

impl Wcs {
    /// Parse the coordinate keywords of a primary header
    pub fn from_cards(cards: &[Card]) -> Result<Self> {
        let naxis = card_i64(cards, "WCSAXES")
            .or_else(|| card_i64(cards, "NAXIS"))
            .ok_or_else(|| CubeError::UnsupportedAxes {
                message: "header has neither WCSAXES nor NAXIS".to_string(),
            })?;
        let naxis = usize::try_from(naxis).map_err(|_| CubeError::UnsupportedAxes {
            message: format!("header declares {naxis} axes"),
        })?;

        let axes = (1..=naxis)
            .map(|n| WcsAxis {
                ctype: card_str(cards, &format!("CTYPE{n}")).unwrap_or_default(),
                crval: card_f64(cards, &format!("CRVAL{n}")).unwrap_or(0.0),
                cdelt: card_f64(cards, &format!("CDELT{n}")).unwrap_or(1.0),
                crpix: card_f64(cards, &format!("CRPIX{n}")).unwrap_or(0.0),
                cunit: card_str(cards, &format!("CUNIT{n}")).unwrap_or_default(),
            })
            .collect();

        Ok(Self {
            axes,
            equinox: card_f64(cards, "EQUINOX"),
            restfrq: card_f64(cards, "RESTFRQ").or_else(|| card_f64(cards, "RESTFREQ")),
        })
    }

    /// Read the coordinate system from the primary header of a FITS file
    pub fn from_fits_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let fits = parse_fits(&bytes)?;
        Self::from_cards(&fits.primary().cards)
    }

    /// Coordinate keyword cards, ready to follow the structural keywords
    #[must_use]
    pub fn to_cards(&self) -> Vec<Card> {
        let mut cards = Vec::with_capacity(self.axes.len() * 5 + 2);
        for (i, axis) in self.axes.iter().enumerate() {
            let n = i + 1;
            cards.push(value_card(&format!("CTYPE{n}"), Value::String(axis.ctype.clone())));
            cards.push(value_card(&format!("CRVAL{n}"), Value::Float(axis.crval)));
            cards.push(value_card(&format!("CDELT{n}"), Value::Float(axis.cdelt)));
            cards.push(value_card(&format!("CRPIX{n}"), Value::Float(axis.crpix)));
            if !axis.cunit.is_empty() {
                cards.push(value_card(&format!("CUNIT{n}"), Value::String(axis.cunit.clone())));
            }
        }
        if let Some(equinox) = self.equinox {
            cards.push(value_card("EQUINOX", Value::Float(equinox)));
        }
        if let Some(restfrq) = self.restfrq {
            cards.push(value_card("RESTFRQ", Value::Float(restfrq)));
        }
        cards
    }

    #[must_use]
    pub fn naxis(&self) -> usize {
        self.axes.len()
    }

    /// Physical types of all axes, FITS order
    #[must_use]
    pub fn kinds(&self) -> Vec<AxisKind> {
        self.axes.iter().map(WcsAxis::kind).collect()
    }

    /// FITS-order index of the first axis of `kind`
    #[must_use]
    pub fn find_axis(&self, kind: AxisKind) -> Option<usize> {
        self.axes.iter().position(|a| a.kind() == kind)
    }

    /// Copy without the FITS-order axis `axis`
    pub fn drop_axis(&self, axis: usize) -> Result<Self> {
        if axis >= self.naxis() {
            return Err(CubeError::UnsupportedAxes {
                message: format!("cannot drop axis {axis} of a {}-axis system", self.naxis()),
            });
        }
        let mut wcs = self.clone();
        wcs.axes.remove(axis);
        Ok(wcs)
    }

    /// Copy with axes rearranged; axis `k` of the result is axis `order[k]`
    pub fn reorder(&self, order: &[usize]) -> Result<Self> {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        if sorted != (0..self.naxis()).collect::<Vec<_>>() {
            return Err(CubeError::UnsupportedAxes {
                message: format!("{order:?} is not a permutation of {} axes", self.naxis()),
            });
        }
        Ok(Self {
            axes: order.iter().map(|&o| self.axes[o].clone()).collect(),
            equinox: self.equinox,
            restfrq: self.restfrq,
        })
    }

    /// World value of FITS-order axis `axis` at zero-based pixel `pixel`
    #[must_use]
    pub fn world_value(&self, axis: usize, pixel: f64) -> Option<f64> {
        self.axes.get(axis).map(|a| a.world(pixel))
    }

    /// Labels of the `n` positions along the polarization axis
    pub fn stokes_labels(&self, n: usize) -> Result<Vec<Stokes>> {
        let axis = self
            .find_axis(AxisKind::Stokes)
            .ok_or_else(|| CubeError::UnsupportedAxes {
                message: "no STOKES axis".to_string(),
            })?;
        let mut labels: Vec<Stokes> = Vec::with_capacity(n);
        for p in 0..n {
            let value = self.axes[axis].world(p as f64);
            let label = Stokes::from_code(value.round() as i64).ok_or_else(|| {
                CubeError::UnsupportedAxes {
                    message: format!("{value} is not a polarization code"),
                }
            })?;
            if labels.contains(&label) {
                return Err(CubeError::UnsupportedAxes {
                    message: format!("polarization {label} appears more than once on the STOKES axis"),
                });
            }
            labels.push(label);
        }
        Ok(labels)
    }

    /// The spectral axis, if any
    #[must_use]
    pub fn spectral_axis(&self) -> Option<&WcsAxis> {
        self.find_axis(AxisKind::Spectral).map(|i| &self.axes[i])
    }
}

impl fmt::Display for Wcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, axis) in self.axes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "  {:<10} crval={:<14} cdelt={:<14} crpix={:<6} {}",
                axis.ctype, axis.crval, axis.cdelt, axis.crpix, axis.cunit
            )?;
        }
        Ok(())
    }
}

/// Card with a keyword and value; keywords longer than eight bytes are cut
#[must_use]
pub fn value_card(keyword: &str, value: Value) -> Card {
    Card {
        keyword: keyword_bytes(keyword),
        value: Some(value),
        comment: None,
    }
}

/// `HISTORY` card carrying `text`
#[must_use]
pub fn history_card(text: &str) -> Card {
    Card {
        keyword: keyword_bytes("HISTORY"),
        value: None,
        comment: Some(text.to_string()),
    }
}

fn keyword_bytes(keyword: &str) -> [u8; 8] {
    let mut bytes = [b' '; 8];
    for (slot, b) in bytes.iter_mut().zip(keyword.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    bytes
}

fn card_value<'a>(cards: &'a [Card], keyword: &str) -> Option<&'a Value> {
    cards
        .iter()
        .find(|c| c.keyword_str() == keyword)
        .and_then(|c| c.value.as_ref())
}

/// Numeric value of `keyword`; integers are widened
#[must_use]
pub fn card_f64(cards: &[Card], keyword: &str) -> Option<f64> {
    match card_value(cards, keyword)? {
        Value::Float(v) => Some(*v),
        Value::Integer(v) => Some(*v as f64),
        _ => None,
    }
}

#[must_use]
pub fn card_i64(cards: &[Card], keyword: &str) -> Option<i64> {
    match card_value(cards, keyword)? {
        Value::Integer(v) => Some(*v),
        _ => None,
    }
}

/// String value of `keyword`, trailing blanks removed
#[must_use]
pub fn card_str(cards: &[Card], keyword: &str) -> Option<String> {
    match card_value(cards, keyword)? {
        Value::String(v) => Some(v.trim_end().to_string()),
        _ => None,
    }
}

/// Primary image read back from a FITS file
#[derive(Debug, Clone)]
pub struct FitsImage {
    /// `NAXISn` values, first axis fastest
    pub naxes: Vec<usize>,
    pub cards: Vec<Card>,
    pub data: ImageData,
}

impl FitsImage {
    /// Pixel values widened or narrowed to `f32`, file order
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.data {
            ImageData::U8(v) => v.iter().map(|&x| f32::from(x)).collect(),
            ImageData::I16(v) => v.iter().map(|&x| f32::from(x)).collect(),
            ImageData::I32(v) => v.iter().map(|&x| x as f32).collect(),
            ImageData::I64(v) => v.iter().map(|&x| x as f32).collect(),
            ImageData::F32(v) => v.clone(),
            ImageData::F64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }
}

fn bitpix_of(data: &ImageData) -> i64 {
    match data {
        ImageData::U8(_) => 8,
        ImageData::I16(_) => 16,
        ImageData::I32(_) => 32,
        ImageData::I64(_) => 64,
        ImageData::F32(_) => -32,
        ImageData::F64(_) => -64,
    }
}

/// Write a single-HDU FITS file holding `data` with shape `naxes`.
///
/// `cards` follow the structural keywords in the order given.
pub fn write_primary_image(
    path: &Path,
    naxes: &[usize],
    data: &ImageData,
    cards: &[Card],
) -> fitsio_pure::Result<()> {
    let mut header = build_primary_header(bitpix_of(data), naxes)?;
    header.extend_from_slice(cards);
    let mut bytes: Vec<u8> = header.iter().flat_map(format_card).collect();
    bytes.extend_from_slice(&format_end_card());
    bytes.resize(bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, b' ');
    bytes.extend(serialize_image(data));
    fs::write(path, bytes)?;
    Ok(())
}

/// Read the primary image and header of a FITS file
pub fn read_primary_image(path: &Path) -> fitsio_pure::Result<FitsImage> {
    let bytes = fs::read(path)?;
    let fits = parse_fits(&bytes)?;
    let primary = fits.primary();
    Ok(FitsImage {
        naxes: image_dimensions(primary)?,
        cards: primary.cards.clone(),
        data: read_image_data(&bytes, primary)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_wcs() -> Wcs {
        let axis = |ctype: &str, crval: f64, cdelt: f64, cunit: &str| WcsAxis {
            ctype: ctype.to_string(),
            crval,
            cdelt,
            crpix: 1.0,
            cunit: cunit.to_string(),
        };
        Wcs {
            axes: vec![
                axis("RA---SIN", 10.0, -0.001, "deg"),
                axis("DEC--SIN", 20.0, 0.001, "deg"),
                axis("STOKES", 1.0, 1.0, ""),
                axis("FREQ", 1.4e9, 1.0e6, "Hz"),
            ],
            equinox: Some(2000.0),
            restfrq: None,
        }
    }

    #[test]
    fn classifies_axis_types() {
        assert_eq!(
            cube_wcs().kinds(),
            vec![AxisKind::Longitude, AxisKind::Latitude, AxisKind::Stokes, AxisKind::Spectral]
        );
        assert_eq!(AxisKind::from_ctype("VRAD"), AxisKind::Spectral);
        assert_eq!(AxisKind::from_ctype("GLAT-CAR"), AxisKind::Latitude);
        assert_eq!(AxisKind::from_ctype("LINEAR"), AxisKind::Other);
    }

    #[test]
    fn header_cards_keep_axes() {
        let wcs = cube_wcs();
        let mut cards = vec![value_card("NAXIS", Value::Integer(4))];
        cards.extend(wcs.to_cards());
        assert_eq!(Wcs::from_cards(&cards).unwrap(), wcs);
        assert!(card_str(&cards, "CUNIT3").is_none());
    }

    #[test]
    fn fits_file_carries_coordinates_and_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");
        let wcs = cube_wcs();
        let data = ImageData::I16((0..24).collect());
        let mut cards = wcs.to_cards();
        cards.push(history_card("written in a test"));
        write_primary_image(&path, &[2, 3, 1, 4], &data, &cards).unwrap();

        assert_eq!(Wcs::from_fits_file(&path).unwrap(), wcs);
        let image = read_primary_image(&path).unwrap();
        assert_eq!(image.naxes, vec![2, 3, 1, 4]);
        assert_eq!(image.data, data);
        assert_eq!(image.to_f32()[5], 5.0);
        assert_eq!(card_i64(&image.cards, "BITPIX"), Some(16));
    }

    #[test]
    fn missing_fits_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Wcs::from_fits_file(&dir.path().join("absent.fits")),
            Err(CubeError::Io(_))
        ));
    }

    #[test]
    fn stokes_labels_follow_world_values() {
        let wcs = cube_wcs();
        assert_eq!(
            wcs.stokes_labels(4).unwrap(),
            vec![Stokes::I, Stokes::Q, Stokes::U, Stokes::V]
        );

        let mut circular = wcs.clone();
        circular.axes[2].crval = -1.0;
        circular.axes[2].cdelt = -1.0;
        assert_eq!(
            circular.stokes_labels(2).unwrap(),
            vec![Stokes::RR, Stokes::LL]
        );
    }

    #[test]
    fn repeated_polarization_codes_are_rejected() {
        let mut degenerate = cube_wcs();
        degenerate.axes[2].cdelt = 0.0;
        assert!(matches!(
            degenerate.stokes_labels(3),
            Err(CubeError::UnsupportedAxes { .. })
        ));
        assert_eq!(degenerate.stokes_labels(1).unwrap(), vec![Stokes::I]);

        let mut fractional = cube_wcs();
        fractional.axes[2].cdelt = 0.4;
        assert!(fractional.stokes_labels(3).is_err());
    }

    #[test]
    fn drop_and_reorder() {
        let wcs = cube_wcs().drop_axis(2).unwrap();
        assert_eq!(wcs.naxis(), 3);
        let swapped = wcs.reorder(&[1, 0, 2]).unwrap();
        assert_eq!(swapped.axes[0].ctype, "DEC--SIN");
        assert!(wcs.reorder(&[0, 0, 1]).is_err());
    }
}
