//! Restoring beam metadata
//!
//! The service reports the restoring beam as a free-form record in one of
//! two shapes:
//!
//! ```text
//! { "major": {"value": 1.0, "unit": "arcsec"}, "minor": {..}, "positionangle": {..} }
//!
//! { "nChannels": 3, "nStokes": 1,
//!   "beams": { "*0": { "*0": { "major": {..}, "minor": {..}, "positionangle": {..} } },
//!              "*1": { "*0": {..} }, ... } }
//! ```
//!
//! [`normalize_beam`] turns either into a [`BeamInfo`]. A record with neither
//! shape means the image has no beam.

use crate::errors::{CubeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A value tagged with its physical unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    #[must_use]
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// The value converted to degrees, for angular units
    pub fn to_degrees(&self) -> Result<f64> {
        let factor = match self.unit.as_str() {
            "deg" | "degree" | "degrees" => 1.0,
            "arcmin" => 1.0 / 60.0,
            "arcsec" => 1.0 / 3600.0,
            "mas" => 1.0 / 3_600_000.0,
            "rad" | "radian" | "radians" => 180.0 / std::f64::consts::PI,
            other => return Err(CubeError::Unit(format!("'{other}' is not an angular unit"))),
        };
        Ok(self.value * factor)
    }

    fn from_record(record: &JsonValue, field: &str) -> Result<Self> {
        let entry = record.get(field).ok_or_else(|| CubeError::MalformedBeam {
            message: format!("missing '{field}'"),
        })?;
        let value = entry
            .get("value")
            .and_then(JsonValue::as_f64)
            .ok_or_else(|| CubeError::MalformedBeam {
                message: format!("'{field}' has no numeric value"),
            })?;
        let unit = entry
            .get("unit")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CubeError::MalformedBeam {
                message: format!("'{field}' has no unit"),
            })?;
        Ok(Self::new(value, unit))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Elliptical Gaussian restoring beam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub major: Quantity,
    pub minor: Quantity,
    pub pa: Quantity,
}

impl Beam {
    #[must_use]
    pub fn new(major: Quantity, minor: Quantity, pa: Quantity) -> Self {
        Self { major, minor, pa }
    }

    fn from_record(record: &JsonValue) -> Result<Self> {
        Ok(Self {
            major: Quantity::from_record(record, "major")?,
            minor: Quantity::from_record(record, "minor")?,
            pa: Quantity::from_record(record, "positionangle")?,
        })
    }

    /// Beam solid angle in steradians
    pub fn sr(&self) -> Result<f64> {
        let fwhm_to_sigma = 1.0 / (8.0 * 2f64.ln()).sqrt();
        let major = self.major.to_degrees()?.to_radians() * fwhm_to_sigma;
        let minor = self.minor.to_degrees()?.to_radians() * fwhm_to_sigma;
        Ok(2.0 * std::f64::consts::PI * major * minor)
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Beam: BMAJ={} BMIN={} BPA={}", self.major, self.minor, self.pa)
    }
}

/// One beam per spectral channel, channel order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Beams {
    beams: Vec<Beam>,
}

impl Beams {
    #[must_use]
    pub fn new(beams: Vec<Beam>) -> Self {
        Self { beams }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.beams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    #[must_use]
    pub fn get(&self, channel: usize) -> Option<&Beam> {
        self.beams.get(channel)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Beam> {
        self.beams.iter()
    }

    /// Major axes of all channels
    #[must_use]
    pub fn majors(&self) -> Vec<Quantity> {
        self.beams.iter().map(|b| b.major.clone()).collect()
    }

    /// The beam with the largest major axis
    #[must_use]
    pub fn largest(&self) -> Option<&Beam> {
        self.beams.iter().max_by(|a, b| {
            let deg = |q: &Quantity| q.to_degrees().unwrap_or(f64::NAN);
            deg(&a.major).total_cmp(&deg(&b.major))
        })
    }
}

impl<'a> IntoIterator for &'a Beams {
    type Item = &'a Beam;
    type IntoIter = std::slice::Iter<'a, Beam>;

    fn into_iter(self) -> Self::IntoIter {
        self.beams.iter()
    }
}

/// Normalized beam metadata of an image
#[derive(Debug, Clone, PartialEq)]
pub enum BeamInfo {
    NoBeam,
    Single(Beam),
    Varying(Beams),
}

impl BeamInfo {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, BeamInfo::NoBeam)
    }
}

fn count_field(record: &JsonValue, field: &str) -> Result<u64> {
    let value = record.get(field).ok_or_else(|| CubeError::MalformedBeam {
        message: format!("beam table has no '{field}'"),
    })?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0 && v.fract() == 0.0).map(|v| v as u64))
        .ok_or_else(|| CubeError::MalformedBeam {
            message: format!("'{field}' is not a count"),
        })
}

/// Normalize a restoring-beam record.
///
/// # Errors
///
/// [`CubeError::MultiPolarizationBeams`] for a table covering more than one
/// polarization, [`CubeError::InconsistentBeamTable`] when the table size
/// differs from `nChannels`, [`CubeError::MalformedBeam`] for records with
/// missing or mistyped fields.
pub fn normalize_beam(record: &JsonValue) -> Result<BeamInfo> {
    if record.get("major").is_some() {
        return Ok(BeamInfo::Single(Beam::from_record(record)?));
    }

    let Some(table) = record.get("beams") else {
        return Ok(BeamInfo::NoBeam);
    };

    let n_stokes = count_field(record, "nStokes")?;
    if n_stokes > 1 {
        return Err(CubeError::MultiPolarizationBeams { n_stokes });
    }

    let entries = table.as_object().ok_or_else(|| CubeError::MalformedBeam {
        message: "'beams' is not a record".to_string(),
    })?;
    let channels = count_field(record, "nChannels")?;
    if entries.len() as u64 != channels {
        return Err(CubeError::InconsistentBeamTable {
            beams: entries.len(),
            channels,
        });
    }

    let stokes_key = "*0";
    (0..entries.len())
        .map(|channel| {
            let key = format!("*{channel}");
            let entry = entries
                .get(&key)
                .and_then(|e| e.get(stokes_key))
                .ok_or_else(|| CubeError::MalformedBeam {
                    message: format!("no beam for channel {key}, polarization {stokes_key}"),
                })?;
            Beam::from_record(entry)
        })
        .collect::<Result<Vec<_>>>()
        .map(|beams| BeamInfo::Varying(Beams::new(beams)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(major: f64) -> JsonValue {
        json!({
            "major": {"value": major, "unit": "arcsec"},
            "minor": {"value": 1.0, "unit": "arcsec"},
            "positionangle": {"value": 0.0, "unit": "deg"},
        })
    }

    fn table(n: usize, n_stokes: u64, n_channels: usize) -> JsonValue {
        let beams: serde_json::Map<String, JsonValue> = (0..n)
            .map(|i| (format!("*{i}"), json!({ "*0": record(1.0 + i as f64) })))
            .collect();
        json!({ "beams": beams, "nStokes": n_stokes, "nChannels": n_channels })
    }

    #[test]
    fn scalar_record_gives_single_beam() {
        let info = normalize_beam(&record(2.0)).unwrap();
        let BeamInfo::Single(beam) = &info else {
            panic!("expected a single beam, got {info:?}");
        };
        assert_eq!(beam.major, Quantity::new(2.0, "arcsec"));
        assert_eq!(beam.pa.unit, "deg");
    }

    #[test]
    fn table_gives_beams_in_channel_order() {
        let info = normalize_beam(&table(3, 1, 3)).unwrap();
        let BeamInfo::Varying(beams) = &info else {
            panic!("expected varying beams, got {info:?}");
        };
        assert_eq!(beams.len(), 3);
        let majors: Vec<f64> = beams.majors().iter().map(|q| q.value).collect();
        assert_eq!(majors, vec![1.0, 2.0, 3.0]);
        assert_eq!(beams.largest().map(|b| b.major.value), Some(3.0));
    }

    #[test]
    fn multiple_polarizations_are_not_implemented() {
        let err = normalize_beam(&table(3, 2, 3)).unwrap_err();
        assert!(matches!(err, CubeError::MultiPolarizationBeams { n_stokes: 2 }));
    }

    #[test]
    fn channel_count_must_match_table() {
        let err = normalize_beam(&table(3, 1, 4)).unwrap_err();
        assert!(matches!(err, CubeError::InconsistentBeamTable { beams: 3, channels: 4 }));
    }

    #[test]
    fn empty_record_means_no_beam() {
        assert_eq!(normalize_beam(&json!({})).unwrap(), BeamInfo::NoBeam);
    }

    #[test]
    fn angular_conversion() {
        assert!((Quantity::new(3600.0, "arcsec").to_degrees().unwrap() - 1.0).abs() < 1e-12);
        assert!(Quantity::new(1.0, "Hz").to_degrees().is_err());
    }
}
