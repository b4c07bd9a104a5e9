//! Human-readable reports for the command-line tool
//!
//! These functions print to standard output; library code logs through
//! `tracing` instead.

use crate::beam::BeamInfo;
use crate::cube::{LoadedCube, SpectralCube};
use crate::errors::Result;
use crate::loader::LoadedImage;
use crate::selection::Selector;
use crate::statistics::Projection;
use crate::wcs::Wcs;
use ndarray::ArrayD;

/// Summary statistics of the finite values of an array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub std_dev: f64,
    pub finite: usize,
    pub total: usize,
}

/// Min, max, mean and standard deviation over the finite elements
#[must_use]
pub fn summarize_values(data: &ArrayD<f32>) -> ValueSummary {
    let finite: Vec<f64> = data
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| f64::from(v))
        .collect();
    let n = finite.len();
    if n == 0 {
        return ValueSummary {
            min: f32::NAN,
            max: f32::NAN,
            mean: f64::NAN,
            std_dev: f64::NAN,
            finite: 0,
            total: data.len(),
        };
    }
    let mean = finite.iter().sum::<f64>() / n as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let (min, max) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    ValueSummary {
        min,
        max,
        mean,
        std_dev: var.sqrt(),
        finite: n,
        total: data.len(),
    }
}

fn print_wcs(wcs: &Wcs) {
    println!("\n World Coordinates (FITS order)");
    println!("================================");
    println!("{wcs}");
    if let Some(equinox) = wcs.equinox {
        println!("    equinox: {equinox}");
    }
    if let Some(restfrq) = wcs.restfrq {
        println!("    rest frequency: {restfrq} Hz");
    }
}

fn print_beam(beam: &BeamInfo) {
    println!("\n Beam");
    println!("======");
    match beam {
        BeamInfo::NoBeam => println!("    (no beam information)"),
        BeamInfo::Single(beam) => println!("    {beam}"),
        BeamInfo::Varying(beams) => {
            println!("    {} per-channel beams", beams.len());
            for (channel, beam) in beams.iter().enumerate() {
                println!("    [{channel}] {beam}");
            }
        }
    }
}

fn print_cube_line(label: &str, cube: &SpectralCube) {
    let mask = if cube.mask().is_stored() {
        "stored mask"
    } else {
        "no mask"
    };
    println!(
        "    {label}: shape {:?}, unit {}, {mask}",
        cube.shape(),
        cube.unit()
    );
}

/// Print a summary of a loaded image: shape, unit, components, coordinates,
/// beams and load warnings
pub fn print_summary(image: &LoadedImage) {
    let cube = &image.cube;
    println!("\n===== Image =====");
    for (key, value) in cube.meta().iter() {
        println!("- {key}: {value}");
    }

    println!("\n Cube");
    println!("======");
    match cube {
        LoadedCube::Spectral(c) if c.is_varying_resolution() => {
            print_cube_line("VaryingResolutionSpectralCube", c);
        }
        LoadedCube::Spectral(c) => print_cube_line("SpectralCube", c),
        LoadedCube::Stokes(s) => {
            println!("    {} polarization components", s.components().len());
            for (label, component) in s.components() {
                print_cube_line(label.as_str(), component);
            }
        }
    }

    print_wcs(cube.wcs());
    print_beam(cube.primary().beam_info());

    if !image.warnings.is_empty() {
        println!("\n Warnings");
        println!("==========");
        for warning in &image.warnings {
            println!("    {warning}");
        }
    }
}

/// Print the values of `cube` picked by `selection`, followed by statistics
pub fn print_selection(cube: &SpectralCube, selection: &[Selector], fill: Option<f32>) -> Result<()> {
    let data = match fill {
        Some(fill) => cube.filled_data(selection, fill)?,
        None => cube.unmasked_data(selection)?,
    };
    let text: Vec<String> = selection.iter().map(ToString::to_string).collect();

    println!("\n Selection [{}]", text.join(", "));
    println!("================================");
    println!("   Shape: {:?}", data.shape());
    println!("   Unit: {}", cube.unit());
    if data.len() <= 100 {
        println!("   Values: {data}");
    } else {
        println!("   ({} values, too many to print)", data.len());
    }

    let summary = summarize_values(&data);
    println!("   Min: {}", summary.min);
    println!("   Max: {}", summary.max);
    println!("   Mean: {:.4}", summary.mean);
    println!("   Std Dev: {:.4}", summary.std_dev);
    println!("   Finite: {} of {}", summary.finite, summary.total);
    Ok(())
}

/// Print a moment map summary
pub fn print_projection(label: &str, projection: &Projection) {
    println!("\n {label}");
    println!("================================");
    println!("   Shape: {:?}", projection.shape());
    println!("   Unit: {}", projection.unit);
    println!("   {}", projection.stats());
}
