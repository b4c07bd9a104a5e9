//! Command-line options for the `casa-cube` inspector

use casa_cube::selection::{parse_selection, Selector};
use casa_cube::wcs::Stokes;
use clap::Parser;
use std::path::PathBuf;

/// Inspect CASA image cubes
#[derive(Parser, Debug)]
#[command(
    name = "casa-cube",
    version,
    about = "Lazy inspection of CASA image cubes"
)]
pub struct Args {
    /// Path to the .image directory
    #[arg(short, long)]
    pub file: PathBuf,

    /// Print the values picked by a selection, e.g. "0,0,:" or "2:4,...,-1"
    #[arg(long, value_parser = parse_selection_arg)]
    pub slice: Option<SelectionArg>,

    /// Compute and summarize the zeroth moment
    #[arg(long)]
    pub moment0: bool,

    /// Polarization component to operate on for 4-axis images (default I, else the first)
    #[arg(long, value_parser = parse_stokes_arg)]
    pub stokes: Option<Stokes>,

    /// Do not read the validity mask
    #[arg(long)]
    pub skip_mask: bool,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Write the cube's validity mask as a new image at this path, or with
    /// --append-to, the name the mask gets inside that image
    #[arg(long)]
    pub write_mask: Option<PathBuf>,

    /// Define the mask inside this image and make it the default mask
    #[arg(long, requires = "write_mask")]
    pub append_to: Option<PathBuf>,

    /// Overwrite an existing mask image
    #[arg(long, requires = "write_mask")]
    pub overwrite: bool,
}

/// A parsed `--slice` selection
#[derive(Debug, Clone)]
pub struct SelectionArg(pub Vec<Selector>);

fn parse_selection_arg(s: &str) -> Result<SelectionArg, String> {
    parse_selection(s).map(SelectionArg).map_err(|e| e.to_string())
}

fn parse_stokes_arg(s: &str) -> Result<Stokes, String> {
    (-8..=4)
        .filter_map(Stokes::from_code)
        .find(|stokes| stokes.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("Invalid polarization '{s}': expected one of I, Q, U, V, RR, LL, RL, LR, XX, YY, XY, YX"))
}
