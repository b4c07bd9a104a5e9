//! Entry point for the `casa-cube` inspector.
//! Parses options, loads the image lazily and dispatches the requested reports.

use casa_cube::cube::{LoadedCube, SpectralCube};
use casa_cube::metadata::{print_projection, print_selection, print_summary};
use casa_cube::parallel::ParallelConfig;
use casa_cube::service::DirectoryImageTool;
use casa_cube::wcs::Stokes;
use casa_cube::{is_casa_image, load_casa_image, make_casa_mask, LoadOptions, MaskWriteOptions};
use clap::Parser;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::Args;

fn init_logging(verbose: bool) {
    let env_filter = if verbose { "casa_cube=debug" } else { "casa_cube=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn select_component<'a>(
    cube: &'a LoadedCube,
    stokes: Option<Stokes>,
) -> Result<&'a SpectralCube, Box<dyn std::error::Error>> {
    match (cube, stokes) {
        (LoadedCube::Spectral(cube), None) => Ok(cube),
        (LoadedCube::Spectral(_), Some(stokes)) => {
            Err(format!("image has no polarization axis, cannot select {stokes}").into())
        }
        (LoadedCube::Stokes(cube), None) => Ok(cube.primary()),
        (LoadedCube::Stokes(cube), Some(stokes)) => cube.get(stokes).ok_or_else(|| {
            let labels: Vec<String> = cube.labels().iter().map(ToString::to_string).collect();
            format!("no {stokes} component, image has {}", labels.join(", ")).into()
        }),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let parallel = match args.threads {
        Some(n) => ParallelConfig::with_threads(n),
        None => ParallelConfig::all_cores(),
    };
    parallel.setup_global_pool()?;

    if !is_casa_image(&args.file) {
        warn!(path = %args.file.display(), "path does not end in .image");
    }

    let tool = Arc::new(DirectoryImageTool::new());
    let options = LoadOptions {
        skip_valid: args.skip_mask,
    };
    let image = load_casa_image(Arc::clone(&tool), &args.file, &options)?;
    println!("Successfully opened CASA image: {}", args.file.display());
    print_summary(&image);

    let cube = select_component(&image.cube, args.stokes)?;

    if let Some(selection) = &args.slice {
        print_selection(cube, &selection.0, None)?;
    }

    if args.moment0 {
        let moment = cube.moment0()?;
        print_projection("Moment 0", &moment);
    }

    if let Some(outname) = &args.write_mask {
        let options = MaskWriteOptions {
            append_to_image: args.append_to.clone(),
            add_stokes: false,
            overwrite: args.overwrite,
        };
        make_casa_mask(tool.as_ref(), cube, outname, &options)?;
        match &args.append_to {
            Some(target) => println!("✅ Set default mask of {}", target.display()),
            None => println!("✅ Saved mask to {}", outname.display()),
        }
    }

    Ok(())
}
