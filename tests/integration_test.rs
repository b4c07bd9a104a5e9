//! End-to-end tests: images written through the directory service, loaded
//! back as lazy cubes.

use casa_cube::cube::{BooleanArrayMask, LoadedCube, SpectralCube};
use casa_cube::data_source::ArraySource;
use casa_cube::lazy_array::CasaData;
use casa_cube::selection::Selector;
use casa_cube::service::{CoordinateAxis, CoordinateSystem, DirectoryImageTool, ImageTool, ServiceError};
use casa_cube::wcs::Stokes;
use casa_cube::{load_casa_image, make_casa_mask, sel, CubeError, LoadOptions, LoadWarning, MaskWriteOptions};
use futures::StreamExt;
use ndarray::{s, ArrayD, Axis, Dimension, IxDyn};
use serde_json::{json, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn axis(ctype: &str, crval: f64, cdelt: f64, unit: &str) -> CoordinateAxis {
    CoordinateAxis {
        name: ctype.split('-').next().unwrap_or_default().to_string(),
        ctype: ctype.to_string(),
        crval,
        cdelt,
        crpix: 1.0,
        unit: unit.to_string(),
    }
}

fn ra() -> CoordinateAxis {
    axis("RA---SIN", 180.0, -1.0e-3, "deg")
}

fn dec() -> CoordinateAxis {
    axis("DEC--SIN", 30.0, 1.0e-3, "deg")
}

fn freq() -> CoordinateAxis {
    axis("FREQ", 1.0e9, 1.0e6, "Hz")
}

fn stokes() -> CoordinateAxis {
    axis("STOKES", 1.0, 1.0, "")
}

fn csys(axes: Vec<CoordinateAxis>) -> CoordinateSystem {
    CoordinateSystem {
        axes,
        equinox: Some(2000.0),
        rest_frequency: Some(1.0e9),
    }
}

fn beam_record(major_arcsec: f64) -> JsonValue {
    json!({
        "major": {"value": major_arcsec, "unit": "arcsec"},
        "minor": {"value": 1.0, "unit": "arcsec"},
        "positionangle": {"value": 30.0, "unit": "deg"},
    })
}

fn beam_table(n_channels: usize, n_stokes: u64) -> JsonValue {
    let beams: serde_json::Map<String, JsonValue> = (0..n_channels)
        .map(|c| (format!("*{c}"), json!({ "*0": beam_record(2.0 + c as f64) })))
        .collect();
    json!({ "beams": beams, "nChannels": n_channels, "nStokes": n_stokes })
}

/// Write an image with pixels `value(native index)` and a unit of Jy/beam
fn write_image(
    dir: &Path,
    name: &str,
    native_shape: &[usize],
    axes: Vec<CoordinateAxis>,
    value: impl Fn(&[usize]) -> f32,
) -> PathBuf {
    let tool = DirectoryImageTool::new();
    let path = dir.join(name);
    let pixels = ArrayD::from_shape_fn(IxDyn(native_shape), |idx| value(idx.slice()));
    tool.new_image_from_array(&path, &pixels, &csys(axes))
        .expect("Failed to create test image");
    tool.set_brightness_unit(&path, "Jy/beam")
        .expect("Failed to set brightness unit");
    path
}

/// 3x4x5 cube of ones (5 RA, 4 Dec, 3 channels) with a single beam and an
/// all-valid stored mask named mask0
fn basic_image(dir: &Path) -> PathBuf {
    let tool = DirectoryImageTool::new();
    let path = write_image(dir, "basic.image", &[5, 4, 3], vec![ra(), dec(), freq()], |_| 1.0);
    tool.set_restoring_beam(&path, beam_record(2.0))
        .expect("Failed to set beam");
    tool.put_mask(&path, "mask0", &ArrayD::from_elem(IxDyn(&[5, 4, 3]), true))
        .expect("Failed to write mask");
    path
}

/// Pixel value encoding its conventional position: 100*channel + 10*y + x
fn coded(c: usize, y: usize, x: usize) -> f32 {
    (100 * c + 10 * y + x) as f32
}

fn coded_image(dir: &Path) -> PathBuf {
    write_image(dir, "coded.image", &[5, 4, 3], vec![ra(), dec(), freq()], |i| {
        coded(i[2], i[1], i[0])
    })
}

fn coded_expected() -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |i| coded(i[0], i[1], i[2]))
}

fn load(path: &Path) -> LoadedCube {
    load_casa_image(Arc::new(DirectoryImageTool::new()), path, &LoadOptions::default())
        .expect("Failed to load image")
        .cube
}

fn load_spectral(path: &Path) -> SpectralCube {
    load(path)
        .as_spectral()
        .cloned()
        .expect("Expected a spectral cube")
}

fn scratch() -> TempDir {
    tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_basic_cube_reads() {
    let dir = scratch();
    let cube = load_spectral(&basic_image(dir.path()));

    assert_eq!(cube.shape(), &[3, 4, 5]);
    assert_eq!(cube.unit(), "Jy/beam");
    assert!(cube.mask().is_stored());

    let spectrum = cube.unmasked_data(&sel![0, 0, ..]).expect("Failed to read row");
    assert_eq!(spectrum.shape(), &[5]);
    assert!(spectrum.iter().all(|&v| v == 1.0));

    let pixel = cube.unmasked_data(&sel![0, 1, 2]).expect("Failed to read pixel");
    assert_eq!(pixel.ndim(), 0);
    assert_eq!(pixel.iter().copied().collect::<Vec<_>>(), vec![1.0]);

    let channels = cube.unmasked_data(&sel![.., 0, 0]).expect("Failed to read spectrum");
    assert_eq!(channels.shape(), &[3]);
    assert!(channels.iter().all(|&v| v == 1.0));

    let moment = cube.moment0().expect("Failed to compute moment 0");
    assert_eq!(moment.shape(), &[4, 5]);
}

#[test]
fn test_moment0_values_and_unit() {
    let dir = scratch();
    let cube = load_spectral(&basic_image(dir.path()));

    let moment = cube.moment0().expect("Failed to compute moment 0");
    // Three channels of 1 Jy/beam, 1 MHz wide
    assert!(moment.data.iter().all(|&v| (v - 3.0e6).abs() < 1.0));
    assert_eq!(moment.unit, "Jy/beam Hz");
    assert_eq!(moment.wcs.naxis(), 2);

    let stats = moment.stats();
    assert_eq!(stats.valid, 20);
    assert_eq!(stats.total, 20);
}

#[test]
fn test_world_coordinates_in_fits_order() {
    let dir = scratch();
    let cube = load_spectral(&basic_image(dir.path()));

    let ctypes: Vec<&str> = cube.wcs().axes.iter().map(|a| a.ctype.as_str()).collect();
    assert_eq!(ctypes, vec!["RA---SIN", "DEC--SIN", "FREQ"]);
    assert_eq!(cube.wcs().equinox, Some(2000.0));
    assert_eq!(cube.wcs().restfrq, Some(1.0e9));
    assert_eq!(cube.spectral_axis(), vec![1.0e9, 1.001e9, 1.002e9]);
}

#[test]
fn test_missing_file() {
    let dir = scratch();
    let missing = dir.path().join("nonexistent.image");

    let err = load_casa_image(Arc::new(DirectoryImageTool::new()), &missing, &LoadOptions::default())
        .expect_err("Loading a missing image should fail");

    match &err {
        CubeError::FileNotFound { path, source } => {
            assert_eq!(path, &missing);
            assert!(matches!(source, ServiceError::PathNotFound { .. }));
        }
        other => panic!("expected FileNotFound, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.starts_with("File "));
    assert!(message.contains("not found.  Error was: "));
}

#[test]
fn test_other_open_failures_pass_through() {
    let dir = scratch();
    // A directory that exists but is not an image
    let bogus = dir.path().join("empty.image");
    fs::create_dir(&bogus).expect("Failed to create directory");

    let err = load_casa_image(Arc::new(DirectoryImageTool::new()), &bogus, &LoadOptions::default())
        .expect_err("Loading a non-image should fail");
    assert!(matches!(err, CubeError::Service(ServiceError::Format { .. })));
}

#[test]
fn test_unsupported_dimensions() {
    let dir = scratch();
    let tool = Arc::new(DirectoryImageTool::new());

    let two = write_image(dir.path(), "two.image", &[5, 4], vec![ra(), dec()], |_| 1.0);
    let err = load_casa_image(Arc::clone(&tool), &two, &LoadOptions::default())
        .expect_err("2-D images are not cubes");
    assert!(matches!(err, CubeError::UnsupportedDimensions { naxis: 2 }));
    assert_eq!(
        err.to_string(),
        "CASA image has 2 dimensions, and therefore is not readable as a spectral cube"
    );

    let five = write_image(
        dir.path(),
        "five.image",
        &[2, 2, 2, 1, 1],
        vec![ra(), dec(), freq(), stokes(), axis("TIME", 0.0, 1.0, "s")],
        |_| 1.0,
    );
    let err = load_casa_image(tool, &five, &LoadOptions::default())
        .expect_err("5-D images are not cubes");
    assert!(matches!(err, CubeError::UnsupportedDimensions { naxis: 5 }));
}

#[test]
fn test_lazy_reads_match_eager_slicing() {
    let dir = scratch();
    let cube = load_spectral(&coded_image(dir.path()));
    let expected = coded_expected();

    let full = cube.unmasked_data(&[]).expect("Failed to read cube");
    assert_eq!(full, expected);

    let plane = cube.unmasked_data(&sel![1, 1i64..3, ..]).expect("Failed to read plane");
    assert_eq!(plane, expected.slice(s![1, 1..3, ..]).into_dyn().to_owned());

    let strided = cube
        .unmasked_data(&sel![.., 2, Selector::range(0, 5, 2)])
        .expect("Failed to read strided row");
    assert_eq!(strided, expected.slice(s![.., 2, 0..5;2]).into_dyn().to_owned());

    let tail = cube.unmasked_data(&sel![-1, .., -1]).expect("Failed to read last column");
    assert_eq!(tail, expected.slice(s![2, .., 4]).into_dyn().to_owned());

    let chunked = cube.chunked().compute().expect("Failed to compute chunks");
    assert_eq!(chunked, expected);
}

#[test]
fn test_index_drops_axis_but_unit_slice_keeps_it() {
    let dir = scratch();
    let cube = load_spectral(&coded_image(dir.path()));

    let indexed = cube.unmasked_data(&sel![1]).expect("Failed to read channel");
    let sliced = cube.unmasked_data(&sel![1i64..2]).expect("Failed to read channel slice");

    assert_eq!(indexed.shape(), &[4, 5]);
    assert_eq!(sliced.shape(), &[1, 4, 5]);
    assert_eq!(sliced.index_axis(Axis(0), 0), indexed.view());
}

#[test]
fn test_out_of_range_index_is_rejected() {
    let dir = scratch();
    let cube = load_spectral(&coded_image(dir.path()));

    let err = cube
        .unmasked_data(&sel![3])
        .expect_err("Channel 3 of 3 is out of range");
    assert!(matches!(
        err,
        CubeError::IndexOutOfBounds {
            axis: 0,
            index: 3,
            size: 3
        }
    ));
}

#[test]
fn test_empty_selection_does_not_touch_the_service() {
    let dir = scratch();
    let path = coded_image(dir.path());
    let cube = load_spectral(&path);

    fs::remove_dir_all(&path).expect("Failed to remove image");

    let empty = cube.unmasked_data(&sel![2i64..2]).expect("Empty selection should succeed");
    assert_eq!(empty.shape(), &[0, 4, 5]);

    let err = cube
        .unmasked_data(&sel![0])
        .expect_err("Reading a removed image should fail");
    assert!(matches!(err, CubeError::FileNotFound { .. }));
}

#[test]
fn test_reorients_non_standard_axis_order() {
    let dir = scratch();
    // Native axes: frequency, RA, Dec
    let path = write_image(dir.path(), "rotated.image", &[3, 5, 4], vec![freq(), ra(), dec()], |i| {
        coded(i[0], i[2], i[1])
    });
    let cube = load_spectral(&path);

    assert_eq!(cube.shape(), &[3, 4, 5]);
    let ctypes: Vec<&str> = cube.wcs().axes.iter().map(|a| a.ctype.as_str()).collect();
    assert_eq!(ctypes, vec!["RA---SIN", "DEC--SIN", "FREQ"]);

    let full = cube.unmasked_data(&[]).expect("Failed to read cube");
    assert_eq!(full, coded_expected());

    let spectrum = cube.unmasked_data(&sel![.., 3, 4]).expect("Failed to read spectrum");
    assert_eq!(spectrum.iter().copied().collect::<Vec<_>>(), vec![34.0, 134.0, 234.0]);
}

#[test]
fn test_stored_mask_hides_pixels() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let path = coded_image(dir.path());
    // First RA column invalid
    let mask = ArrayD::from_shape_fn(IxDyn(&[5, 4, 3]), |i| i[0] != 0);
    tool.put_mask(&path, "mask0", &mask).expect("Failed to write mask");

    let cube = load_spectral(&path);
    assert_eq!(cube.mask().shape(), cube.shape());

    let valid = cube.mask().include(&sel![.., .., 0]).expect("Failed to read mask");
    assert!(valid.iter().all(|&v| !v));
    let excluded = cube.mask().exclude(&sel![.., .., 1]).expect("Failed to read mask");
    assert!(excluded.iter().all(|&v| !v));

    let filled = cube.filled_data(&sel![0, 0, ..], f32::NAN).expect("Failed to read row");
    assert!(filled[[0]].is_nan());
    assert_eq!(filled[[1]], 1.0);

    let moment = cube.moment0().expect("Failed to compute moment 0");
    assert!(moment.data.column(0).iter().all(|v| v.is_nan()));
    assert!(moment.data.column(1).iter().all(|v| v.is_finite()));
}

#[test]
fn test_skip_valid_ignores_stored_mask() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let path = coded_image(dir.path());
    tool.put_mask(&path, "mask0", &ArrayD::from_elem(IxDyn(&[5, 4, 3]), false))
        .expect("Failed to write mask");

    let image = load_casa_image(Arc::new(tool), &path, &LoadOptions { skip_valid: true })
        .expect("Failed to load image");
    let cube = image.cube.primary();

    assert!(!cube.mask().is_stored());
    assert!(cube.mask().include(&[]).expect("Failed to read mask").iter().all(|&v| v));
}

#[test]
fn test_beam_variants() {
    let dir = scratch();
    let tool = Arc::new(DirectoryImageTool::new());

    let single = basic_image(dir.path());
    let image = load_casa_image(Arc::clone(&tool), &single, &LoadOptions::default())
        .expect("Failed to load image");
    assert!(image.warnings.is_empty());
    let beam = image.cube.primary().beam().expect("Expected a single beam");
    assert_eq!(beam.major.value, 2.0);
    assert_eq!(beam.pa.unit, "deg");

    let none = coded_image(dir.path());
    let image = load_casa_image(Arc::clone(&tool), &none, &LoadOptions::default())
        .expect("Failed to load image");
    assert_eq!(image.warnings, vec![LoadWarning::MissingBeam]);
    assert!(image.cube.primary().beam_info().is_missing());
    assert_eq!(
        image.warnings[0].to_string(),
        "No beam information found in CASA image."
    );

    tool.set_restoring_beam(&none, beam_table(3, 1))
        .expect("Failed to set beam table");
    let image = load_casa_image(Arc::clone(&tool), &none, &LoadOptions::default())
        .expect("Failed to load image");
    let cube = image.cube.primary();
    assert!(cube.is_varying_resolution());
    let majors: Vec<f64> = cube
        .beams()
        .expect("Expected per-channel beams")
        .iter()
        .map(|b| b.major.value)
        .collect();
    assert_eq!(majors, vec![2.0, 3.0, 4.0]);

    let mut short_table = beam_table(2, 1);
    short_table["nChannels"] = json!(3);
    tool.set_restoring_beam(&none, short_table)
        .expect("Failed to set beam table");
    let err = load_casa_image(Arc::clone(&tool), &none, &LoadOptions::default())
        .expect_err("Beam table is shorter than the channel count");
    assert!(matches!(
        err,
        CubeError::InconsistentBeamTable {
            beams: 2,
            channels: 3
        }
    ));
}

/// 4-axis image: RA, Dec, frequency and two polarizations (I, Q), one beam
/// per channel
fn stokes_image(dir: &Path) -> PathBuf {
    let tool = DirectoryImageTool::new();
    let path = write_image(
        dir,
        "stokes.image",
        &[5, 4, 3, 2],
        vec![ra(), dec(), freq(), stokes()],
        |i| 1000.0 * i[3] as f32 + coded(i[2], i[1], i[0]),
    );
    tool.set_restoring_beam(&path, beam_table(3, 1))
        .expect("Failed to set beam table");
    // Q is masked out entirely
    let mask = ArrayD::from_shape_fn(IxDyn(&[5, 4, 3, 2]), |i| i[3] == 0);
    tool.put_mask(&path, "mask0", &mask).expect("Failed to write mask");
    path
}

#[test]
fn test_polarization_cube() {
    let dir = scratch();
    let loaded = load(&stokes_image(dir.path()));

    let cube = loaded.as_stokes().expect("Expected a polarization cube");
    assert_eq!(cube.labels(), vec![Stokes::I, Stokes::Q]);
    assert_eq!(cube.shape(), &[3, 4, 5]);
    assert_eq!(cube.wcs().naxis(), 3);

    // The container mask is the primary component's, on the container's coordinates
    assert_eq!(cube.mask().shape(), cube.shape());
    assert_eq!(cube.mask().wcs(), cube.wcs());

    let stokes_i = cube.get(Stokes::I).expect("Missing Stokes I");
    let stokes_q = cube.get(Stokes::Q).expect("Missing Stokes Q");
    assert_eq!(stokes_i.unmasked_data(&[]).expect("Failed to read I"), coded_expected());
    assert_eq!(
        stokes_q.unmasked_data(&[]).expect("Failed to read Q"),
        coded_expected().mapv(|v| v + 1000.0)
    );

    assert!(stokes_i.mask().include(&[]).expect("Failed to read mask").iter().all(|&v| v));
    assert!(stokes_q.mask().include(&[]).expect("Failed to read mask").iter().all(|&v| !v));

    for component in cube.components().values() {
        assert!(component.is_varying_resolution());
        assert_eq!(component.beams().map(|b| b.len()), Some(3));
    }
}

#[test]
fn test_repeated_polarization_labels_are_rejected() {
    let dir = scratch();
    let path = write_image(
        dir.path(),
        "flat_stokes.image",
        &[5, 4, 3, 3],
        vec![ra(), dec(), freq(), axis("STOKES", 1.0, 0.0, "")],
        |i| i[3] as f32,
    );

    let err = load_casa_image(Arc::new(DirectoryImageTool::new()), &path, &LoadOptions::default())
        .expect_err("Three planes all labelled I cannot be told apart");
    assert!(matches!(err, CubeError::UnsupportedAxes { .. }));
}

#[test]
fn test_polarization_beam_tables_are_rejected() {
    let dir = scratch();
    let tool = Arc::new(DirectoryImageTool::new());
    let path = stokes_image(dir.path());
    tool.set_restoring_beam(&path, beam_table(3, 2))
        .expect("Failed to set beam table");

    let err = load_casa_image(tool, &path, &LoadOptions::default())
        .expect_err("Multi-polarization beam tables are not supported");
    assert!(matches!(err, CubeError::MultiPolarizationBeams { n_stokes: 2 }));
}

#[test]
fn test_make_casa_mask_from_broadcast_mask() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let cube = load_spectral(&coded_image(dir.path()));

    // Spatial pattern broadcast over every channel
    let plane = ArrayD::from_shape_fn(IxDyn(&[4, 5]), |i| (i[0] + i[1]) % 2 == 0);
    let mask = plane
        .broadcast(IxDyn(&[3, 4, 5]))
        .expect("Failed to broadcast mask")
        .to_owned();
    let masked = cube
        .with_mask(BooleanArrayMask::from_array(mask.clone(), cube.wcs().clone()))
        .expect("Failed to attach mask");

    let out = dir.path().join("written_mask.image");
    make_casa_mask(&tool, &masked, &out, &MaskWriteOptions::default()).expect("Failed to write mask");

    let written = CasaData::new(Arc::new(tool), &out).expect("Failed to open mask image");
    assert_eq!(written.shape(), &[3, 4, 5]);
    let values = written.read_all().expect("Failed to read mask image");
    assert_eq!(values, mask.mapv(|v| if v { 1.0 } else { 0.0 }));

    let reloaded = load_spectral(&out);
    assert_eq!(reloaded.wcs().kinds(), cube.wcs().kinds());
}

#[test]
fn test_make_casa_mask_with_stokes_axis() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let cube = load_spectral(&coded_image(dir.path()));

    let out = dir.path().join("stokes_mask.image");
    let options = MaskWriteOptions::default().with_stokes(true);
    make_casa_mask(&tool, &cube, &out, &options).expect("Failed to write mask");

    let loaded = load(&out);
    let stokes = loaded.as_stokes().expect("Expected a polarization mask image");
    assert_eq!(stokes.labels(), vec![Stokes::I]);
    assert_eq!(stokes.shape(), &[3, 4, 5]);
}

#[test]
fn test_make_casa_mask_from_loaded_polarization_cube() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let loaded = load(&stokes_image(dir.path()));

    let out = dir.path().join("stokes_i_mask.image");
    make_casa_mask(&tool, &loaded, &out, &MaskWriteOptions::default()).expect("Failed to write mask");

    // Stokes I is fully valid while Q is fully masked
    let written = CasaData::new(Arc::new(tool), &out).expect("Failed to open mask image");
    assert_eq!(written.shape(), &[3, 4, 5]);
    let values = written.read_all().expect("Failed to read mask image");
    assert!(values.iter().all(|&v| v == 1.0));
}

#[test]
fn test_make_casa_mask_overwrite() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let cube = load_spectral(&coded_image(dir.path()));
    let out = dir.path().join("mask.image");

    make_casa_mask(&tool, &cube, &out, &MaskWriteOptions::default()).expect("Failed to write mask");

    let err = make_casa_mask(&tool, &cube, &out, &MaskWriteOptions::default())
        .expect_err("Existing output must not be replaced silently");
    assert!(matches!(err, CubeError::Service(ServiceError::AlreadyExists { .. })));

    make_casa_mask(&tool, &cube, &out, &MaskWriteOptions::default().overwrite(true))
        .expect("Overwriting should succeed");
}

#[test]
fn test_make_casa_mask_appends_default_mask() {
    let dir = scratch();
    let tool = DirectoryImageTool::new();
    let target = basic_image(dir.path());
    let cube = load_spectral(&coded_image(dir.path()));

    let mask = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |i| i[0] != 1);
    let masked = cube
        .with_mask(BooleanArrayMask::from_array(mask.clone(), cube.wcs().clone()))
        .expect("Failed to attach mask");

    let out = dir.path().join("channel_mask.image");
    let options = MaskWriteOptions::default().append_to(&target);
    make_casa_mask(&tool, &masked, &out, &options).expect("Failed to write mask");

    // Only the target changes; no standalone mask image is left behind
    assert!(!out.exists());
    let mut entries: Vec<_> = fs::read_dir(dir.path())
        .expect("Failed to list scratch directory")
        .map(|e| e.expect("Failed to read entry").file_name())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["basic.image", "coded.image"]);
    assert_eq!(
        tool.default_mask(&target).expect("Failed to read header"),
        Some("channel_mask".to_string())
    );
    let reloaded = load_spectral(&target);
    assert_eq!(reloaded.mask().include(&[]).expect("Failed to read mask"), mask);

    // A target with a different shape is refused before anything is written
    let stokes_target = stokes_image(dir.path());
    let other = dir.path().join("other_mask.image");
    let err = make_casa_mask(&tool, &masked, &other, &MaskWriteOptions::default().append_to(&stokes_target))
        .expect_err("Shape mismatch should be reported");
    assert!(matches!(err, CubeError::ShapeMismatch { .. }));
    assert!(!other.exists());
}

#[tokio::test]
async fn test_stream_chunks_yields_channels_in_order() {
    let dir = scratch();
    let cube = load_spectral(&coded_image(dir.path()));
    let expected = coded_expected();

    let chunks: Vec<_> = cube.chunked().stream_chunks().collect().await;
    assert_eq!(chunks.len(), 3);

    for (channel, chunk) in chunks.into_iter().enumerate() {
        let chunk = chunk.expect("Failed to read chunk");
        assert_eq!(chunk.offset, vec![channel, 0, 0]);
        assert_eq!(chunk.data.shape(), &[1, 4, 5]);
        assert_eq!(
            chunk.data.index_axis(Axis(0), 0),
            expected.index_axis(Axis(0), channel)
        );
    }
}
