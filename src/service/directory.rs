//! Directory-backed image service
//!
//! [`DirectoryImageTool`] implements the [`ImageTool`] contract on a plain
//! directory layout, reproducing the native tool's conventions: shapes and
//! regions are in native axis order (first axis fastest), `-1` in a region
//! bound means the whole axis, `trc` is inclusive, and images without a mask
//! report every pixel as valid.
//!
//! Layout of an image directory:
//!
//! ```text
//! cube.image/
//!   header.json      shape, pixel type, coordinate system, unit, beam, default mask
//!   table.f32        pixel values, little-endian f32, first axis fastest
//!   masks/<name>     one byte per pixel, 0 = masked, first axis fastest
//! ```
//!
//! Pixels are stored as `f32` whatever pixel type the header reports.

use super::{
    CoordinateAxis, CoordinateSystem, ImageSession, ImageTool, PixelType, Region, ServiceError,
    ServiceResult,
};
use crate::wcs::{card_f64, card_str, read_primary_image, value_card, write_primary_image};
use fitsio_pure::header::Card;
use fitsio_pure::image::ImageData;
use fitsio_pure::value::Value;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_FILE: &str = "header.json";
const PIXEL_FILE: &str = "table.f32";
const MASK_DIR: &str = "masks";

fn empty_record() -> JsonValue {
    json!({})
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageHeader {
    shape: Vec<usize>,
    pixel_type: PixelType,
    coordsys: CoordinateSystem,
    #[serde(default)]
    brightness_unit: String,
    #[serde(default = "empty_record")]
    restoring_beam: JsonValue,
    #[serde(default)]
    default_mask: Option<String>,
}

impl ImageHeader {
    fn read(path: &Path) -> ServiceResult<Self> {
        let header_path = path.join(HEADER_FILE);
        if !header_path.is_file() {
            if path.exists() {
                return Err(ServiceError::Format {
                    message: format!("{} has no {HEADER_FILE}", path.display()),
                });
            }
            return Err(ServiceError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(&header_path)?;
        serde_json::from_str(&content).map_err(|e| ServiceError::Format {
            message: format!("failed to parse {}: {e}", header_path.display()),
        })
    }

    fn write(&self, path: &Path) -> ServiceResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ServiceError::Format {
            message: e.to_string(),
        })?;
        fs::write(path.join(HEADER_FILE), content)?;
        Ok(())
    }
}

/// One resolved axis of a region: first pixel, pixel count, stride
#[derive(Debug, Clone, Copy)]
struct AxisRun {
    start: usize,
    count: usize,
    step: usize,
}

fn resolve_region(shape: &[usize], region: &Region) -> ServiceResult<Vec<AxisRun>> {
    if region.ndim() != shape.len()
        || region.trc.len() != shape.len()
        || region.inc.len() != shape.len()
    {
        return Err(ServiceError::InvalidRegion {
            message: format!(
                "region has {} axes but the image has {}",
                region.ndim(),
                shape.len()
            ),
        });
    }

    shape
        .iter()
        .enumerate()
        .map(|(axis, &len)| {
            let bound = |value: i64, whole: usize| -> ServiceResult<usize> {
                match value {
                    -1 => Ok(whole),
                    v if v >= 0 && (v as usize) < len => Ok(v as usize),
                    v => Err(ServiceError::InvalidRegion {
                        message: format!("pixel {v} outside axis {axis} of length {len}"),
                    }),
                }
            };
            let start = bound(region.blc[axis], 0)?;
            let end = bound(region.trc[axis], len.saturating_sub(1))?;
            let step = region.inc[axis];
            if step < 1 || end < start {
                return Err(ServiceError::InvalidRegion {
                    message: format!(
                        "axis {axis}: blc {start}, trc {end}, inc {step} do not describe a region"
                    ),
                });
            }
            let step = step as usize;
            Ok(AxisRun {
                start,
                count: (end - start) / step + 1,
                step,
            })
        })
        .collect()
}

/// Read a strided region from a file of fixed-size elements stored first-axis-fastest
fn read_region<T>(
    file: &Path,
    shape: &[usize],
    runs: &[AxisRun],
    elem_size: usize,
    decode: impl Fn(&[u8]) -> T,
) -> ServiceResult<ArrayD<T>> {
    let (first, outer) = runs.split_first().ok_or_else(|| ServiceError::InvalidRegion {
        message: "zero-dimensional region".to_string(),
    })?;

    let mut strides = vec![1usize; shape.len()];
    for axis in 1..shape.len() {
        strides[axis] = strides[axis - 1] * shape[axis - 1];
    }

    let counts: Vec<usize> = runs.iter().map(|r| r.count).collect();
    let total: usize = counts.iter().product();
    let mut values = Vec::with_capacity(total);

    let mut reader = BufReader::new(File::open(file)?);
    let run_len = (first.count - 1) * first.step + 1;
    let mut buf = vec![0u8; run_len * elem_size];
    let mut index = vec![0usize; outer.len()];

    for _ in 0..total / first.count {
        let mut offset = first.start;
        for (k, run) in outer.iter().enumerate() {
            offset += (run.start + index[k] * run.step) * strides[k + 1];
        }
        reader.seek(SeekFrom::Start((offset * elem_size) as u64))?;
        reader.read_exact(&mut buf)?;
        values.extend(buf.chunks_exact(elem_size).step_by(first.step).map(&decode));

        for (k, run) in outer.iter().enumerate() {
            index[k] += 1;
            if index[k] < run.count {
                break;
            }
            index[k] = 0;
        }
    }

    ArrayD::from_shape_vec(IxDyn(&counts).f(), values).map_err(|e| ServiceError::Format {
        message: format!("region read produced the wrong number of pixels: {e}"),
    })
}

fn write_elements<T: Copy>(
    file: &Path,
    array: &ArrayD<T>,
    encode: impl Fn(T, &mut BufWriter<File>) -> std::io::Result<()>,
) -> ServiceResult<()> {
    let mut writer = BufWriter::new(File::create(file)?);
    // Transposed logical order is first-axis-fastest order.
    for &value in array.t().iter() {
        encode(value, &mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pixels(image: &Path, pixels: &ArrayD<f32>) -> ServiceResult<()> {
    write_elements(&image.join(PIXEL_FILE), pixels, |v, w| {
        w.write_all(&v.to_le_bytes())
    })
}

fn write_mask_bits(image: &Path, name: &str, mask: &ArrayD<bool>) -> ServiceResult<()> {
    let dir = image.join(MASK_DIR);
    fs::create_dir_all(&dir)?;
    write_elements(&dir.join(name), mask, |v, w| w.write_all(&[u8::from(v)]))
}

fn read_all_pixels(image: &Path, header: &ImageHeader) -> ServiceResult<ArrayD<f32>> {
    let runs = resolve_region(&header.shape, &Region::full(header.shape.len()))?;
    read_region(&image.join(PIXEL_FILE), &header.shape, &runs, 4, |b| {
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    })
}

fn prepare_output(outfile: &Path, overwrite: bool) -> ServiceResult<()> {
    if outfile.exists() {
        if !overwrite {
            return Err(ServiceError::AlreadyExists {
                path: outfile.to_path_buf(),
            });
        }
        fs::remove_dir_all(outfile)?;
    }
    fs::create_dir_all(outfile)?;
    Ok(())
}

fn axis_name(ctype: &str) -> &'static str {
    match ctype.split('-').next().unwrap_or_default() {
        "RA" => "Right Ascension",
        "DEC" => "Declination",
        "GLON" => "Galactic Longitude",
        "GLAT" => "Galactic Latitude",
        "FREQ" => "Frequency",
        "VRAD" | "VOPT" | "VELO" | "FELO" => "Velocity",
        "STOKES" => "Stokes",
        _ => "Linear",
    }
}

/// Filesystem implementation of the image service
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryImageTool;

impl DirectoryImageTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Set the brightness unit of an existing image
    pub fn set_brightness_unit(&self, image: &Path, unit: &str) -> ServiceResult<()> {
        let mut header = ImageHeader::read(image)?;
        header.brightness_unit = unit.to_string();
        header.write(image)
    }

    /// Replace the restoring beam record of an existing image
    pub fn set_restoring_beam(&self, image: &Path, record: JsonValue) -> ServiceResult<()> {
        let mut header = ImageHeader::read(image)?;
        header.restoring_beam = record;
        header.write(image)
    }

    /// Store `mask` (native order, `true` = valid) as a named mask and make
    /// it the default
    pub fn put_mask(&self, image: &Path, name: &str, mask: &ArrayD<bool>) -> ServiceResult<()> {
        let mut header = ImageHeader::read(image)?;
        if mask.shape() != header.shape.as_slice() {
            return Err(ServiceError::InvalidRegion {
                message: format!(
                    "mask shape {:?} does not match image shape {:?}",
                    mask.shape(),
                    header.shape
                ),
            });
        }
        write_mask_bits(image, name, mask)?;
        header.default_mask = Some(name.to_string());
        header.write(image)
    }

    /// Name of the default mask, if any
    pub fn default_mask(&self, image: &Path) -> ServiceResult<Option<String>> {
        Ok(ImageHeader::read(image)?.default_mask)
    }
}

impl ImageTool for DirectoryImageTool {
    type Session = DirectorySession;

    fn open(&self, path: &Path) -> ServiceResult<DirectorySession> {
        let header = ImageHeader::read(path)?;
        Ok(DirectorySession {
            path: path.to_path_buf(),
            header,
            open: true,
        })
    }

    fn new_image_from_array(
        &self,
        outfile: &Path,
        pixels: &ArrayD<f32>,
        csys: &CoordinateSystem,
    ) -> ServiceResult<()> {
        if csys.naxes() != pixels.ndim() {
            return Err(ServiceError::Format {
                message: format!(
                    "coordinate system has {} axes but the array has {}",
                    csys.naxes(),
                    pixels.ndim()
                ),
            });
        }
        prepare_output(outfile, false)?;
        let header = ImageHeader {
            shape: pixels.shape().to_vec(),
            pixel_type: PixelType::Float,
            coordsys: csys.clone(),
            brightness_unit: String::new(),
            restoring_beam: empty_record(),
            default_mask: None,
        };
        write_pixels(outfile, pixels)?;
        header.write(outfile)?;
        debug!(path = %outfile.display(), shape = ?header.shape, "created image");
        Ok(())
    }

    fn export_fits(&self, image: &Path, fitsfile: &Path, stokes_last: bool) -> ServiceResult<()> {
        if fitsfile.exists() {
            return Err(ServiceError::AlreadyExists {
                path: fitsfile.to_path_buf(),
            });
        }
        let header = ImageHeader::read(image)?;
        let pixels = read_all_pixels(image, &header)?;

        let naxes = header.coordsys.naxes();
        let mut order: Vec<usize> = (0..naxes).collect();
        if stokes_last {
            if let Some(stokes) = header.coordsys.axes.iter().position(|a| a.ctype == "STOKES") {
                order.remove(stokes);
                order.push(stokes);
            }
        }

        let pixels = pixels.permuted_axes(order.clone());
        let data: Vec<f32> = pixels.t().iter().copied().collect();

        let mut cards = Vec::with_capacity(order.len() * 5 + 3);
        for (i, &native) in order.iter().enumerate() {
            let axis = &header.coordsys.axes[native];
            let n = i + 1;
            cards.push(value_card(&format!("CTYPE{n}"), Value::String(axis.ctype.clone())));
            cards.push(value_card(&format!("CRVAL{n}"), Value::Float(axis.crval)));
            cards.push(value_card(&format!("CDELT{n}"), Value::Float(axis.cdelt)));
            cards.push(value_card(&format!("CRPIX{n}"), Value::Float(axis.crpix)));
            cards.push(value_card(&format!("CUNIT{n}"), Value::String(axis.unit.clone())));
        }
        cards.push(value_card("BUNIT", Value::String(header.brightness_unit.clone())));
        if let Some(equinox) = header.coordsys.equinox {
            cards.push(value_card("EQUINOX", Value::Float(equinox)));
        }
        if let Some(restfrq) = header.coordsys.rest_frequency {
            cards.push(value_card("RESTFRQ", Value::Float(restfrq)));
        }

        write_primary_image(fitsfile, pixels.shape(), &ImageData::F32(data), &cards)
            .map_err(|e| ServiceError::Io { message: e.to_string() })?;
        debug!(image = %image.display(), fits = %fitsfile.display(), "exported image to FITS");
        Ok(())
    }

    fn import_fits(&self, fitsfile: &Path, outfile: &Path, overwrite: bool) -> ServiceResult<()> {
        if !fitsfile.is_file() {
            return Err(ServiceError::PathNotFound {
                path: fitsfile.to_path_buf(),
            });
        }
        let fits = read_primary_image(fitsfile)
            .map_err(|e| ServiceError::Format { message: e.to_string() })?;
        let shape = fits.naxes.clone();

        let axes = (1..=shape.len())
            .map(|n| coordinate_axis(&fits.cards, n))
            .collect();
        let coordsys = CoordinateSystem {
            axes,
            equinox: card_f64(&fits.cards, "EQUINOX"),
            rest_frequency: card_f64(&fits.cards, "RESTFRQ"),
        };

        // FITS order is already first-axis-fastest.
        let pixels = ArrayD::from_shape_vec(IxDyn(&shape).f(), fits.to_f32()).map_err(|e| {
            ServiceError::Format {
                message: e.to_string(),
            }
        })?;

        prepare_output(outfile, overwrite)?;
        write_pixels(outfile, &pixels)?;
        ImageHeader {
            shape,
            pixel_type: PixelType::Float,
            coordsys,
            brightness_unit: card_str(&fits.cards, "BUNIT").unwrap_or_default(),
            restoring_beam: empty_record(),
            default_mask: None,
        }
        .write(outfile)?;
        debug!(fits = %fitsfile.display(), image = %outfile.display(), "imported FITS image");
        Ok(())
    }

    fn define_mask(&self, image: &Path, mask_name: &str, source: &Path) -> ServiceResult<()> {
        let source_header = ImageHeader::read(source)?;
        let pixels = read_all_pixels(source, &source_header)?;
        self.put_mask(image, mask_name, &pixels.mapv(|v| v > 0.5))
    }
}

fn coordinate_axis(cards: &[Card], n: usize) -> CoordinateAxis {
    let ctype = card_str(cards, &format!("CTYPE{n}")).unwrap_or_default();
    CoordinateAxis {
        name: axis_name(&ctype).to_string(),
        crval: card_f64(cards, &format!("CRVAL{n}")).unwrap_or(0.0),
        cdelt: card_f64(cards, &format!("CDELT{n}")).unwrap_or(1.0),
        crpix: card_f64(cards, &format!("CRPIX{n}")).unwrap_or(0.0),
        unit: card_str(cards, &format!("CUNIT{n}")).unwrap_or_default(),
        ctype,
    }
}

/// Open handle on a directory image
#[derive(Debug)]
pub struct DirectorySession {
    path: PathBuf,
    header: ImageHeader,
    open: bool,
}

impl DirectorySession {
    fn header(&self) -> ServiceResult<&ImageHeader> {
        if self.open {
            Ok(&self.header)
        } else {
            Err(ServiceError::Failed(format!(
                "image {} is not open",
                self.path.display()
            )))
        }
    }
}

impl ImageSession for DirectorySession {
    fn shape(&self) -> ServiceResult<Vec<usize>> {
        Ok(self.header()?.shape.clone())
    }

    fn pixel_type(&self) -> ServiceResult<PixelType> {
        Ok(self.header()?.pixel_type)
    }

    fn coordsys(&self) -> ServiceResult<CoordinateSystem> {
        Ok(self.header()?.coordsys.clone())
    }

    fn brightness_unit(&self) -> ServiceResult<String> {
        Ok(self.header()?.brightness_unit.clone())
    }

    fn restoring_beam(&self) -> ServiceResult<JsonValue> {
        Ok(self.header()?.restoring_beam.clone())
    }

    fn get_chunk(&self, region: &Region) -> ServiceResult<ArrayD<f32>> {
        let header = self.header()?;
        let runs = resolve_region(&header.shape, region)?;
        read_region(&self.path.join(PIXEL_FILE), &header.shape, &runs, 4, |b| {
            f32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn get_mask_chunk(&self, region: &Region) -> ServiceResult<ArrayD<bool>> {
        let header = self.header()?;
        let runs = resolve_region(&header.shape, region)?;
        let mask_file = header
            .default_mask
            .as_ref()
            .map(|name| self.path.join(MASK_DIR).join(name))
            .filter(|file| file.is_file());

        match mask_file {
            Some(file) => read_region(&file, &header.shape, &runs, 1, |b| b[0] != 0),
            None => {
                let counts: Vec<usize> = runs.iter().map(|r| r.count).collect();
                Ok(ArrayD::from_elem(IxDyn(&counts), true))
            }
        }
    }

    fn close(&mut self) -> ServiceResult<()> {
        self.header()?;
        self.open = false;
        Ok(())
    }
}
