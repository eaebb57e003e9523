//! ESRI binary float grids (`.hdr` + `.flt`, optional `.prj`).
//!
//! The header is a whitespace separated key/value text file:
//!
//! ```text
//! ncols         1200
//! nrows         800
//! xllcorner     512000.0
//! yllcorner     4870000.0
//! cellsize      1.0
//! NODATA_value  -9999
//! byteorder     LSBFIRST
//! ```
//!
//! `xllcenter`/`yllcenter` may replace the corner keys, and
//! `xdim`/`ydim` may replace `cellsize` for non-square cells. The
//! `.flt` file holds `ncols * nrows` 32 bit floats, top row first.

use crate::{read_window_with, CellSize, Raster, RasterError, Window, C};
use byteorder::{BigEndian as BE, ByteOrder, LittleEndian as LE};
use geo::geometry::{Coord, Rect};
use log::debug;
use memmap2::Mmap;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::ErrorKind,
    mem::size_of,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

pub struct FloatGrid {
    /// Lower-left corner of the grid (cell edge).
    ll_corner: Coord<C>,

    cell_size: CellSize,

    /// Number of (columns, rows) in this grid.
    dimensions: (usize, usize),

    nodata: Option<f32>,

    endian: Endian,

    /// Contents of the `.prj` side-car, if present.
    spatial_ref: Option<String>,

    samples: Mmap,
}

impl FloatGrid {
    /// Returns a grid memory-mapped from `path`.
    ///
    /// `path` may name the `.hdr`, the `.flt`, or the shared stem.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterError> {
        let hdr_path = path.as_ref().with_extension("hdr");
        let flt_path = path.as_ref().with_extension("flt");
        let prj_path = path.as_ref().with_extension("prj");

        let header = parse_header(&hdr_path, &fs::read_to_string(&hdr_path)?)?;

        let spatial_ref = match fs::read_to_string(&prj_path) {
            Ok(prj) => Some(prj.trim().to_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let (ncols, nrows) = header.dimensions;
        let expected_len = ncols
            .checked_mul(nrows)
            .and_then(|cells| cells.checked_mul(size_of::<f32>()))
            .ok_or_else(|| RasterError::Header {
                path: hdr_path.clone(),
                reason: format!("{ncols}x{nrows} cells overflow"),
            })? as u64;
        let actual_len = flt_path.metadata()?.len();
        if actual_len != expected_len {
            return Err(RasterError::DataLen(actual_len, flt_path));
        }

        let samples = {
            let file = File::open(&flt_path)?;
            unsafe { Mmap::map(&file)? }
        };

        debug!(
            "mapped {flt_path:?}; {ncols}x{nrows} cells of {:?}",
            header.cell_size
        );

        Ok(Self {
            ll_corner: header.ll_corner,
            cell_size: header.cell_size,
            dimensions: header.dimensions,
            nodata: header.nodata,
            endian: header.endian,
            spatial_ref,
            samples,
        })
    }

    /// Returns the number of cells in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let (x, y) = self.dimensions;
        x * y
    }

    fn get(&self, col: usize, row: usize) -> Option<C> {
        let start = (row * self.dimensions.0 + col) * size_of::<f32>();
        let bytes = &self.samples[start..start + size_of::<f32>()];
        let sample = match self.endian {
            Endian::Little => LE::read_f32(bytes),
            Endian::Big => BE::read_f32(bytes),
        };
        #[allow(clippy::float_cmp)]
        if sample.is_nan() || Some(sample) == self.nodata {
            None
        } else {
            Some(C::from(sample))
        }
    }
}

impl Raster for FloatGrid {
    fn cell_size(&self) -> CellSize {
        self.cell_size
    }

    fn extent(&self) -> Rect<C> {
        let (ncols, nrows) = self.dimensions;
        #[allow(clippy::cast_precision_loss)]
        Rect::new(
            self.ll_corner,
            Coord {
                x: self.ll_corner.x + ncols as C * self.cell_size.x,
                y: self.ll_corner.y + nrows as C * self.cell_size.y,
            },
        )
    }

    fn spatial_ref(&self) -> Option<&str> {
        self.spatial_ref.as_deref()
    }

    fn read_window(&self, window: &Window, nodata: C) -> Result<Vec<C>, RasterError> {
        read_window_with(
            self.extent(),
            self.cell_size,
            self.dimensions,
            window,
            nodata,
            |col, row| self.get(col, row),
        )
    }
}

struct Header {
    ll_corner: Coord<C>,
    cell_size: CellSize,
    dimensions: (usize, usize),
    nodata: Option<f32>,
    endian: Endian,
}

fn parse_header(path: &Path, text: &str) -> Result<Header, RasterError> {
    let mk_err = |reason: String| RasterError::Header {
        path: path.to_owned(),
        reason,
    };

    let entries: HashMap<String, &str> = text
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(key), Some(val)) => Some((key.to_ascii_lowercase(), val)),
                _ => None,
            }
        })
        .collect();

    let number = |key: &str| -> Result<Option<C>, RasterError> {
        entries
            .get(key)
            .map(|raw| {
                raw.parse::<C>()
                    .map_err(|_| mk_err(format!("{key} is not a number: {raw}")))
            })
            .transpose()
    };
    let count = |key: &str| -> Result<usize, RasterError> {
        let raw = entries
            .get(key)
            .ok_or_else(|| mk_err(format!("missing {key}")))?;
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(mk_err(format!("{key} must be a positive integer: {raw}"))),
        }
    };

    let dimensions = (count("ncols")?, count("nrows")?);

    let cell_size = match (number("cellsize")?, number("xdim")?, number("ydim")?) {
        (_, Some(x), Some(y)) => CellSize { x, y },
        (Some(size), _, _) => CellSize::square(size),
        _ => return Err(mk_err("missing cellsize".to_owned())),
    };
    if !(cell_size.x > 0.0 && cell_size.y > 0.0) {
        return Err(mk_err(format!("cell size must be positive: {cell_size:?}")));
    }

    let ll_corner = match (
        number("xllcorner")?,
        number("yllcorner")?,
        number("xllcenter")?,
        number("yllcenter")?,
    ) {
        (Some(x), Some(y), _, _) => Coord { x, y },
        (_, _, Some(x), Some(y)) => Coord {
            x: x - cell_size.x / 2.0,
            y: y - cell_size.y / 2.0,
        },
        _ => return Err(mk_err("missing lower-left corner".to_owned())),
    };

    #[allow(clippy::cast_possible_truncation)]
    let nodata = number("nodata_value")?.map(|v| v as f32);

    let endian = match entries.get("byteorder").map(|s| s.to_ascii_uppercase()) {
        None => Endian::Little,
        Some(order) => match order.as_str() {
            "LSBFIRST" | "I" | "LITTLEENDIAN" => Endian::Little,
            "MSBFIRST" | "M" | "BIGENDIAN" => Endian::Big,
            other => return Err(mk_err(format!("unknown byteorder {other}"))),
        },
    };

    Ok(Header {
        ll_corner,
        cell_size,
        dimensions,
        nodata,
        endian,
    })
}

/// Returns the `.flt` path every spelling of a grid's name maps to.
///
/// Falls back to the uncanonicalized path when the file can't be
/// resolved, leaving the error to [FloatGrid::open].
pub(crate) fn canonical_path(path: &Path) -> PathBuf {
    let flt_path = path.with_extension("flt");
    fs::canonicalize(&flt_path).unwrap_or(flt_path)
}
