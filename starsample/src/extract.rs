//! Per-block raster window extraction.

use geo::geometry::{Coord, Rect};
use log::debug;
use rastergrid::{CellSize, Raster, RasterError, Window};

/// Value recorded for samples with no data.
pub const NODATA: f64 = -9999.0;

/// Snapped cell counts are computed with this much slack so that
/// float noise in an aligned width doesn't add a spurious cell.
const CELL_EPSILON: f64 = 1e-9;

/// A raster window read for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockArray {
    /// The area this array covers, aligned to the raster's cells.
    pub extent: Rect<f64>,
    pub cell_size: CellSize,
    pub ncols: usize,
    pub nrows: usize,
    /// Row-major values, top row first.
    pub values: Vec<f64>,
}

impl BlockArray {
    /// Returns the value at (`row`, `col`), where row 0 is northernmost.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.ncols + col]
    }

    /// Returns `true` when no cell holds data.
    pub fn is_all_nodata(&self, nodata: f64) -> bool {
        self.values.iter().all(|v| *v <= nodata)
    }
}

/// Returns `extent` grown outward to the nearest cell boundaries of a
/// raster covering `raster_extent`, along with its (columns, rows).
pub fn snap(extent: Rect<f64>, raster_extent: Rect<f64>, cell: CellSize) -> (Coord<f64>, usize, usize) {
    let (min, max) = (extent.min(), extent.max());
    let (r_min, r_max) = (raster_extent.min(), raster_extent.max());

    let x_min = min.x - (min.x - r_min.x).rem_euclid(cell.x);
    let y_min = min.y - (min.y - r_min.y).rem_euclid(cell.y);
    let x_max = max.x + (r_max.x - max.x).rem_euclid(cell.x);
    let y_max = max.y + (r_max.y - max.y).rem_euclid(cell.y);

    let ncols = cell_count(x_max - x_min, cell.x);
    let nrows = cell_count(y_max - y_min, cell.y);

    (Coord { x: x_min, y: y_min }, ncols, nrows)
}

fn cell_count(len: f64, cell: f64) -> usize {
    let n = (len / cell - CELL_EPSILON).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    if n < 1.0 {
        1
    } else {
        n as usize
    }
}

/// Reads the part of `raster` under `extent`.
///
/// Every cell holding data is multiplied by `factor`, when given.
/// All-nodata windows are returned as-is.
pub fn extract(
    raster: &dyn Raster,
    extent: Rect<f64>,
    factor: Option<f64>,
    nodata: f64,
) -> Result<BlockArray, RasterError> {
    let cell_size = raster.cell_size();
    let (ll_corner, ncols, nrows) = snap(extent, raster.extent(), cell_size);
    let window = Window {
        ll_corner,
        ncols,
        nrows,
    };

    debug!("reading {ncols}x{nrows} window at {ll_corner:?}");
    let mut values = raster.read_window(&window, nodata)?;

    if let Some(factor) = factor {
        for v in values.iter_mut().filter(|v| **v > nodata) {
            *v *= factor;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let extent = Rect::new(
        ll_corner,
        Coord {
            x: ll_corner.x + ncols as f64 * cell_size.x,
            y: ll_corner.y + nrows as f64 * cell_size.y,
        },
    );

    Ok(BlockArray {
        extent,
        cell_size,
        ncols,
        nrows,
        values,
    })
}
