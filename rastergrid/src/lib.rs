//! Gridded raster surfaces with cell-aligned windowed reads.
//!
//! A [Raster] is any north-up grid of `f64` samples with a known
//! lower-left corner, cell size, and dimensions. Callers never ask for
//! the whole grid; they ask for a [Window], a rectangle of cells whose
//! lower-left corner sits on a cell boundary, and get back a row-major,
//! top-down buffer where anything outside the grid (or flagged as
//! nodata by the grid itself) is replaced with the caller's sentinel.
//!
//! # References
//!
//! 1. [ESRI float grid](https://desktop.arcgis.com/en/arcmap/latest/tools/conversion-toolbox/float-to-raster.htm)
//! 1. [ESRI BIL header keys](https://desktop.arcgis.com/en/arcmap/latest/manage-data/raster-and-images/bil-bip-and-bsq-raster-files.htm)

mod catalog;
mod error;
mod flt;
mod mem;

pub use crate::{catalog::GridCatalog, error::RasterError, flt::FloatGrid, mem::MemGrid};
use geo::geometry::{Coord, Rect};

/// Base floating point type used for all coordinates and samples.
pub type C = f64;

/// Width and height of one cell, in map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub x: C,
    pub y: C,
}

impl CellSize {
    pub fn square(size: C) -> Self {
        Self { x: size, y: size }
    }
}

/// A cell-aligned rectangle of cells to read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    /// Lower-left corner of the window.
    ///
    /// Specifically, the _edge_ of the SW most cell, not its center.
    pub ll_corner: Coord<C>,

    /// Number of columns to read.
    pub ncols: usize,

    /// Number of rows to read.
    pub nrows: usize,
}

impl Window {
    /// Returns the number of cells in this window.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.ncols * self.nrows
    }
}

/// A north-up gridded surface.
pub trait Raster: Send + Sync {
    /// Returns the size of a single cell.
    fn cell_size(&self) -> CellSize;

    /// Returns the outer edges of the grid.
    fn extent(&self) -> Rect<C>;

    /// Returns the name of the grid's spatial reference, if known.
    fn spatial_ref(&self) -> Option<&str> {
        None
    }

    /// Reads `window` into a row-major buffer, top row first.
    ///
    /// Cells outside the grid, or flagged as nodata by the grid,
    /// are returned as `nodata`.
    fn read_window(&self, window: &Window, nodata: C) -> Result<Vec<C>, RasterError>;
}

/// Shared windowed read over any grid addressable by `(col, row)`,
/// where `(0, 0)` is the NW-most cell.
///
/// `get` returns `None` for cells the grid considers nodata.
pub(crate) fn read_window_with<F>(
    extent: Rect<C>,
    cell_size: CellSize,
    (ncols, nrows): (usize, usize),
    window: &Window,
    nodata: C,
    get: F,
) -> Result<Vec<C>, RasterError>
where
    F: Fn(usize, usize) -> Option<C>,
{
    let len = window
        .ncols
        .checked_mul(window.nrows)
        .ok_or(RasterError::Alloc {
            ncols: window.ncols,
            nrows: window.nrows,
        })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| RasterError::Alloc {
        ncols: window.ncols,
        nrows: window.nrows,
    })?;

    #[allow(clippy::cast_precision_loss)]
    let window_top = window.ll_corner.y + window.nrows as C * cell_size.y;
    #[allow(clippy::cast_possible_truncation)]
    let col_offset = ((window.ll_corner.x - extent.min().x) / cell_size.x).round() as isize;
    #[allow(clippy::cast_possible_truncation)]
    let row_offset = ((extent.max().y - window_top) / cell_size.y).round() as isize;

    #[allow(clippy::cast_possible_wrap)]
    for row in 0..window.nrows as isize {
        let grid_row = row_offset + row;
        for col in 0..window.ncols as isize {
            let grid_col = col_offset + col;
            let inside =
                (0..ncols as isize).contains(&grid_col) && (0..nrows as isize).contains(&grid_row);
            #[allow(clippy::cast_sign_loss)]
            let sample = if inside {
                get(grid_col as usize, grid_row as usize).unwrap_or(nodata)
            } else {
                nodata
            };
            buf.push(sample);
        }
    }

    Ok(buf)
}
