//! Mapping sample coordinates to block array cells.

use crate::{extract::BlockArray, lattice::SamplePoint, SampleError};
use geo::geometry::Coord;

/// Returns the (row, col) of the cell containing `coord`, where row 0
/// is the northernmost row. The result may lie outside the array.
pub fn cell_index(array: &BlockArray, coord: Coord<f64>) -> (isize, isize) {
    let x_min = array.extent.min().x;
    let y_max = array.extent.max().y;
    #[allow(clippy::cast_possible_truncation)]
    let col = ((coord.x - x_min) / array.cell_size.x).floor() as isize;
    #[allow(clippy::cast_possible_truncation)]
    let row = ((y_max - coord.y) / array.cell_size.y).floor() as isize;
    (row, col)
}

/// Returns the value under each of `points`, in order.
///
/// Every point must fall inside `array`; one that doesn't means the
/// block was not buffered enough, and is reported rather than clamped.
pub fn resolve(
    block: usize,
    points: &[SamplePoint],
    array: &BlockArray,
    nodata: f64,
) -> Result<Vec<f64>, SampleError> {
    if array.is_all_nodata(nodata) {
        return Ok(vec![nodata; points.len()]);
    }

    points
        .iter()
        .map(|point| {
            let (row, col) = cell_index(array, point.coord);
            #[allow(clippy::cast_possible_wrap)]
            let inside = (0..array.nrows as isize).contains(&row)
                && (0..array.ncols as isize).contains(&col);
            if inside {
                #[allow(clippy::cast_sign_loss)]
                Ok(array.get(row as usize, col as usize))
            } else {
                Err(SampleError::OutsideWindow {
                    block,
                    node: point.node,
                    key: point.key,
                    row,
                    col,
                    nrows: array.nrows,
                    ncols: array.ncols,
                })
            }
        })
        .collect()
}
