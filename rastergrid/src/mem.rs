//! In-memory grids.

use crate::{read_window_with, CellSize, Raster, RasterError, Window, C};
use geo::geometry::{Coord, Rect};

/// A grid held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemGrid {
    /// Lower-left corner of the grid (cell edge).
    ll_corner: Coord<C>,

    cell_size: CellSize,

    /// Number of (columns, rows) in this grid.
    dimensions: (usize, usize),

    /// Value this grid uses to flag missing samples.
    nodata: Option<C>,

    spatial_ref: Option<String>,

    /// Row-major samples, top row first.
    samples: Box<[C]>,
}

impl MemGrid {
    /// Returns a grid over `samples`, which must hold `ncols * nrows`
    /// values in row-major order, top row first.
    pub fn new(
        ll_corner: Coord<C>,
        cell_size: CellSize,
        (ncols, nrows): (usize, usize),
        samples: Vec<C>,
    ) -> Result<Self, RasterError> {
        let expected = ncols * nrows;
        if samples.len() != expected {
            return Err(RasterError::Dimensions {
                samples: samples.len(),
                expected,
            });
        }
        Ok(Self {
            ll_corner,
            cell_size,
            dimensions: (ncols, nrows),
            nodata: None,
            spatial_ref: None,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Returns a grid where every cell holds `value`.
    pub fn filled(
        ll_corner: Coord<C>,
        cell_size: CellSize,
        dimensions @ (ncols, nrows): (usize, usize),
        value: C,
    ) -> Self {
        Self {
            ll_corner,
            cell_size,
            dimensions,
            nodata: None,
            spatial_ref: None,
            samples: vec![value; ncols * nrows].into_boxed_slice(),
        }
    }

    /// Returns a grid where each cell holds `f(center of cell)`.
    pub fn from_fn<F>(
        ll_corner: Coord<C>,
        cell_size: CellSize,
        dimensions @ (ncols, nrows): (usize, usize),
        f: F,
    ) -> Self
    where
        F: Fn(Coord<C>) -> C,
    {
        let mut samples = Vec::with_capacity(ncols * nrows);
        #[allow(clippy::cast_precision_loss)]
        let top = ll_corner.y + nrows as C * cell_size.y;
        for row in 0..nrows {
            for col in 0..ncols {
                #[allow(clippy::cast_precision_loss)]
                let center = Coord {
                    x: ll_corner.x + (col as C + 0.5) * cell_size.x,
                    y: top - (row as C + 0.5) * cell_size.y,
                };
                samples.push(f(center));
            }
        }
        Self {
            ll_corner,
            cell_size,
            dimensions,
            nodata: None,
            spatial_ref: None,
            samples: samples.into_boxed_slice(),
        }
    }

    /// Flags cells holding `nodata` as missing.
    #[must_use]
    pub fn with_nodata(mut self, nodata: C) -> Self {
        self.nodata = Some(nodata);
        self
    }

    #[must_use]
    pub fn with_spatial_ref(mut self, name: impl Into<String>) -> Self {
        self.spatial_ref = Some(name.into());
        self
    }

    fn get(&self, col: usize, row: usize) -> Option<C> {
        let sample = self.samples[row * self.dimensions.0 + col];
        match self.nodata {
            #[allow(clippy::float_cmp)]
            Some(nodata) if sample == nodata => None,
            _ => Some(sample),
        }
    }
}

impl Raster for MemGrid {
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
