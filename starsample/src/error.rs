use crate::{attrs::Variable, lattice::SampleKey, node::NodeId, store::StoreError};
use rastergrid::RasterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("missing required parameter '{0}'")]
    Builder(&'static str),

    #[error("invalid configuration, {0}")]
    Config(String),

    #[error(
        "node store is not in a projected coordinate system, \
         use one with linear units of feet or meters"
    )]
    NotProjected,

    #[error(
        "node store ({store}) and {variable} raster ({raster}) do not have \
         the same spatial reference, reproject your data"
    )]
    SpatialRefMismatch {
        variable: Variable,
        store: String,
        raster: String,
    },

    #[error("all nodes already have sampled values, there is nothing to process")]
    NothingToProcess,

    #[error("node {0} has no stream azimuth, which perpendicular transects require")]
    MissingAzimuth(NodeId),

    #[error("block {block}: not enough memory to extract {variable}, reduce the block size ({source})")]
    Extraction {
        block: usize,
        variable: Variable,
        #[source]
        source: RasterError,
    },

    #[error("block {block}: reading {variable} failed, {source}")]
    Raster {
        block: usize,
        variable: Variable,
        #[source]
        source: RasterError,
    },

    #[error(
        "block {block}: node {node} sample {key} maps to cell (row {row}, col {col}) \
         outside the {nrows}x{ncols} window"
    )]
    OutsideWindow {
        block: usize,
        node: NodeId,
        key: SampleKey,
        row: isize,
        col: isize,
        nrows: usize,
        ncols: usize,
    },

    #[error("block {block}: writing results failed, {source}")]
    Write {
        block: usize,
        #[source]
        source: StoreError,
    },

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl SampleError {
    /// Wraps a raster error raised while extracting `variable` for
    /// `block`.
    pub(crate) fn extraction(block: usize, variable: Variable, source: RasterError) -> Self {
        match source {
            RasterError::Alloc { .. } => Self::Extraction {
                block,
                variable,
                source,
            },
            source => Self::Raster {
                block,
                variable,
                source,
            },
        }
    }
}
