use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid grid header {path}: {reason}")]
    Header { path: PathBuf, reason: String },

    #[error("invalid grid data len {0} for {1}")]
    DataLen(u64, PathBuf),

    #[error("grid has {samples} samples, expected {expected}")]
    Dimensions { samples: usize, expected: usize },

    #[error("cannot allocate a {ncols}x{nrows} cell window")]
    Alloc { ncols: usize, nrows: usize },
}
